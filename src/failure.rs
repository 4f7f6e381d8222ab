//! The normalized record of a captured failure.
//!
//! Every hook converts what it intercepted (a panic, a runtime warning, a
//! fatal error found at shutdown) into a [`CapturedFailure`] before routing
//! it. A failure is immutable once built, with one exception: request context
//! can be attached exactly once, see [`CapturedFailure::attach_context`].
//!
//! Failures form a chain through [`CapturedFailure::previous`]. The chain is
//! built bottom-up (a failure can only point at a failure that already
//! exists), so it cannot contain cycles.

use alloc::borrow::Cow;
use core::{any::Any, error::Error, fmt, panic::Location};
use std::panic::PanicHookInfo;

use indexmap::IndexMap;
use triomphe::Arc;

use crate::severity::ErrorSeverity;

/// Broad category of a captured failure.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// A recoverable runtime warning, notice or deprecation.
    Warning,
    /// An exception, either uncaught or synthesized from a warning.
    Exception,
    /// A fatal error the process cannot continue after.
    Fatal,
}

/// Source position of a failure.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    /// Path of the source file.
    pub file: Cow<'static, str>,
    /// One-based line number.
    pub line: u32,
}

impl SourceLocation {
    /// Creates a location from a file path and line.
    pub fn new(file: impl Into<Cow<'static, str>>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// The location of the caller.
    #[track_caller]
    pub fn caller() -> Self {
        Location::caller().into()
    }
}

impl From<&'static Location<'static>> for SourceLocation {
    fn from(location: &'static Location<'static>) -> Self {
        Self {
            file: Cow::Borrowed(location.file()),
            line: location.line(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// One entry of a captured call stack, innermost first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    /// Demangled function name, if known.
    pub function: Option<String>,
    /// Source file, if known.
    pub file: Option<String>,
    /// Line in `file`, if known.
    pub line: Option<u32>,
    /// Short summary of the call arguments, if the capture provides one.
    pub args: Option<String>,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.function.as_deref().unwrap_or("{unknown}"))?;
        if let Some(args) = &self.args {
            write!(f, "({args})")?;
        }
        if let Some(file) = &self.file {
            write!(f, " at {file}")?;
            if let Some(line) = self.line {
                write!(f, ":{line}")?;
            }
        }
        Ok(())
    }
}

/// Request data attached to a failure while it is dispatched.
///
/// Keys keep their insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FailureContext {
    entries: IndexMap<Cow<'static, str>, String>,
}

impl FailureContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing an earlier one with the same key.
    pub fn insert(&mut self, key: impl Into<Cow<'static, str>>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Looks a value up.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (&**k, v.as_str()))
    }

    /// Moves every entry of `other` into `self`.
    pub fn extend(&mut self, other: FailureContext) {
        self.entries.extend(other.entries);
    }
}

impl<K, V> FromIterator<(K, V)> for FailureContext
where
    K: Into<Cow<'static, str>>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A failure shared between several owners, e.g. as the cause of two
/// different failures.
pub type SharedFailure = Arc<CapturedFailure>;

/// A normalized, captured failure.
///
/// # Examples
///
/// ```
/// use faultline::failure::{CapturedFailure, FailureKind};
///
/// let cause = CapturedFailure::exception("connection refused");
/// let failure = CapturedFailure::exception("db timeout").with_previous(cause);
///
/// assert_eq!(failure.kind(), FailureKind::Exception);
/// assert_eq!(failure.chain().count(), 2);
/// assert!(failure.to_string().starts_with("Exception: db timeout in "));
/// ```
pub struct CapturedFailure {
    kind: FailureKind,
    class: Cow<'static, str>,
    severity: Option<ErrorSeverity>,
    message: String,
    location: Option<SourceLocation>,
    frames: Vec<Frame>,
    previous: Option<SharedFailure>,
    skippable: bool,
    context: spin::Once<FailureContext>,
}

impl CapturedFailure {
    /// Creates a failure with no location, frames or chain.
    pub fn new(
        kind: FailureKind,
        class: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            class: class.into(),
            severity: None,
            message: message.into(),
            location: None,
            frames: Vec::new(),
            previous: None,
            skippable: false,
            context: spin::Once::new(),
        }
    }

    /// Creates an [`Exception`](FailureKind::Exception) located at the
    /// caller.
    #[track_caller]
    pub fn exception(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Exception, "Exception", message).at(SourceLocation::caller())
    }

    /// Creates the failure that stands for a runtime error of `severity`.
    ///
    /// The class is `ErrorException`; the kind follows the severity: fatal
    /// classes become [`Fatal`](FailureKind::Fatal), everything else a
    /// [`Warning`](FailureKind::Warning). Use [`into_exception`] to promote it.
    ///
    /// [`into_exception`]: Self::into_exception
    pub fn runtime_error(
        severity: ErrorSeverity,
        message: impl Into<String>,
        location: SourceLocation,
    ) -> Self {
        let kind = if severity.is_fatal() {
            FailureKind::Fatal
        } else {
            FailureKind::Warning
        };
        Self {
            severity: Some(severity),
            ..Self::new(kind, "ErrorException", message)
        }
        .at(location)
    }

    /// Converts an error and its `source()` chain into a failure chain.
    ///
    /// The top-level failure is named after `E`; the sources are named
    /// `Error`, since their concrete types are erased.
    pub fn from_error<E>(error: &E) -> Self
    where
        E: Error + 'static,
    {
        let class = short_type_name(core::any::type_name::<E>());
        Self::from_dyn_error(class.to_owned(), error)
    }

    pub(crate) fn from_dyn_error(class: String, error: &(dyn Error + 'static)) -> Self {
        let mut sources = Vec::new();
        let mut next = error.source();
        while let Some(source) = next {
            sources.push(source.to_string());
            next = source.source();
        }

        let previous = sources.into_iter().rev().fold(None, |previous, message| {
            let mut failure = Self::new(FailureKind::Exception, "Error", message);
            failure.previous = previous;
            Some(Arc::new(failure))
        });

        let mut failure = Self::new(FailureKind::Exception, class, error.to_string());
        failure.previous = previous;
        failure
    }

    /// Creates the failure for a panic observed by a panic hook.
    pub fn from_panic(info: &PanicHookInfo<'_>) -> Self {
        let mut failure = Self::new(
            FailureKind::Exception,
            "panic",
            payload_message(info.payload()),
        );
        if let Some(location) = info.location() {
            failure.location = Some(SourceLocation::new(
                location.file().to_owned(),
                location.line(),
            ));
        }
        failure
    }

    /// Sets the source location.
    #[must_use]
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Sets the class name.
    #[must_use]
    pub fn with_class(mut self, class: impl Into<Cow<'static, str>>) -> Self {
        self.class = class.into();
        self
    }

    /// Sets the call stack.
    #[must_use]
    pub fn with_frames(mut self, frames: Vec<Frame>) -> Self {
        self.frames = frames;
        self
    }

    /// Chains a prior failure below this one.
    #[must_use]
    pub fn with_previous(mut self, previous: CapturedFailure) -> Self {
        self.previous = Some(Arc::new(previous));
        self
    }

    /// Chains an already shared prior failure, if there is one.
    #[must_use]
    pub fn with_shared_previous(mut self, previous: Option<SharedFailure>) -> Self {
        if previous.is_some() {
            self.previous = previous;
        }
        self
    }

    /// Turns the failure into an [`Exception`](FailureKind::Exception).
    #[must_use]
    pub fn into_exception(mut self) -> Self {
        self.kind = FailureKind::Exception;
        self
    }

    /// Marks the failure as skippable: the developer may dismiss it and
    /// continue.
    #[must_use]
    pub fn skippable(mut self) -> Self {
        self.skippable = true;
        self
    }

    /// The failure's kind.
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// The class name, e.g. `ErrorException` or the error's type name.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// The runtime severity, for failures synthesized from runtime errors.
    pub fn severity(&self) -> Option<ErrorSeverity> {
        self.severity
    }

    /// The message text.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Where the failure was raised.
    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    /// The captured call stack, innermost first.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// The failure this one wraps.
    pub fn previous(&self) -> Option<&CapturedFailure> {
        self.previous.as_deref()
    }

    /// Whether the failure may be dismissed during development.
    pub fn is_skippable(&self) -> bool {
        self.skippable
    }

    /// Iterates over this failure and every failure it wraps.
    pub fn chain(&self) -> impl Iterator<Item = &CapturedFailure> {
        core::iter::successors(Some(self), |failure| failure.previous())
    }

    /// Request context attached during dispatch.
    pub fn context(&self) -> Option<&FailureContext> {
        self.context.get()
    }

    /// Attaches request context.
    ///
    /// Context can only be attached once; later attempts hand the context
    /// back unchanged.
    pub fn attach_context(&self, context: FailureContext) -> Result<(), FailureContext> {
        let mut context = Some(context);
        self.context.call_once(|| context.take().unwrap_or_default());
        match context {
            None => Ok(()),
            Some(context) => Err(context),
        }
    }

    pub(crate) fn fill_frames(&mut self, capture: impl FnOnce() -> Vec<Frame>) {
        if self.frames.is_empty() {
            self.frames = capture();
        }
    }

    /// Multi-line description: the headline, the stack trace, and every
    /// chained failure.
    pub fn summary(&self) -> String {
        use core::fmt::Write;

        let mut out = String::new();
        for (depth, failure) in self.chain().enumerate() {
            if depth > 0 {
                out.push_str("\n\nCaused by: ");
            }
            let _ = write!(out, "{failure}");
            out.push_str("\nStack trace:");
            for (i, frame) in failure.frames.iter().enumerate() {
                let _ = write!(out, "\n#{i} {frame}");
            }
            let _ = write!(out, "\n#{} {{main}}", failure.frames.len());
        }
        out
    }
}

impl Clone for CapturedFailure {
    fn clone(&self) -> Self {
        let context = spin::Once::new();
        if let Some(existing) = self.context.get() {
            context.call_once(|| existing.clone());
        }
        Self {
            kind: self.kind,
            class: self.class.clone(),
            severity: self.severity,
            message: self.message.clone(),
            location: self.location.clone(),
            frames: self.frames.clone(),
            previous: self.previous.clone(),
            skippable: self.skippable,
            context,
        }
    }
}

impl fmt::Debug for CapturedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedFailure")
            .field("kind", &self.kind)
            .field("class", &self.class)
            .field("severity", &self.severity)
            .field("message", &self.message)
            .field("location", &self.location)
            .field("frames", &self.frames.len())
            .field("previous", &self.previous)
            .field("skippable", &self.skippable)
            .field("context", &self.context.get())
            .finish()
    }
}

impl fmt::Display for CapturedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.class)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(location) = &self.location {
            write!(f, " in {location}")?;
        }
        Ok(())
    }
}

impl Error for CapturedFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.previous
            .as_deref()
            .map(|previous| previous as &(dyn Error + 'static))
    }
}

/// The message carried by a panic payload.
pub(crate) fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown panic payload")
    }
}

fn short_type_name(name: &'static str) -> &'static str {
    let base = name.split('<').next().unwrap_or(name);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("query failed")]
    struct QueryError {
        #[source]
        source: std::io::Error,
    }

    static_assertions::assert_impl_all!(CapturedFailure: Send, Sync, Clone);

    #[test]
    fn test_display_and_summary() {
        let failure = CapturedFailure::new(FailureKind::Exception, "Exception", "db timeout")
            .at(SourceLocation::new("src/db.rs", 41))
            .with_frames(vec![Frame {
                function: Some("db::query".into()),
                file: Some("src/db.rs".into()),
                line: Some(41),
                args: None,
            }]);

        assert_eq!(failure.to_string(), "Exception: db timeout in src/db.rs:41");
        assert_eq!(
            failure.summary(),
            "Exception: db timeout in src/db.rs:41\nStack trace:\n#0 db::query at src/db.rs:41\n#1 {main}"
        );
    }

    #[test]
    fn test_empty_message_display() {
        let failure = CapturedFailure::new(FailureKind::Fatal, "FatalError", "");
        assert_eq!(failure.to_string(), "FatalError");
    }

    #[test]
    fn test_context_is_set_once() {
        let failure = CapturedFailure::exception("boom");
        assert!(failure.context().is_none());

        let first: FailureContext = [("user", "42")].into_iter().collect();
        assert!(failure.attach_context(first).is_ok());

        let second: FailureContext = [("user", "7")].into_iter().collect();
        let rejected = failure.attach_context(second).unwrap_err();
        assert_eq!(rejected.get("user"), Some("7"));
        assert_eq!(failure.context().and_then(|c| c.get("user")), Some("42"));

        let cloned = failure.clone();
        assert_eq!(cloned.context().and_then(|c| c.get("user")), Some("42"));
    }

    #[test]
    fn test_from_error_builds_chain() {
        let error = QueryError {
            source: std::io::Error::other("socket closed"),
        };
        let failure = CapturedFailure::from_error(&error);

        assert_eq!(failure.class(), "QueryError");
        let messages: Vec<_> = failure.chain().map(|f| f.message().to_owned()).collect();
        assert_eq!(messages, ["query failed", "socket closed"]);
        assert!(Error::source(&failure).is_some());
    }

    #[test]
    fn test_runtime_error_kind() {
        let warning = CapturedFailure::runtime_error(
            ErrorSeverity::Warning,
            "Undefined variable x",
            SourceLocation::new("src/index.rs", 12),
        );
        assert_eq!(warning.kind(), FailureKind::Warning);
        assert_eq!(warning.class(), "ErrorException");

        let fatal = CapturedFailure::runtime_error(
            ErrorSeverity::CompileError,
            "syntax error",
            SourceLocation::new("src/index.rs", 1),
        );
        assert_eq!(fatal.kind(), FailureKind::Fatal);
        assert_eq!(fatal.into_exception().kind(), FailureKind::Exception);
    }

    #[test]
    fn test_fill_frames_keeps_existing() {
        let mut failure = CapturedFailure::exception("x").with_frames(vec![Frame::default()]);
        failure.fill_frames(|| vec![Frame::default(), Frame::default()]);
        assert_eq!(failure.frames().len(), 1);

        let mut bare = CapturedFailure::exception("y");
        bare.fill_frames(|| vec![Frame::default(), Frame::default()]);
        assert_eq!(bare.frames().len(), 2);
    }
}
