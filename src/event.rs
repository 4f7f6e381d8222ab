//! Input and outcome of the warning path.

use alloc::borrow::Cow;

use crate::{
    failure::{FailureContext, SharedFailure, SourceLocation},
    severity::ErrorSeverity,
};

/// A runtime error or warning as reported by the host.
#[derive(Clone, Debug)]
pub struct ErrorEvent {
    /// The runtime severity.
    pub severity: ErrorSeverity,
    /// The raw message, without a severity prefix.
    pub message: String,
    /// Where the error was raised.
    pub location: SourceLocation,
    /// Variables in scope at the point the error was raised.
    pub context: FailureContext,
    /// A failure that was in flight when the error was raised.
    pub previous: Option<SharedFailure>,
    /// Set by the host when the error was raised while a value was being
    /// formatted. Such errors cannot be raised back to the caller and go
    /// through the exception path instead.
    pub in_string_conversion: bool,
}

impl ErrorEvent {
    /// An event located at the caller.
    #[track_caller]
    pub fn new(severity: ErrorSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            location: SourceLocation::caller(),
            context: FailureContext::new(),
            previous: None,
            in_string_conversion: false,
        }
    }

    /// Sets the location.
    #[must_use]
    pub fn at(mut self, file: impl Into<Cow<'static, str>>, line: u32) -> Self {
        self.location = SourceLocation::new(file, line);
        self
    }

    /// Adds a context variable.
    #[must_use]
    pub fn with_var(mut self, name: impl Into<Cow<'static, str>>, value: impl Into<String>) -> Self {
        self.context.insert(name, value);
        self
    }

    /// Sets the in-flight failure.
    #[must_use]
    pub fn with_previous(mut self, previous: SharedFailure) -> Self {
        self.previous = Some(previous);
        self
    }

    /// Marks the event as raised during value formatting.
    #[must_use]
    pub fn in_string_conversion(mut self) -> Self {
        self.in_string_conversion = true;
        self
    }
}

/// What the warning path decided.
///
/// A recoverable fatal error is not an outcome: it comes back as the `Err`
/// side of [`Debugger::handle_error`](crate::Debugger::handle_error) and the
/// caller must deal with it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorOutcome {
    /// Nothing more to do.
    Handled,
    /// The host's default handler should run as well.
    DeferToDefault,
}
