//! Durable and live outputs for failures and messages.
//!
//! - [`LogSink`] persists an entry and may hand back a [`LogReference`] (for
//!   the file sink, the path of the written report). Failing to log is an
//!   ordinary [`LogError`]; the dispatcher observes it and carries on.
//! - [`ConsoleForwarder`] pushes an entry to a live log console, best effort.
//!
//! [`FileLogSink`] is the reference sink.

use core::{fmt, hash::Hasher, time::Duration};
use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use chrono::{DateTime, Local};
use rustc_hash::FxHasher;

use crate::{failure::CapturedFailure, severity::LogLevel};

/// Something to log: a plain message or a failure.
#[derive(Copy, Clone, Debug)]
pub enum LogEntry<'a> {
    /// A text message.
    Message(&'a str),
    /// A captured failure.
    Failure(&'a CapturedFailure),
}

impl fmt::Display for LogEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(message) => f.write_str(message),
            Self::Failure(failure) => fmt::Display::fmt(failure, f),
        }
    }
}

impl<'a> From<&'a str> for LogEntry<'a> {
    fn from(message: &'a str) -> Self {
        Self::Message(message)
    }
}

impl<'a> From<&'a String> for LogEntry<'a> {
    fn from(message: &'a String) -> Self {
        Self::Message(message)
    }
}

impl<'a> From<&'a CapturedFailure> for LogEntry<'a> {
    fn from(failure: &'a CapturedFailure) -> Self {
        Self::Failure(failure)
    }
}

/// Opaque handle to a persisted entry, shown to developers so they can find
/// it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LogReference(String);

impl LogReference {
    /// Wraps a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// A reference to a file.
    pub fn from_path(path: &Path) -> Self {
        Self(path.display().to_string())
    }

    /// The token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Logging failed.
#[derive(Debug)]
pub enum LogError {
    /// The sink has no directory to write to.
    NoDirectory,
    /// Writing a file failed.
    Io {
        /// The file being written.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
    /// The sink refused the entry.
    Rejected(String),
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDirectory => f.write_str("logging directory is not set"),
            Self::Io { path, source } => {
                write!(f, "unable to write to '{}': {source}", path.display())
            }
            Self::Rejected(reason) => write!(f, "log entry rejected: {reason}"),
        }
    }
}

impl core::error::Error for LogError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Durable persistence for log entries.
pub trait LogSink: Send + Sync {
    /// Persists `entry` with priority `level`.
    ///
    /// Returns a reference to the persisted entry when the sink has one.
    fn write(&self, entry: LogEntry<'_>, level: LogLevel) -> Result<Option<LogReference>, LogError>;
}

impl<S: LogSink + ?Sized> LogSink for Arc<S> {
    fn write(&self, entry: LogEntry<'_>, level: LogLevel) -> Result<Option<LogReference>, LogError> {
        (**self).write(entry, level)
    }
}

/// Best-effort push of entries to a live log console.
pub trait ConsoleForwarder: Send + Sync {
    /// Sends `entry`; returns whether it was delivered.
    fn send(&self, entry: LogEntry<'_>) -> bool;
}

/// A [`ConsoleForwarder`] with nowhere to send to.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullForwarder;

impl ConsoleForwarder for NullForwarder {
    fn send(&self, _entry: LogEntry<'_>) -> bool {
        false
    }
}

/// Delivers error notifications to the configured addresses.
pub trait Notifier: Send + Sync {
    /// Notifies `recipients` about `message`.
    fn notify(&self, recipients: &[String], message: &str) -> Result<(), LogError>;
}

impl<F> Notifier for F
where
    F: Fn(&[String], &str) -> Result<(), LogError> + Send + Sync,
{
    fn notify(&self, recipients: &[String], message: &str) -> Result<(), LogError> {
        self(recipients, message)
    }
}

/// Default time between two notifications.
pub const DEFAULT_EMAIL_SNOOZE: Duration = Duration::from_secs(2 * 24 * 60 * 60);

/// Name of the marker file that throttles notifications.
pub const EMAIL_MARKER: &str = "email-sent";

/// Writes entries into a directory.
///
/// - messages are appended as `[YYYY-MM-DD HH-MM-SS] text` to
///   `<directory>/<level>.log`;
/// - failures are additionally written as a text report to
///   `exception--YYYY-MM-DD--HH-MM--<hash>.txt` (once per distinct failure)
///   and the log line points to it; the report path is returned as the
///   reference;
/// - for [`Error`](LogLevel::Error) and above, configured addresses are
///   notified, at most once per snooze window.
///
/// # Examples
///
/// ```
/// use faultline::{
///     failure::CapturedFailure,
///     severity::LogLevel,
///     sink::{FileLogSink, LogEntry, LogSink},
/// };
///
/// let dir = std::env::temp_dir().join(format!("faultline-doc-{}", std::process::id()));
/// std::fs::create_dir_all(&dir).unwrap();
///
/// let sink = FileLogSink::new(Some(dir.clone()));
/// let failure = CapturedFailure::exception("db timeout");
/// let reference = sink.write(LogEntry::Failure(&failure), LogLevel::Exception).unwrap();
///
/// assert!(reference.is_some());
/// assert!(dir.join("exception.log").is_file());
/// # std::fs::remove_dir_all(&dir).unwrap();
/// ```
#[derive(Clone)]
pub struct FileLogSink {
    directory: Option<PathBuf>,
    emails: Vec<String>,
    notifier: Option<Arc<dyn Notifier>>,
    email_snooze: Duration,
}

impl FileLogSink {
    /// Creates a sink writing into `directory`. Without a directory every
    /// write fails with [`LogError::NoDirectory`].
    pub fn new(directory: Option<PathBuf>) -> Self {
        Self {
            directory,
            emails: Vec::new(),
            notifier: None,
            email_snooze: DEFAULT_EMAIL_SNOOZE,
        }
    }

    /// Notifies `emails` through `notifier` about errors.
    #[must_use]
    pub fn with_notifier(mut self, emails: Vec<String>, notifier: Arc<dyn Notifier>) -> Self {
        self.emails = emails;
        self.notifier = Some(notifier);
        self
    }

    /// Sets the minimum time between two notifications.
    #[must_use]
    pub fn with_email_snooze(mut self, snooze: Duration) -> Self {
        self.email_snooze = snooze;
        self
    }

    /// The target directory.
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    fn report_file_name(failure: &CapturedFailure, now: &DateTime<Local>) -> String {
        let mut hasher = FxHasher::default();
        for failure in failure.chain() {
            hasher.write(failure.class().as_bytes());
            hasher.write(failure.message().as_bytes());
            if let Some(location) = failure.location() {
                hasher.write(location.file.as_bytes());
                hasher.write_u32(location.line);
            }
            for frame in failure.frames() {
                hasher.write(frame.function.as_deref().unwrap_or_default().as_bytes());
                hasher.write(frame.file.as_deref().unwrap_or_default().as_bytes());
                hasher.write_u32(frame.line.unwrap_or_default());
            }
        }
        format!(
            "exception--{}--{:010x}.txt",
            now.format("%Y-%m-%d--%H-%M"),
            hasher.finish() & 0xff_ffff_ffff
        )
    }

    fn append_line(path: &Path, line: &str) -> Result<(), LogError> {
        let io_error = |source| LogError::Io {
            path: path.to_owned(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_error)?;
        file.write_all(line.as_bytes()).map_err(io_error)?;
        file.write_all(b"\n").map_err(io_error)
    }

    fn notify(&self, directory: &Path, message: &str) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if self.emails.is_empty() {
            return;
        }

        let marker = directory.join(EMAIL_MARKER);
        let snoozed = fs::metadata(&marker)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|sent| SystemTime::now().duration_since(sent).ok())
            .is_some_and(|elapsed| elapsed < self.email_snooze);
        if snoozed {
            tracing::trace!(marker = %marker.display(), "notification snoozed");
            return;
        }

        if let Err(error) = fs::write(&marker, "sent") {
            tracing::warn!(%error, "unable to write notification marker");
            return;
        }
        if let Err(error) = notifier.notify(&self.emails, message) {
            tracing::warn!(%error, "unable to send error notification");
        }
    }
}

impl fmt::Debug for FileLogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileLogSink")
            .field("directory", &self.directory)
            .field("emails", &self.emails)
            .field("notifier", &self.notifier.is_some())
            .field("email_snooze", &self.email_snooze)
            .finish()
    }
}

impl LogSink for FileLogSink {
    fn write(&self, entry: LogEntry<'_>, level: LogLevel) -> Result<Option<LogReference>, LogError> {
        let directory = self.directory.as_deref().ok_or(LogError::NoDirectory)?;
        let now = Local::now();
        let text = entry.to_string();
        let mut line = format!("[{}] {text}", now.format("%Y-%m-%d %H-%M-%S"));

        let reference = match entry {
            LogEntry::Message(_) => None,
            LogEntry::Failure(failure) => {
                let name = Self::report_file_name(failure, &now);
                let path = directory.join(&name);
                if !path.exists() {
                    fs::write(&path, failure.summary()).map_err(|source| LogError::Io {
                        path: path.clone(),
                        source,
                    })?;
                }
                line.push_str("  @@  ");
                line.push_str(&name);
                Some(LogReference::from_path(&path))
            }
        };

        Self::append_line(&directory.join(format!("{level}.log")), &line)?;

        if level >= LogLevel::Error {
            self.notify(directory, &text);
        }
        Ok(reference)
    }
}
