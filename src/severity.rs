//! Severity classes of runtime errors and of log entries.
//!
//! Two separate scales live here:
//!
//! - [`ErrorSeverity`] is the class of an error raised by the host runtime
//!   (a warning, a notice, a fatal error, ...). Each class is a single bit, so
//!   sets of classes are expressed as a [`SeverityMask`].
//! - [`LogLevel`] is the priority handed to a
//!   [`LogSink`](crate::sink::LogSink) together with an entry.
//!
//! [`StrictMode`] decides which runtime errors are promoted to exceptions
//! while developing.

use core::{fmt, ops};

/// Class of an error raised by the host runtime.
///
/// The discriminants are distinct bits so that classes can be combined into a
/// [`SeverityMask`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorSeverity {
    /// Unrecoverable runtime fault.
    Error = 1,
    /// Non-fatal runtime warning.
    Warning = 1 << 1,
    /// Source failed to parse.
    Parse = 1 << 2,
    /// Something that might indicate a bug.
    Notice = 1 << 3,
    /// Fatal error during runtime start-up.
    CoreError = 1 << 4,
    /// Warning during runtime start-up.
    CoreWarning = 1 << 5,
    /// Fatal compile-time error.
    CompileError = 1 << 6,
    /// Compile-time warning.
    CompileWarning = 1 << 7,
    /// Fatal error raised by user code.
    UserError = 1 << 8,
    /// Warning raised by user code.
    UserWarning = 1 << 9,
    /// Notice raised by user code.
    UserNotice = 1 << 10,
    /// Suggestion about forward compatibility.
    Strict = 1 << 11,
    /// Fatal to the current operation, but convertible into an exception.
    RecoverableError = 1 << 12,
    /// Use of a deprecated feature.
    Deprecated = 1 << 13,
    /// Deprecation raised by user code.
    UserDeprecated = 1 << 14,
}

impl ErrorSeverity {
    /// Every severity, in ascending bit order.
    pub const ALL: [ErrorSeverity; 15] = [
        Self::Error,
        Self::Warning,
        Self::Parse,
        Self::Notice,
        Self::CoreError,
        Self::CoreWarning,
        Self::CompileError,
        Self::CompileWarning,
        Self::UserError,
        Self::UserWarning,
        Self::UserNotice,
        Self::Strict,
        Self::RecoverableError,
        Self::Deprecated,
        Self::UserDeprecated,
    ];

    /// The bit of this severity inside a [`SeverityMask`].
    #[inline]
    pub const fn bit(self) -> u32 {
        self as u32
    }

    /// Looks a severity up by its bit value.
    pub fn from_bit(bit: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|severity| severity.bit() == bit)
    }

    /// Whether the host process cannot continue after an error of this class.
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::Error
                | Self::CoreError
                | Self::CompileError
                | Self::Parse
                | Self::RecoverableError
                | Self::UserError
        )
    }

    /// Whether this class is turned into an exception for the caller instead
    /// of terminating the process.
    pub const fn is_recoverable_fatal(self) -> bool {
        matches!(self, Self::RecoverableError | Self::UserError)
    }

    /// Human readable name, as used in messages and log lines.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Error => "Fatal Error",
            Self::Warning => "Warning",
            Self::Parse => "Parse Error",
            Self::Notice => "Notice",
            Self::CoreError => "Core Error",
            Self::CoreWarning => "Core Warning",
            Self::CompileError => "Compile Error",
            Self::CompileWarning => "Compile Warning",
            Self::UserError => "User Error",
            Self::UserWarning => "User Warning",
            Self::UserNotice => "User Notice",
            Self::Strict => "Strict standards",
            Self::RecoverableError => "Recoverable Error",
            Self::Deprecated => "Deprecated",
            Self::UserDeprecated => "User Deprecated",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of [`ErrorSeverity`] classes.
///
/// # Examples
///
/// ```
/// use faultline::severity::{ErrorSeverity, SeverityMask};
///
/// let mask = ErrorSeverity::Warning | ErrorSeverity::Notice;
/// assert!(mask.contains(ErrorSeverity::Notice));
/// assert!(!mask.contains(ErrorSeverity::Deprecated));
/// assert!(SeverityMask::ALL.contains(ErrorSeverity::Deprecated));
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SeverityMask(u32);

impl SeverityMask {
    /// The empty set.
    pub const NONE: Self = Self(0);

    /// Every severity.
    pub const ALL: Self = Self((1 << 15) - 1);

    /// Builds a mask from raw bits. Bits outside [`ALL`](Self::ALL) are
    /// dropped.
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// The raw bits of the mask.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether `severity` is part of the mask.
    #[inline]
    pub const fn contains(self, severity: ErrorSeverity) -> bool {
        self.0 & severity.bit() == severity.bit()
    }

    /// Whether the mask is empty.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns the mask with `severity` added.
    #[must_use]
    pub const fn with(self, severity: ErrorSeverity) -> Self {
        Self(self.0 | severity.bit())
    }

    /// Returns the mask with `severity` removed.
    #[must_use]
    pub const fn without(self, severity: ErrorSeverity) -> Self {
        Self(self.0 & !severity.bit())
    }
}

impl From<ErrorSeverity> for SeverityMask {
    fn from(severity: ErrorSeverity) -> Self {
        Self(severity.bit())
    }
}

impl FromIterator<ErrorSeverity> for SeverityMask {
    fn from_iter<I: IntoIterator<Item = ErrorSeverity>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, Self::with)
    }
}

impl ops::BitOr for SeverityMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl ops::BitOr<ErrorSeverity> for SeverityMask {
    type Output = Self;

    fn bitor(self, rhs: ErrorSeverity) -> Self {
        self.with(rhs)
    }
}

impl ops::BitOr for ErrorSeverity {
    type Output = SeverityMask;

    fn bitor(self, rhs: Self) -> SeverityMask {
        SeverityMask::from(self).with(rhs)
    }
}

impl ops::BitOrAssign<ErrorSeverity> for SeverityMask {
    fn bitor_assign(&mut self, rhs: ErrorSeverity) {
        *self = self.with(rhs);
    }
}

/// Which runtime errors stop execution while developing.
///
/// A boolean switch covers every severity; a mask only the severities it
/// contains.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum StrictMode {
    /// Warnings are reported and execution continues.
    #[default]
    Off,
    /// Every reported warning becomes an exception.
    All,
    /// Warnings whose severity is in the mask become exceptions.
    Only(SeverityMask),
}

impl StrictMode {
    /// Whether a warning of `severity` must be promoted.
    pub const fn applies_to(self, severity: ErrorSeverity) -> bool {
        match self {
            Self::Off => false,
            Self::All => true,
            Self::Only(mask) => mask.contains(severity),
        }
    }
}

impl From<bool> for StrictMode {
    fn from(enabled: bool) -> Self {
        if enabled { Self::All } else { Self::Off }
    }
}

impl From<SeverityMask> for StrictMode {
    fn from(mask: SeverityMask) -> Self {
        Self::Only(mask)
    }
}

impl From<ErrorSeverity> for StrictMode {
    fn from(severity: ErrorSeverity) -> Self {
        Self::Only(severity.into())
    }
}

/// Priority of an entry handed to a log sink.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Informational message.
    Info,
    /// Something unexpected that did not fail.
    Warning,
    /// A failed operation.
    Error,
    /// An uncaught exception.
    Exception,
    /// A failure that needs immediate attention.
    Critical,
}

impl LogLevel {
    /// The lowercase name, used as the log file stem.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Exception => "exception",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
