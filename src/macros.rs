/// Creates a [`CapturedFailure`] of class `Exception`, located at the
/// invocation.
///
/// The arguments are interpreted the same way as by the [`format!()`]
/// macro.
///
/// [`CapturedFailure`]: crate::failure::CapturedFailure
/// [`format!()`]: std::format
///
/// # Examples
///
/// ```
/// use faultline::failure;
///
/// let (failure, line) = (failure!("db timeout after {}s", 30), line!());
/// assert_eq!(failure.class(), "Exception");
/// assert_eq!(failure.message(), "db timeout after 30s");
/// assert_eq!(failure.location().unwrap().line, line);
/// ```
#[macro_export]
macro_rules! failure {
    ($($arg:tt)+) => {
        $crate::failure::CapturedFailure::exception($crate::__private::format!($($arg)+))
    };
}

/// Return early with a failure.
///
/// Constructs a failure using the same arguments as the [`failure!`] macro,
/// and then returns early from the function with it wrapped in an `Err`.
///
/// This is equivalent to writing `return Err(failure!(...).into());`
///
/// # Examples
///
/// ```
/// use faultline::{bail, failure::CapturedFailure};
///
/// fn checkout(items: usize) -> Result<(), CapturedFailure> {
///     if items == 0 {
///         bail!("cart is empty");
///     }
///     Ok(())
/// }
///
/// assert_eq!(checkout(0).unwrap_err().message(), "cart is empty");
/// ```
#[macro_export]
macro_rules! bail {
    ($($arg:tt)+) => {
        return $crate::__private::Err($crate::failure!($($arg)+).into())
    };
}

/// Raises a runtime warning on a [`ProcessHost`], located at the invocation.
///
/// Without a severity the warning is a
/// [`UserWarning`](crate::severity::ErrorSeverity::UserWarning). Evaluates to
/// the `Result` of [`ProcessHost::raise`].
///
/// [`ProcessHost`]: crate::host::ProcessHost
/// [`ProcessHost::raise`]: crate::host::ProcessHost::raise
///
/// # Examples
///
/// ```
/// use faultline::{
///     host::{Host, ProcessHost},
///     severity::ErrorSeverity,
///     warning,
/// };
///
/// let host = ProcessHost::console();
/// warning!(host, "cache {} is cold", "sessions").unwrap();
/// assert_eq!(host.last_error().unwrap().severity, ErrorSeverity::UserWarning);
///
/// warning!(host, ErrorSeverity::UserDeprecated; "use v2").unwrap();
/// assert_eq!(host.last_error().unwrap().message, "use v2");
/// ```
#[macro_export]
macro_rules! warning {
    ($host:expr, $severity:expr; $($arg:tt)+) => {
        $host.raise($crate::event::ErrorEvent::new(
            $severity,
            $crate::__private::format!($($arg)+),
        ))
    };
    ($host:expr, $($arg:tt)+) => {
        $host.raise($crate::event::ErrorEvent::new(
            $crate::severity::ErrorSeverity::UserWarning,
            $crate::__private::format!($($arg)+),
        ))
    };
}
