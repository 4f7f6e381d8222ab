//! Conversions from other error handling libraries.
//!
//! Failures raised by code built on another error type can be handed to
//! [`Debugger::handle_exception`](crate::Debugger::handle_exception) after
//! converting them with [`IntoFailure`]. The error's `source()` chain becomes
//! the failure chain.
//!
//! - [`boxed_error`] converts `Box<dyn Error>` and `Box<dyn Error + Send +
//!   Sync>`
//! - [`anyhow1`] converts `anyhow::Error` (requires the `compat-anyhow1`
//!   feature flag)
//!
//! The other direction needs no trait: [`CapturedFailure`] implements
//! [`core::error::Error`], so `?` converts it into any boxed error or
//! `anyhow::Error`.
//!
//! [`CapturedFailure`]: crate::failure::CapturedFailure
//!
//! # Examples
//!
//! ```
//! use std::error::Error;
//!
//! use faultline::{compat::IntoFailure, failure::CapturedFailure};
//!
//! fn legacy() -> Result<u32, Box<dyn Error + Send + Sync>> {
//!     Err("quota exceeded".into())
//! }
//!
//! fn handler() -> Result<u32, CapturedFailure> {
//!     let value = legacy().into_failure()?;
//!     Ok(value)
//! }
//!
//! assert_eq!(handler().unwrap_err().message(), "quota exceeded");
//! ```

/// Converts an external error, or a `Result` carrying one, into a
/// [`CapturedFailure`](crate::failure::CapturedFailure).
///
/// The failure is located at the caller of
/// [`into_failure`](Self::into_failure).
pub trait IntoFailure {
    /// The type produced by the conversion.
    ///
    /// For error types this is [`CapturedFailure`]; for `Result` types it is
    /// `Result<T, CapturedFailure>`.
    ///
    /// [`CapturedFailure`]: crate::failure::CapturedFailure
    type Output;

    /// Performs the conversion.
    fn into_failure(self) -> Self::Output;
}

pub mod boxed_error;

#[cfg(feature = "compat-anyhow1")]
#[cfg_attr(docsrs, doc(cfg(feature = "compat-anyhow1")))]
pub mod anyhow1;
