//! Commonly used items for convenient importing.
//!
//! # Usage
//!
//! ```rust
//! use faultline::prelude::*;
//!
//! fn divide(a: i32, b: i32) -> Result<i32, CapturedFailure> {
//!     if b == 0 {
//!         bail!("cannot divide {a} by zero");
//!     }
//!     Ok(a / b)
//! }
//!
//! assert_eq!(divide(10, 2).unwrap(), 5);
//! assert_eq!(divide(1, 0).unwrap_err().message(), "cannot divide 1 by zero");
//! ```
//!
//! # What's Included
//!
//! - **[`Debugger`]** and the [`Host`] trait it is installed into
//! - **[`CapturedFailure`]** and **[`ErrorEvent`]**: what the hooks receive
//! - **[`ErrorSeverity`]**, **[`StrictMode`]** and **[`LogLevel`]**
//! - **[`IntoFailure`]**: conversions from other error types
//! - **[`failure!`]**, **[`bail!`]** and **[`warning!`]**

pub use crate::{
    Debugger, bail,
    compat::IntoFailure,
    event::ErrorEvent,
    failure,
    failure::CapturedFailure,
    host::Host,
    severity::{ErrorSeverity, LogLevel, StrictMode},
    warning,
};
