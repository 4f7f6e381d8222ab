//! Integration with the [`anyhow`] 1.x error handling library.
//!
//! This module specifically supports `anyhow` version 1.x. To enable this
//! integration, add the `compat-anyhow1` feature flag to your `Cargo.toml`.
//!
//! An [`anyhow::Error`] converts into a failure chain following its
//! `source()` chain, so context added with `anyhow::Context` ends up as the
//! outermost failure:
//!
//! ```
//! use anyhow::Context;
//! use faultline::compat::IntoFailure;
//!
//! let result: anyhow::Result<()> =
//!     Err(anyhow::anyhow!("connection refused")).context("db timeout");
//! let failure = result.into_failure().unwrap_err();
//!
//! assert_eq!(failure.message(), "db timeout");
//! assert_eq!(failure.previous().unwrap().message(), "connection refused");
//! ```
//!
//! Going the other way needs no conversion trait, since `anyhow::Error`
//! accepts any [`core::error::Error`]:
//!
//! ```
//! use faultline::{failure, failure::CapturedFailure};
//!
//! fn handler() -> Result<(), CapturedFailure> {
//!     Err(failure!("payment declined"))
//! }
//!
//! fn job() -> anyhow::Result<()> {
//!     handler()?;
//!     Ok(())
//! }
//!
//! assert!(job().unwrap_err().to_string().starts_with("Exception: payment declined"));
//! ```

use super::IntoFailure;
use crate::failure::{CapturedFailure, SourceLocation};

impl IntoFailure for anyhow::Error {
    type Output = CapturedFailure;

    #[track_caller]
    fn into_failure(self) -> Self::Output {
        CapturedFailure::from_dyn_error(String::from("anyhow::Error"), &*self)
            .at(SourceLocation::caller())
    }
}

impl<T> IntoFailure for anyhow::Result<T> {
    type Output = Result<T, CapturedFailure>;

    #[track_caller]
    fn into_failure(self) -> Self::Output {
        match self {
            Ok(value) => Ok(value),
            Err(error) => Err(error.into_failure()),
        }
    }
}
