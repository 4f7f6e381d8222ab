//! Convert boxed error trait objects into failures.
//!
//! ```
//! use std::error::Error;
//!
//! use faultline::compat::IntoFailure;
//!
//! let boxed: Box<dyn Error> = "disk full".into();
//! let failure = boxed.into_failure();
//! assert_eq!(failure.class(), "Error");
//! assert_eq!(failure.message(), "disk full");
//! ```

use std::error::Error;

use super::IntoFailure;
use crate::failure::{CapturedFailure, SourceLocation};

/// Class given to failures converted from boxed errors, whose concrete type
/// is erased.
const BOXED_CLASS: &str = "Error";

impl IntoFailure for Box<dyn Error + Send + Sync> {
    type Output = CapturedFailure;

    #[track_caller]
    fn into_failure(self) -> Self::Output {
        CapturedFailure::from_dyn_error(BOXED_CLASS.to_owned(), &*self).at(SourceLocation::caller())
    }
}

impl IntoFailure for Box<dyn Error> {
    type Output = CapturedFailure;

    #[track_caller]
    fn into_failure(self) -> Self::Output {
        CapturedFailure::from_dyn_error(BOXED_CLASS.to_owned(), &*self).at(SourceLocation::caller())
    }
}

impl<T> IntoFailure for Result<T, Box<dyn Error + Send + Sync>> {
    type Output = Result<T, CapturedFailure>;

    #[track_caller]
    fn into_failure(self) -> Self::Output {
        match self {
            Ok(value) => Ok(value),
            Err(error) => Err(error.into_failure()),
        }
    }
}

impl<T> IntoFailure for Result<T, Box<dyn Error>> {
    type Output = Result<T, CapturedFailure>;

    #[track_caller]
    fn into_failure(self) -> Self::Output {
        match self {
            Ok(value) => Ok(value),
            Err(error) => Err(error.into_failure()),
        }
    }
}
