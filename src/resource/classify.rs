//! Classification of external client errors.
//!
//! Not-found must be told apart from every other failure: it makes observe
//! report a missing object and makes delete succeed.

use crate::error::{CloudError, CloudResult};

/// Text the API uses when an identifier is empty or non-positive.
pub const INVALID_ID_PATTERN: &str = "is invalid because cannot be less than 1";

/// How the engine treats a client error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The remote object does not exist.
    NotFound,
    /// The call was rejected because no usable identity was given.
    IdentityMissing,
    /// The caller may retry later.
    Transient,
    /// Retrying will not help.
    Permanent,
}

/// Classifies a client error.
#[must_use]
pub fn classify(error: &CloudError) -> ErrorClass {
    if error.to_string().contains(INVALID_ID_PATTERN) {
        return ErrorClass::IdentityMissing;
    }

    match error {
        CloudError::Api { status: 404, .. } => ErrorClass::NotFound,
        CloudError::Api { status, .. } if *status == 408 || *status >= 500 => {
            ErrorClass::Transient
        }
        CloudError::RateLimited { .. } | CloudError::Network { .. } => ErrorClass::Transient,
        _ => ErrorClass::Permanent,
    }
}

/// Returns true if the error means there is nothing to act on.
#[must_use]
pub fn is_ignorable(error: &CloudError) -> bool {
    matches!(
        classify(error),
        ErrorClass::NotFound | ErrorClass::IdentityMissing
    )
}

/// Turns an ignorable error into `Ok(None)`.
///
/// # Errors
///
/// Returns the original error if it is not ignorable.
pub fn ignore_not_found<T>(result: CloudResult<T>) -> CloudResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if is_ignorable(&e) => Ok(None),
        Err(e) => Err(e),
    }
}
