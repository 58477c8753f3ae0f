//! Error types for the listsync core.

use thiserror::Error;

use crate::listing::ListingStatus;
use crate::snapshot::Field;

/// Core errors that can occur while manipulating the data model.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: ListingStatus,
        to: ListingStatus,
    },
}

/// Validation errors for canonical Location fields, raised before a push.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("required field {0} is empty")]
    MissingField(Field),

    #[error("field {field} exceeds {max} characters")]
    TooLong { field: Field, max: usize },

    #[error("website must be an http(s) URL without spaces: {0:?}")]
    InvalidWebsite(String),

    #[error("phone contains invalid characters or too few digits: {0:?}")]
    InvalidPhone(String),
}
