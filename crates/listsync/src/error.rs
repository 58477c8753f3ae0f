//! Error types for the engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use listsync_core::{CoreError, CredentialId, ListingId, LocationId, Platform, ValidationError};
use listsync_platform::AdapterError;
use listsync_store::StoreError;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No active credential backs the operation.
    #[error("credential not found: {0}")]
    CredentialNotFound(String),

    /// Several active credentials could serve the target; the caller must pick.
    #[error("{} active {platform} credentials, choose one of {}", .candidates.len(), join_ids(.candidates))]
    CredentialAmbiguous {
        platform: Platform,
        candidates: Vec<CredentialId>,
    },

    /// The platform rejected the credential.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The platform kept rate limiting after all retries.
    #[error("rate limited by platform")]
    RateLimited { retry_after: Option<Duration> },

    /// Timeout, 5xx or network failure after all retries.
    #[error("transient platform failure: {0}")]
    Transient(String),

    /// Another operation holds the listing.
    #[error("listing {0} is busy")]
    Conflict(ListingId),

    /// The location failed pre-push validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("listing not found: {0}")]
    ListingNotFound(ListingId),

    #[error("location not found: {0}")]
    LocationNotFound(LocationId),

    /// The listing has never been published, so there is nothing to fetch.
    #[error("listing {0} is not linked to a platform object")]
    NotLinked(ListingId),

    /// The platform refused the request permanently.
    #[error("rejected by platform: {0}")]
    Rejected(String),

    /// No adapter is registered for the platform.
    #[error("no adapter registered for {0}")]
    Unsupported(Platform),

    /// Data model error (illegal status transition).
    #[error("{0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// A worker task failed.
    #[error("internal error: {0}")]
    Internal(String),
}

fn join_ids(ids: &[CredentialId]) -> String {
    ids.iter()
        .map(CredentialId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<AdapterError> for EngineError {
    fn from(error: AdapterError) -> Self {
        match error {
            AdapterError::Unauthorized(msg) => EngineError::Unauthorized(msg),
            AdapterError::RateLimited { retry_after } => EngineError::RateLimited { retry_after },
            AdapterError::Transient(msg) => EngineError::Transient(msg),
            e @ AdapterError::Timeout(_) => EngineError::Transient(e.to_string()),
            AdapterError::Rejected(msg) => EngineError::Rejected(msg),
            e @ AdapterError::NotFound(_) => EngineError::Rejected(e.to_string()),
            AdapterError::Client(msg) => EngineError::Internal(msg),
        }
    }
}

/// Serializable error classification, used in operation outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CredentialNotFound,
    CredentialAmbiguous,
    Unauthorized,
    RateLimited,
    Transient,
    Conflict,
    Validation,
    ListingNotFound,
    LocationNotFound,
    NotLinked,
    Rejected,
    Unsupported,
    InvalidTransition,
    Store,
    Internal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::CredentialNotFound(_) => ErrorKind::CredentialNotFound,
            EngineError::CredentialAmbiguous { .. } => ErrorKind::CredentialAmbiguous,
            EngineError::Unauthorized(_) => ErrorKind::Unauthorized,
            EngineError::RateLimited { .. } => ErrorKind::RateLimited,
            EngineError::Transient(_) => ErrorKind::Transient,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::ListingNotFound(_) => ErrorKind::ListingNotFound,
            EngineError::LocationNotFound(_) => ErrorKind::LocationNotFound,
            EngineError::NotLinked(_) => ErrorKind::NotLinked,
            EngineError::Rejected(_) => ErrorKind::Rejected,
            EngineError::Unsupported(_) => ErrorKind::Unsupported,
            EngineError::Core(CoreError::InvalidTransition { .. }) => ErrorKind::InvalidTransition,
            EngineError::Core(_) => ErrorKind::Internal,
            EngineError::Store(_) => ErrorKind::Store,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the failure came from talking to the platform.
    ///
    /// These are the failures recorded on the listing as `error`.
    pub fn is_platform_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Unauthorized
                | ErrorKind::RateLimited
                | ErrorKind::Transient
                | ErrorKind::Rejected
        )
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
