//! Error types for platform adapters.

use std::time::Duration;

use thiserror::Error;

/// Errors a platform adapter can report.
///
/// Retry decisions are made on the variant alone; see [`AdapterError::is_retryable`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// The credential was rejected (expired or revoked token). Never retried.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The platform asked us to slow down.
    #[error("rate limited{}", fmt_retry_after(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// Server-side or network failure that may succeed on retry.
    #[error("transient failure: {0}")]
    Transient(String),

    /// No response within the request timeout.
    #[error("request timed out after {}ms", millis(.0))]
    Timeout(Duration),

    /// The platform refused the request permanently (4xx other than auth).
    #[error("rejected by platform: {0}")]
    Rejected(String),

    /// The platform object does not exist.
    #[error("platform object not found: {0}")]
    NotFound(String),

    /// The HTTP client could not be constructed.
    #[error("http client error: {0}")]
    Client(String),
}

impl AdapterError {
    /// Whether the failure is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdapterError::RateLimited { .. } | AdapterError::Transient(_) | AdapterError::Timeout(_)
        )
    }
}

fn millis(d: &Duration) -> u128 {
    d.as_millis()
}

fn fmt_retry_after(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}ms)", millis(d)),
        None => String::new(),
    }
}

/// Result type for adapter operations.
pub type Result<T> = std::result::Result<T, AdapterError>;
