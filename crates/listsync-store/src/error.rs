//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A different listing already occupies the (location, platform, credential) slot.
    #[error("listing conflict for location {location_id} on {platform} via {credential_id}")]
    DuplicateListing {
        location_id: String,
        platform: String,
        credential_id: String,
    },

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock or blocking task failed.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
