//! Error types for the action queue store

use thiserror::Error;

/// Result type for queue store operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Genuine failures of the local persistence layer
///
/// A failed `enqueue` means the action was NOT recorded and the caller must
/// tell the user right away.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Could not obtain a connection from the pool
    #[error("Connection pool error: {0}")]
    Pool(String),

    /// SQLite reported an error
    #[error("Database error: {0}")]
    Database(String),

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A stored row could not be turned back into an action
    #[error("Corrupted record {id}: {reason}")]
    Corrupted { id: String, reason: String },

    /// Migration failed
    #[error("Migration error: {0}")]
    Migration(String),

    /// Background blocking task failed
    #[error("Storage task failed: {0}")]
    Task(String),

    /// Storage refused the write (e.g. disk full, read-only)
    #[error("Write rejected: {0}")]
    WriteRejected(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

impl From<r2d2::Error> for StorageError {
    fn from(e: r2d2::Error) -> Self {
        StorageError::Pool(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(e: tokio::task::JoinError) -> Self {
        StorageError::Task(e.to_string())
    }
}
