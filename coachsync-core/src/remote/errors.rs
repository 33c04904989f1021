//! Error types returned by remote store clients

use thiserror::Error;

/// Result type for remote store calls
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failures reported by the remote store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Could not reach the remote (connection refused, DNS, 5xx)
    #[error("Remote unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete in time
    #[error("Remote call timed out")]
    Timeout,

    /// A uniqueness constraint rejected the write
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// The remote refused the data as invalid
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The caller is not allowed to perform the write
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The target row does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

impl RemoteError {
    /// Whether retrying later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_) | RemoteError::Timeout)
    }
}
