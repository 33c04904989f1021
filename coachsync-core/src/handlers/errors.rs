//! Handler error taxonomy

use crate::remote::RemoteError;
use thiserror::Error;

/// Result type for handler execution
pub type HandlerResult<T> = Result<T, HandlerError>;

/// How applying an action failed, which decides what happens to it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The mutation already exists remotely; counts as success
    #[error("Already applied: {0}")]
    ConflictAlreadyApplied(String),

    /// Network trouble or timeout; the action stays queued for the next pass
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// The remote will never accept this action as recorded
    #[error("Validation error: {0}")]
    Validation(String),

    /// The user is not allowed to perform this mutation
    #[error("Permission error: {0}")]
    Permission(String),
}

impl HandlerError {
    /// Errors that retrying cannot fix
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandlerError::Validation(_) | HandlerError::Permission(_))
    }

    pub fn is_already_applied(&self) -> bool {
        matches!(self, HandlerError::ConflictAlreadyApplied(_))
    }
}

impl From<RemoteError> for HandlerError {
    fn from(e: RemoteError) -> Self {
        if e.is_transient() {
            return HandlerError::TransientNetwork(e.to_string());
        }
        match e {
            RemoteError::UniqueViolation(msg) => HandlerError::ConflictAlreadyApplied(msg),
            RemoteError::Forbidden(msg) => HandlerError::Permission(msg),
            RemoteError::NotFound(msg) => HandlerError::Validation(format!("not found: {}", msg)),
            RemoteError::Rejected(msg) => HandlerError::Validation(msg),
            other => HandlerError::Validation(other.to_string()),
        }
    }
}
