//! Remote call error types.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failure reported by (or on the way to) a remote collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The node has no namespace slot or space left, whatever the directory said.
    #[error("capacity exhausted: {0}")]
    CapacityExhausted(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),
}

impl RemoteError {
    /// Capacity-class failures are retried on another node; nothing else is.
    pub fn is_capacity(&self) -> bool {
        matches!(self, RemoteError::CapacityExhausted(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}
