//! Error types for the ShardGrid state store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while reading or writing deployment records.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open state database: {0}")]
    Open(String),

    /// Transaction, table, read or write failure inside redb.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("failed to encode deployment {id}: {reason}")]
    Encode { id: String, reason: String },

    #[error("corrupt record for deployment {id}: {reason}")]
    Corrupt { id: String, reason: String },
}
