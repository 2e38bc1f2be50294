//! Configuration error types.

use thiserror::Error;

/// Result type alias for configuration handling.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating a deployment configuration.
///
/// These indicate a caller mistake and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid redundancy: {data} data shards, {parity} parity shards")]
    InvalidRedundancy { data: u32, parity: u32 },

    #[error("failed to gather entropy: {0}")]
    Entropy(String),
}
