//! Lifecycle error types.

use std::time::Duration;

use thiserror::Error;

use shardgrid_core::{ConfigError, LifecyclePhase};
use shardgrid_placement::{PlacementExhausted, PlanError};
use shardgrid_remote::RemoteError;
use shardgrid_state::StateError;

pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    /// The deployment stays in `installing`; retry once the pool changes.
    #[error(transparent)]
    Placement(#[from] PlacementExhausted),

    #[error("node directory unavailable: {0}")]
    Directory(#[source] RemoteError),

    #[error("compute resource failed: {0}")]
    Compute(#[source] RemoteError),

    #[error("storage unit {unit} failed: {source}")]
    Storage {
        unit: String,
        #[source]
        source: RemoteError,
    },

    #[error("deployment not ready after {waited:?}")]
    NotReady { waited: Duration },

    #[error("invalid phase transition {from} -> {to}")]
    InvalidTransition {
        from: LifecyclePhase,
        to: LifecyclePhase,
    },

    /// The task running the operation panicked or was cancelled.
    #[error("operation task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    State(#[from] StateError),
}
