//! Planning and placement error types.

use thiserror::Error;

use shardgrid_core::{Allocation, NodeId};
use shardgrid_remote::RemoteError;

/// The planner was handed inputs it can never satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("invalid redundancy: {data} data shards, {parity} parity shards")]
    InvalidRedundancy { data: u32, parity: u32 },

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Why a unit could not be placed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExhaustionCause {
    /// Every ranked node refused the unit, locally or with a capacity error.
    #[error("no candidate node accepted the unit ({tried} create attempts)")]
    NoCandidate { tried: usize },

    /// A non-capacity failure aborted the pass.
    #[error("node {node_id} failed: {source}")]
    Remote {
        node_id: NodeId,
        #[source]
        source: RemoteError,
    },
}

/// An allocation pass gave up.
///
/// `committed` lists the units that were created on remote nodes before the
/// failure. They are not a result: the caller must either record them or
/// tear them down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("placement exhausted at unit {unit} with {} units committed: {cause}", .committed.len())]
pub struct PlacementExhausted {
    pub unit: u32,
    pub committed: Vec<Allocation>,
    #[source]
    pub cause: ExhaustionCause,
}

impl PlacementExhausted {
    /// True if the pass ran out of nodes rather than hitting a remote fault.
    pub fn is_capacity(&self) -> bool {
        matches!(self.cause, ExhaustionCause::NoCandidate { .. })
    }
}
