//! Node directory contract.

use shardgrid_core::{CandidateNode, DiskType};

use crate::resource::RemoteFuture;

/// Which nodes a deployment may be placed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFilter {
    /// Organisation owning the nodes.
    pub farm: String,
    pub disk_type: DiskType,
    /// Skip nodes reporting less free capacity than this.
    pub min_capacity: u64,
}

impl NodeFilter {
    pub fn new(farm: impl Into<String>, disk_type: DiskType) -> Self {
        Self {
            farm: farm.into(),
            disk_type,
            min_capacity: 0,
        }
    }

    pub fn with_min_capacity(mut self, min_capacity: u64) -> Self {
        self.min_capacity = min_capacity;
        self
    }
}

/// Source of candidate nodes.
///
/// Capacity figures are advisory: they may be stale by the time a namespace
/// is created, and concurrent deployments race for the same nodes.
pub trait NodeDirectory: Send + Sync {
    fn list_candidates<'a>(&'a self, filter: &'a NodeFilter) -> RemoteFuture<'a, Vec<CandidateNode>>;
}
