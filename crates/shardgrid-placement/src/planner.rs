//! Shard planner.
//!
//! Sizes the namespaces of an erasure-coded deployment. One redundancy group
//! is `data + parity` namespaces; the raw capacity to carve out is the usable
//! size inflated by the parity overhead. The planner spreads that raw
//! capacity over one group plus 25% headroom, and falls back to more,
//! max-sized namespaces once a single namespace would grow past the cap.

use serde::{Deserialize, Serialize};

use shardgrid_core::NamespacePlan;

use crate::error::PlanError;

/// Result of [`plan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardPlan {
    pub unit_count: u32,
    /// Size of every namespace, in the unit of the requested total.
    pub unit_size: u64,
}

impl ShardPlan {
    /// Raw capacity the plan reserves across all namespaces.
    pub fn total_capacity(&self) -> u64 {
        self.unit_size.saturating_mul(u64::from(self.unit_count))
    }

    /// One [`NamespacePlan`] per unit, in index order.
    pub fn namespaces(&self, required_password: bool) -> Vec<NamespacePlan> {
        (0..self.unit_count)
            .map(|index| NamespacePlan {
                index,
                size: self.unit_size,
                required_password,
            })
            .collect()
    }
}

/// Compute how many namespaces of which size hold `total_size` of data.
///
/// Deterministic and side-effect free.
pub fn plan(
    total_size: u64,
    data_shards: u32,
    parity_shards: u32,
    max_unit_size: u64,
) -> Result<ShardPlan, PlanError> {
    if data_shards == 0 || parity_shards == 0 {
        return Err(PlanError::InvalidRedundancy {
            data: data_shards,
            parity: parity_shards,
        });
    }
    if max_unit_size == 0 {
        return Err(PlanError::Configuration(
            "max unit size must be positive".to_string(),
        ));
    }
    if total_size == 0 {
        return Err(PlanError::Configuration(
            "total size must be positive".to_string(),
        ));
    }

    let overflow = || PlanError::Configuration(format!("total size {total_size} is too large"));

    let group = u64::from(data_shards) + u64::from(parity_shards);
    let required = total_size
        .checked_mul(group)
        .ok_or_else(overflow)?
        .div_ceil(u64::from(data_shards));

    // ceil(group * 1.25)
    let mut unit_count = (group * 5).div_ceil(4);
    let mut unit_size = required.div_ceil(group);
    if unit_size > max_unit_size {
        unit_size = max_unit_size;
        unit_count = required.div_ceil(max_unit_size);
    }

    let unit_count = u32::try_from(unit_count).map_err(|_| overflow())?;
    Ok(ShardPlan {
        unit_count,
        unit_size,
    })
}
