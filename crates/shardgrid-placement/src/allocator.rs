//! Placement allocator: drives namespace creation on remote nodes.
//!
//! Units are placed strictly in index order. Each unit starts its walk of the
//! ranked list one past the node that took the previous unit, so consecutive
//! units land on different nodes while capacity allows:
//! 1. Reserve the unit size in the ledger; skip nodes that refuse
//! 2. Create the namespace through the node's remote endpoint
//! 3. Capacity-class failure: release, try the next node for the same unit
//! 4. Any other failure: release, delete the unit best-effort, roll back, abort
//!
//! Each unit tries at most `ranked.len()` nodes.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use shardgrid_core::{
    Allocation, CandidateNode, DiskType, NamespaceMode, NamespacePlan, ResourceHandle, Secrets,
    namespace_name,
};
use shardgrid_remote::{NodeConnector, ResourceSpec, StorageUnitSpec, bounded};

use crate::error::{ExhaustionCause, PlacementExhausted};
use crate::ledger::CapacityLedger;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Places the namespaces of one deployment.
#[derive(Clone)]
pub struct Allocator {
    connector: Arc<dyn NodeConnector>,
    deployment_id: String,
    disk_type: DiskType,
    mode: NamespaceMode,
    call_timeout: Duration,
}

impl Allocator {
    pub fn new(connector: Arc<dyn NodeConnector>, deployment_id: impl Into<String>) -> Self {
        Self {
            connector,
            deployment_id: deployment_id.into(),
            disk_type: DiskType::default(),
            mode: NamespaceMode::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_disk_type(mut self, disk_type: DiskType) -> Self {
        self.disk_type = disk_type;
        self
    }

    pub fn with_mode(mut self, mode: NamespaceMode) -> Self {
        self.mode = mode;
        self
    }

    /// Upper bound for each create and delete call.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Create every unit of `plan` on `ranked` nodes.
    ///
    /// All-or-nothing: on success the allocations come back in index order
    /// and the ledger keeps their reservations. On failure every reservation
    /// of this pass is rolled back and the units already created are handed
    /// back in [`PlacementExhausted::committed`].
    pub async fn allocate(
        &self,
        plan: &[NamespacePlan],
        ranked: &[CandidateNode],
        secrets: &Secrets,
        ledger: &mut CapacityLedger,
    ) -> Result<Vec<Allocation>, PlacementExhausted> {
        ledger.checkpoint();
        let mut committed: Vec<Allocation> = Vec::with_capacity(plan.len());
        let mut cursor = 0;

        for unit in plan {
            match self.place_unit(unit, ranked, cursor, secrets, ledger).await {
                Ok((position, allocation)) => {
                    cursor = (position + 1) % ranked.len();
                    committed.push(allocation);
                }
                Err(cause) => {
                    ledger.rollback();
                    warn!(
                        deployment = %self.deployment_id,
                        unit = unit.index,
                        committed = committed.len(),
                        error = %cause,
                        "placement aborted"
                    );
                    return Err(PlacementExhausted {
                        unit: unit.index,
                        committed,
                        cause,
                    });
                }
            }
        }

        ledger.checkpoint();
        info!(
            deployment = %self.deployment_id,
            units = committed.len(),
            "placement complete"
        );
        Ok(committed)
    }

    /// Place one unit, returning the rank position of the node that took it.
    async fn place_unit(
        &self,
        unit: &NamespacePlan,
        ranked: &[CandidateNode],
        start: usize,
        secrets: &Secrets,
        ledger: &mut CapacityLedger,
    ) -> Result<(usize, Allocation), ExhaustionCause> {
        let name = namespace_name(&self.deployment_id, unit.index);
        let spec = ResourceSpec::Storage(StorageUnitSpec {
            name: name.clone(),
            size: unit.size,
            disk_type: self.disk_type,
            mode: self.mode,
            password: unit
                .required_password
                .then(|| secrets.namespace_password.clone()),
            public: false,
        });

        let mut tried = 0;
        for offset in 0..ranked.len() {
            let position = (start + offset) % ranked.len();
            let node = &ranked[position];
            if !ledger.reserve(&node.id, unit.size) {
                debug!(node = %node.id, unit = unit.index, size = unit.size, "node lacks capacity");
                continue;
            }

            tried += 1;
            debug!(node = %node.id, unit = unit.index, namespace = %name, "creating namespace");
            let endpoint = self.connector.connect(&node.id, &node.address);
            match bounded(self.call_timeout, endpoint.create(&spec)).await {
                Ok(handle) => {
                    return Ok((
                        position,
                        Allocation {
                            index: unit.index,
                            namespace_name: name,
                            node_id: node.id.clone(),
                            node_address: node.address.clone(),
                            size: unit.size,
                            unit_id: handle.id,
                            endpoint: handle.endpoint,
                        },
                    ));
                }
                Err(err) if err.is_capacity() => {
                    ledger.release(&node.id, unit.size);
                    warn!(node = %node.id, unit = unit.index, error = %err, "node out of capacity, trying next");
                }
                Err(err) => {
                    ledger.release(&node.id, unit.size);
                    // The call may have succeeded remotely before failing.
                    let partial = ResourceHandle::storage(name.as_str(), "");
                    match bounded(self.call_timeout, endpoint.delete(&partial)).await {
                        Ok(()) => debug!(node = %node.id, namespace = %name, "partial namespace removed"),
                        Err(e) if e.is_not_found() => {}
                        Err(e) => {
                            warn!(node = %node.id, namespace = %name, error = %e, "partial namespace cleanup failed")
                        }
                    }
                    return Err(ExhaustionCause::Remote {
                        node_id: node.id.clone(),
                        source: err,
                    });
                }
            }
        }

        Err(ExhaustionCause::NoCandidate { tried })
    }
}
