//! Deployment controller: drives one deployment through its lifecycle.
//!
//! The controller exclusively owns the `DeploymentState` of one deployment.
//! Every operation starts from the in-memory copy loaded at construction and
//! writes it back after each change (write-after-mutate); a crash between a
//! remote success and the write is repaired by the next `reconcile`.
//!
//! Operations take `&mut self`, so one controller never runs two of them at
//! once. Use [`ControllerRegistry`](crate::registry::ControllerRegistry) to
//! share controllers between tasks.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use shardgrid_core::{
    Allocation, DeploymentConfig, DeploymentState, DeploymentStatus, HealthRecord, InstalledHealth,
    LifecyclePhase, NodeId, ResourceHandle, Secrets,
};
use shardgrid_placement::{Allocator, CapacityLedger, PlacementExhausted, ShardPlan, plan, rank};
use shardgrid_remote::{
    ComputeUnitSpec, Health, NodeConnector, NodeDirectory, NodeFilter, RemoteError,
    RemoteResource, ResourceInfo, ResourceSpec, bounded,
};
use shardgrid_state::StateStore;

use crate::error::{LifecycleError, LifecycleResult};
use crate::health::{HealthTracker, ProbeResult, Verdict};

/// Remote services a controller talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn NodeDirectory>,
    pub connector: Arc<dyn NodeConnector>,
    /// Provisioner of the compute resource (fed `ResourceSpec::Compute`).
    pub compute: Arc<dyn RemoteResource>,
}

/// What one reconcile pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Nothing installed.
    Skipped,
    /// Another operation holds the deployment.
    Busy,
    Healthy,
    /// Probe failed, but fewer times in a row than the unhealthy threshold.
    Suspect { failures: u32 },
    /// Dependencies failed and were rebuilt.
    Repaired { storage_units: usize, compute: bool },
    /// A previous install had not finished and was run again.
    Retried,
}

/// A resource that could not be torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    pub resource: String,
    pub node: Option<NodeId>,
    pub error: RemoteError,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            Some(node) => write!(f, "{} on {node}: {}", self.resource, self.error),
            None => write!(f, "{}: {}", self.resource, self.error),
        }
    }
}

/// Outcome of [`DeploymentController::uninstall`]; the phase is always
/// `uninstalled` afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UninstallReport {
    pub failures: Vec<TeardownFailure>,
}

impl UninstallReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of probing every dependency once.
#[derive(Debug, Default)]
struct ProbeReport {
    /// Indices of storage units that failed their probe.
    failed_units: Vec<u32>,
    /// Plan indices without any allocation.
    missing_units: usize,
    compute_failed: bool,
}

impl ProbeReport {
    fn storage_failed(&self) -> bool {
        !self.failed_units.is_empty() || self.missing_units > 0
    }

    fn result(&self) -> ProbeResult {
        if self.storage_failed() || self.compute_failed {
            ProbeResult::Unhealthy
        } else {
            ProbeResult::Healthy
        }
    }
}

pub struct DeploymentController {
    config: DeploymentConfig,
    state: DeploymentState,
    store: StateStore,
    remote: Collaborators,
    call_timeout: Duration,
    probe_interval: Duration,
    ready_timeout: Duration,
}

impl DeploymentController {
    /// Validate `config` and load the persisted state of its deployment, or
    /// start a new `uninstalled` record.
    pub fn new(
        config: DeploymentConfig,
        store: StateStore,
        remote: Collaborators,
    ) -> LifecycleResult<Self> {
        config.validate()?;
        let call_timeout = config.remote_call_timeout()?;
        let probe_interval = config.probe_interval()?;
        let ready_timeout = config.ready_timeout()?;

        let id = config.deployment.name.clone();
        let state = match store.get_deployment(&id)? {
            Some(state) => {
                debug!(deployment = %id, phase = %state.phase, "loaded deployment state");
                state
            }
            None => {
                let secrets = match &config.storage.namespace_password {
                    Some(password) => Secrets::new(password.clone()),
                    None => Secrets::generate()?,
                };
                let state = DeploymentState::new(id, secrets);
                store.put_deployment(&state)?;
                state
            }
        };

        Ok(Self {
            config,
            state,
            store,
            remote,
            call_timeout,
            probe_interval,
            ready_timeout,
        })
    }

    pub fn id(&self) -> &str {
        &self.state.id
    }

    pub fn state(&self) -> &DeploymentState {
        &self.state
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    pub fn status(&self) -> DeploymentStatus {
        self.state.status()
    }

    /// Namespace layout for the configured capacity.
    pub fn plan(&self) -> LifecycleResult<ShardPlan> {
        let storage = &self.config.storage;
        Ok(plan(
            storage.size,
            storage.data_shards,
            storage.parity_shards,
            storage.max_unit_size,
        )?)
    }

    // ── install ───────────────────────────────────────────────────

    /// Bring the deployment to `installed(healthy)`.
    ///
    /// Idempotent: only missing namespaces are placed and compute is only
    /// provisioned when absent. On failure the phase stays `installing` and
    /// every namespace already created stays recorded.
    pub async fn install(&mut self) -> LifecycleResult<DeploymentStatus> {
        let plan = self.plan()?;
        if self.state.phase == LifecyclePhase::Installed(InstalledHealth::Healthy)
            && self.is_complete(&plan)
        {
            debug!(deployment = %self.state.id, "already installed");
            return Ok(self.status());
        }

        self.transition(LifecyclePhase::Installing)?;

        let placed = self.place_missing(&plan).await?;
        if placed > 0 && self.state.compute.is_some() {
            // Compute binds namespaces by position; rebind it to the new set.
            self.teardown_compute().await;
            self.persist()?;
        }

        if self.state.compute.is_none() {
            self.provision_compute().await?;
        }

        self.await_ready().await?;

        self.state.derived_endpoint = self.state.compute.as_ref().map(|c| c.endpoint.clone());
        self.state.quarantined_nodes.clear();
        self.state.health = HealthRecord::default();
        self.transition(LifecyclePhase::Installed(InstalledHealth::Healthy))?;
        Ok(self.status())
    }

    fn is_complete(&self, plan: &ShardPlan) -> bool {
        self.state.compute.is_some() && self.state.missing_indices(plan.unit_count).is_empty()
    }

    /// Place every plan index without an allocation. Returns how many were placed.
    async fn place_missing(&mut self, plan: &ShardPlan) -> LifecycleResult<usize> {
        let missing: BTreeSet<u32> = self.state.missing_indices(plan.unit_count).into_iter().collect();
        if missing.is_empty() {
            return Ok(0);
        }

        let storage = &self.config.storage;
        let filter = NodeFilter::new(self.config.deployment.farm.as_str(), storage.disk_type)
            .with_min_capacity(plan.unit_size);
        let candidates = bounded(self.call_timeout, self.remote.directory.list_candidates(&filter))
            .await
            .map_err(LifecycleError::Directory)?;

        let (preferred, quarantined): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|n| !self.state.quarantined_nodes.contains(&n.id));
        let masters = self.state.master_nodes();
        let ranked = rank(&preferred, &masters);
        let units: Vec<_> = plan
            .namespaces(storage.password_required)
            .into_iter()
            .filter(|u| missing.contains(&u.index))
            .collect();

        info!(
            deployment = %self.state.id,
            units = units.len(),
            unit_size = plan.unit_size,
            candidates = ranked.len(),
            quarantined = quarantined.len(),
            "placing namespaces"
        );

        let allocator = Allocator::new(self.remote.connector.clone(), self.state.id.clone())
            .with_disk_type(storage.disk_type)
            .with_mode(storage.mode)
            .with_call_timeout(self.call_timeout);
        let mut ledger = CapacityLedger::new(&ranked);

        let result = allocator
            .allocate(&units, &ranked, &self.state.secrets, &mut ledger)
            .await;
        let exhausted = match result {
            Ok(allocations) => return self.record_placed(allocations),
            Err(exhausted) if exhausted.is_capacity() && !quarantined.is_empty() => exhausted,
            Err(exhausted) => return self.record_aborted(exhausted),
        };

        // Quarantine only orders the pool; once the rest is full, use those nodes too.
        warn!(
            deployment = %self.state.id,
            unit = exhausted.unit,
            quarantined = quarantined.len(),
            "pool exhausted, falling back to quarantined nodes"
        );
        let placed_first = exhausted.committed.len();
        let done: BTreeSet<u32> = exhausted.committed.iter().map(|a| a.index).collect();
        let mut fallback = ranked;
        fallback.extend(rank(&quarantined, &masters));
        let mut ledger = CapacityLedger::new(&fallback);
        for allocation in &exhausted.committed {
            ledger.reserve(&allocation.node_id, allocation.size);
        }
        self.record_placed(exhausted.committed)?;

        let remaining: Vec<_> = units.into_iter().filter(|u| !done.contains(&u.index)).collect();
        let result = allocator
            .allocate(&remaining, &fallback, &self.state.secrets, &mut ledger)
            .await;
        match result {
            Ok(allocations) => Ok(placed_first + self.record_placed(allocations)?),
            Err(exhausted) => self.record_aborted(exhausted),
        }
    }

    fn record_placed(&mut self, allocations: Vec<Allocation>) -> LifecycleResult<usize> {
        let placed = allocations.len();
        self.state.merge_allocations(allocations);
        self.persist()?;
        Ok(placed)
    }

    /// Keep the units a failed pass created so uninstall can find them.
    fn record_aborted(&mut self, exhausted: PlacementExhausted) -> LifecycleResult<usize> {
        self.state.merge_allocations(exhausted.committed.iter().cloned());
        self.persist()?;
        Err(exhausted.into())
    }

    async fn provision_compute(&mut self) -> LifecycleResult<()> {
        let storage = &self.config.storage;
        let spec = ResourceSpec::Compute(ComputeUnitSpec {
            name: format!("{}_compute", self.state.id),
            storage_endpoints: self.state.storage_endpoints(),
            data_shards: storage.data_shards,
            parity_shards: storage.parity_shards,
            namespace_password: storage
                .password_required
                .then(|| self.state.secrets.namespace_password.clone()),
            login: self.config.compute.login.clone(),
            password: self.config.compute.password.clone(),
        });

        let handle = bounded(self.call_timeout, self.remote.compute.create(&spec))
            .await
            .map_err(LifecycleError::Compute)?;
        info!(deployment = %self.state.id, endpoint = %handle.endpoint, "compute provisioned");
        self.state.compute = Some(handle);
        self.persist()
    }

    /// Probe until `healthy_threshold` consecutive healthy probes, or give up
    /// after `ready_timeout`.
    async fn await_ready(&self) -> LifecycleResult<()> {
        let waited = self.ready_timeout;
        let mut tracker = HealthTracker::new(HealthRecord::default(), &self.config.health);
        let unit_count = self.plan()?.unit_count;

        let gate = async {
            loop {
                let report = self.probe(unit_count).await;
                tracker.record(report.result());
                if tracker.is_ready() {
                    return;
                }
                tokio::time::sleep(self.probe_interval).await;
            }
        };

        tokio::time::timeout(waited, gate)
            .await
            .map_err(|_| LifecycleError::NotReady { waited })?;
        debug!(deployment = %self.state.id, "dependencies ready");
        Ok(())
    }

    // ── reconcile ─────────────────────────────────────────────────

    /// Check every dependency once and repair the deployment if needed.
    ///
    /// Unhealthy namespaces are dropped and their nodes ranked behind every
    /// other candidate, used only once the rest of the pool is full. The
    /// compute resource is always rebuilt on top of the repaired set.
    pub async fn reconcile(&mut self) -> LifecycleResult<ReconcileOutcome> {
        match self.state.phase {
            LifecyclePhase::Uninstalled | LifecyclePhase::Uninstalling => {
                return Ok(ReconcileOutcome::Skipped);
            }
            LifecyclePhase::Installing | LifecyclePhase::Installed(InstalledHealth::Degraded) => {
                info!(deployment = %self.state.id, phase = %self.state.phase, "resuming install");
                self.drop_unhealthy().await?;
                self.install().await?;
                return Ok(ReconcileOutcome::Retried);
            }
            LifecyclePhase::Installed(InstalledHealth::Healthy) => {}
        }

        let unit_count = self.plan()?.unit_count;
        let report = self.probe(unit_count).await;
        let mut tracker = HealthTracker::new(self.state.health, &self.config.health);
        let verdict = tracker.record(report.result());
        self.state.health = tracker.snapshot();

        match verdict {
            Verdict::Healthy => {
                self.persist()?;
                return Ok(ReconcileOutcome::Healthy);
            }
            Verdict::Suspect => {
                self.persist()?;
                return Ok(ReconcileOutcome::Suspect {
                    failures: tracker.consecutive_failures(),
                });
            }
            Verdict::Unhealthy => {}
        }

        warn!(
            deployment = %self.state.id,
            failed_units = ?report.failed_units,
            missing_units = report.missing_units,
            compute_failed = report.compute_failed,
            "deployment degraded"
        );
        self.state.derived_endpoint = None;
        self.transition(LifecyclePhase::Installed(InstalledHealth::Degraded))?;

        if !report.failed_units.is_empty() {
            self.drop_allocations(&report.failed_units).await;
        }
        self.teardown_compute().await;
        self.state.health = HealthRecord::default();
        self.persist()?;

        self.install().await?;
        Ok(ReconcileOutcome::Repaired {
            storage_units: report.failed_units.len() + report.missing_units,
            compute: report.compute_failed,
        })
    }

    /// Probe every storage unit and the compute resource once.
    async fn probe(&self, unit_count: u32) -> ProbeReport {
        let mut report = ProbeReport {
            missing_units: self.state.missing_indices(unit_count).len(),
            ..ProbeReport::default()
        };

        for allocation in &self.state.allocations {
            let endpoint = self
                .remote
                .connector
                .connect(&allocation.node_id, &allocation.node_address);
            let handle = allocation.handle();
            match bounded(self.call_timeout, endpoint.health(&handle)).await {
                Ok(Health::Healthy) => {}
                Ok(Health::Unhealthy) => {
                    debug!(node = %allocation.node_id, unit = allocation.index, "namespace unhealthy");
                    report.failed_units.push(allocation.index);
                }
                Err(e) => {
                    debug!(node = %allocation.node_id, unit = allocation.index, error = %e, "namespace probe failed");
                    report.failed_units.push(allocation.index);
                }
            }
        }

        report.compute_failed = match &self.state.compute {
            None => true,
            Some(handle) => !matches!(
                bounded(self.call_timeout, self.remote.compute.health(handle)).await,
                Ok(Health::Healthy)
            ),
        };
        report
    }

    /// Drop the allocations of an unfinished install that fail their probe,
    /// so the install can place them again.
    async fn drop_unhealthy(&mut self) -> LifecycleResult<()> {
        if self.state.allocations.is_empty() {
            return Ok(());
        }
        let unit_count = self.plan()?.unit_count;
        let report = self.probe(unit_count).await;
        if report.failed_units.is_empty() {
            return Ok(());
        }
        debug!(deployment = %self.state.id, failed_units = ?report.failed_units, "dropping failed namespaces");
        self.drop_allocations(&report.failed_units).await;
        self.persist()
    }

    /// Remove the given allocations from state, deleting their namespaces
    /// best-effort and quarantining their nodes.
    async fn drop_allocations(&mut self, indices: &[u32]) {
        let (dropped, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.state.allocations)
            .into_iter()
            .partition(|a| indices.contains(&a.index));
        self.state.allocations = kept;

        for allocation in dropped {
            let endpoint = self
                .remote
                .connector
                .connect(&allocation.node_id, &allocation.node_address);
            match bounded(self.call_timeout, endpoint.delete(&allocation.handle())).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(
                    node = %allocation.node_id,
                    namespace = %allocation.namespace_name,
                    error = %e,
                    "failed namespace not removed"
                ),
            }
            self.state.quarantined_nodes.insert(allocation.node_id);
        }
    }

    /// Deprovision compute best-effort and forget its handle.
    async fn teardown_compute(&mut self) {
        let Some(handle) = self.state.compute.take() else {
            return;
        };
        self.state.derived_endpoint = None;
        if let Err(e) = self.delete_compute(&handle).await {
            warn!(deployment = %self.state.id, compute = %handle.id, error = %e, "compute not deprovisioned");
        }
    }

    async fn delete_compute(&self, handle: &ResourceHandle) -> Result<(), RemoteError> {
        match bounded(self.call_timeout, self.remote.compute.delete(handle)).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    // ── uninstall ─────────────────────────────────────────────────

    /// Tear down compute, then every namespace in reverse index order.
    ///
    /// Individual failures are collected in the report and never stop the
    /// teardown; the phase always ends `uninstalled`.
    pub async fn uninstall(&mut self) -> LifecycleResult<UninstallReport> {
        let mut report = UninstallReport::default();
        if self.state.phase == LifecyclePhase::Uninstalled
            && self.state.allocations.is_empty()
            && self.state.compute.is_none()
        {
            return Ok(report);
        }

        self.transition(LifecyclePhase::Uninstalling)?;

        if let Some(handle) = self.state.compute.take() {
            let deleted = self.delete_compute(&handle).await;
            if let Err(error) = deleted {
                warn!(deployment = %self.state.id, compute = %handle.id, error = %error, "compute teardown failed");
                report.failures.push(TeardownFailure {
                    resource: handle.id,
                    node: None,
                    error,
                });
            }
            self.state.derived_endpoint = None;
            self.persist()?;
        }

        let allocations = std::mem::take(&mut self.state.allocations);
        for allocation in allocations.iter().rev() {
            let endpoint = self
                .remote
                .connector
                .connect(&allocation.node_id, &allocation.node_address);
            match bounded(self.call_timeout, endpoint.delete(&allocation.handle())).await {
                Ok(()) => {
                    debug!(node = %allocation.node_id, namespace = %allocation.namespace_name, "namespace removed")
                }
                Err(e) if e.is_not_found() => {}
                Err(error) => {
                    warn!(
                        node = %allocation.node_id,
                        namespace = %allocation.namespace_name,
                        error = %error,
                        "namespace teardown failed"
                    );
                    report.failures.push(TeardownFailure {
                        resource: allocation.namespace_name.clone(),
                        node: Some(allocation.node_id.clone()),
                        error,
                    });
                }
            }
        }

        self.state.derived_endpoint = None;
        self.state.health = HealthRecord::default();
        self.state.quarantined_nodes.clear();
        self.transition(LifecyclePhase::Uninstalled)?;
        info!(
            deployment = %self.state.id,
            failures = report.failures.len(),
            "deployment uninstalled"
        );
        Ok(report)
    }

    // ── info ──────────────────────────────────────────────────────

    /// Live information of every namespace, in index order.
    pub async fn storage_info(&self) -> LifecycleResult<Vec<ResourceInfo>> {
        let mut infos = Vec::with_capacity(self.state.allocations.len());
        for allocation in &self.state.allocations {
            let endpoint = self
                .remote
                .connector
                .connect(&allocation.node_id, &allocation.node_address);
            let info = bounded(self.call_timeout, endpoint.info(&allocation.handle()))
                .await
                .map_err(|source| LifecycleError::Storage {
                    unit: allocation.namespace_name.clone(),
                    source,
                })?;
            infos.push(info);
        }
        Ok(infos)
    }

    // ── state ─────────────────────────────────────────────────────

    fn transition(&mut self, next: LifecyclePhase) -> LifecycleResult<()> {
        let from = self.state.phase;
        if from == next {
            return self.persist();
        }
        if !from.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition { from, to: next });
        }
        self.state.phase = next;
        info!(deployment = %self.state.id, %from, to = %next, "phase transition");
        self.persist()
    }

    fn persist(&mut self) -> LifecycleResult<()> {
        self.state.touch();
        self.store.put_deployment(&self.state)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardgrid_core::DiskType;
    use shardgrid_remote::{MemoryCluster, MemoryCompute};

    const CONFIG: &str = r#"
[deployment]
name = "s3"
farm = "farm"

[storage]
size = 100
data_shards = 2
parity_shards = 1
namespace_password = "pw"

[health]
probe_interval = "1ms"
ready_timeout = "200ms"

[timeouts]
remote_call = "1s"
"#;

    struct Fixture {
        cluster: MemoryCluster,
        compute: MemoryCompute,
        store: StateStore,
    }

    impl Fixture {
        fn new(nodes: usize) -> Self {
            let cluster = MemoryCluster::new();
            for i in 1..=nodes {
                cluster.add_node(&format!("n{i}"), "farm", DiskType::Ssd, 1000);
            }
            Self {
                cluster,
                compute: MemoryCompute::new(),
                store: StateStore::open_in_memory().unwrap(),
            }
        }

        fn controller(&self) -> DeploymentController {
            let config = DeploymentConfig::from_toml_str(CONFIG).unwrap();
            let remote = Collaborators {
                directory: Arc::new(self.cluster.clone()),
                connector: Arc::new(self.cluster.clone()),
                compute: Arc::new(self.compute.clone()),
            };
            DeploymentController::new(config, self.store.clone(), remote).unwrap()
        }
    }

    // 100 GB at 2+1: 4 namespaces of 50 GB.
    const UNITS: usize = 4;

    #[tokio::test]
    async fn install_reaches_healthy_with_endpoint() {
        let fx = Fixture::new(3);
        let mut ctl = fx.controller();

        let status = ctl.install().await.unwrap();

        assert_eq!(status.phase, LifecyclePhase::Installed(InstalledHealth::Healthy));
        assert!(status.endpoint.is_some());
        assert_eq!(ctl.state().allocations.len(), UNITS);
        assert_eq!(fx.cluster.total_units(), UNITS);

        let provisioned = fx.compute.provisions();
        assert_eq!(provisioned.len(), 1);
        assert_eq!(provisioned[0].storage_endpoints, ctl.state().storage_endpoints());
        assert_eq!(provisioned[0].namespace_password.as_deref(), Some("pw"));
    }

    #[tokio::test]
    async fn install_is_idempotent() {
        let fx = Fixture::new(3);
        let mut ctl = fx.controller();

        let first = ctl.install().await.unwrap();
        let second = ctl.install().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fx.compute.provisions().len(), 1);
        assert_eq!(fx.cluster.total_units(), UNITS);
    }

    #[tokio::test]
    async fn state_is_persisted_and_reloaded() {
        let fx = Fixture::new(3);
        let mut ctl = fx.controller();
        ctl.install().await.unwrap();
        let installed = ctl.state().clone();

        let reloaded = fx.controller();
        assert_eq!(reloaded.state().allocations, installed.allocations);
        assert_eq!(reloaded.status(), installed.status());
        assert_eq!(reloaded.state().secrets, Secrets::new("pw"));
    }

    #[tokio::test]
    async fn exhausted_pool_leaves_installing_and_keeps_committed() {
        let fx = Fixture::new(1);
        fx.cluster.set_namespace_slots("n1", 2);
        let mut ctl = fx.controller();

        let err = ctl.install().await.unwrap_err();

        assert!(matches!(err, LifecycleError::Placement(_)));
        assert_eq!(ctl.state().phase, LifecyclePhase::Installing);
        assert_eq!(ctl.state().allocations.len(), 2);
        let stored = fx.store.get_deployment("s3").unwrap().unwrap();
        assert_eq!(stored.allocations.len(), 2);
        assert_eq!(fx.compute.running(), 0);
    }

    #[tokio::test]
    async fn retry_places_only_missing_units() {
        let fx = Fixture::new(2);
        fx.cluster.set_namespace_slots("n1", 1);
        fx.cluster.set_namespace_slots("n2", 1);
        let mut ctl = fx.controller();
        assert!(ctl.install().await.is_err());
        assert_eq!(ctl.state().allocations.len(), 2);

        fx.cluster.add_node("n3", "farm", DiskType::Ssd, 1000);
        let outcome = ctl.reconcile().await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Retried);
        assert!(ctl.state().phase.is_installed());
        assert_eq!(fx.cluster.units_on("n3").len(), 2);
        assert_eq!(fx.cluster.total_units(), UNITS);
    }

    #[tokio::test]
    async fn compute_failure_keeps_installing() {
        let fx = Fixture::new(3);
        fx.compute
            .set_provision_error(Some(RemoteError::Transport("down".into())));
        let mut ctl = fx.controller();

        let err = ctl.install().await.unwrap_err();

        assert!(matches!(err, LifecycleError::Compute(_)));
        assert_eq!(ctl.state().phase, LifecyclePhase::Installing);
        assert_eq!(ctl.state().allocations.len(), UNITS);
    }

    #[tokio::test]
    async fn never_ready_times_out() {
        let fx = Fixture::new(3);
        fx.compute.set_healthy(false);
        let mut ctl = fx.controller();

        let err = ctl.install().await.unwrap_err();

        assert!(matches!(err, LifecycleError::NotReady { .. }));
        assert_eq!(ctl.state().phase, LifecyclePhase::Installing);
        assert!(ctl.status().endpoint.is_none());
    }

    #[tokio::test]
    async fn reconcile_healthy_and_skipped() {
        let fx = Fixture::new(3);
        let mut ctl = fx.controller();
        assert_eq!(ctl.reconcile().await.unwrap(), ReconcileOutcome::Skipped);

        ctl.install().await.unwrap();
        assert_eq!(ctl.reconcile().await.unwrap(), ReconcileOutcome::Healthy);
    }

    #[tokio::test]
    async fn unhealthy_namespace_is_replaced_elsewhere() {
        let fx = Fixture::new(4);
        let mut ctl = fx.controller();
        ctl.install().await.unwrap();
        let bad = ctl.state().allocations[0].node_id.clone();
        let on_bad = fx.cluster.units_on(&bad).len();
        fx.cluster.set_unhealthy(&bad, true);

        let outcome = ctl.reconcile().await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Repaired {
                storage_units: on_bad,
                compute: false
            }
        );
        assert_eq!(ctl.state().phase, LifecyclePhase::Installed(InstalledHealth::Healthy));
        assert!(ctl.state().allocations.iter().all(|a| a.node_id != bad));
        assert_eq!(ctl.state().allocations.len(), UNITS);
        assert!(fx.cluster.units_on(&bad).is_empty());
        assert_eq!(fx.compute.provisions().len(), 2);
        assert_eq!(fx.compute.running(), 1);
        assert!(ctl.state().quarantined_nodes.is_empty());
    }

    #[tokio::test]
    async fn compute_failure_rebuilds_compute_only() {
        let fx = Fixture::new(3);
        let mut ctl = fx.controller();
        ctl.install().await.unwrap();
        let allocations = ctl.state().allocations.clone();
        let old_endpoint = ctl.status().endpoint;
        let handle = ctl.state().compute.clone().unwrap();
        fx.compute.delete(&handle).await.unwrap();

        let outcome = ctl.reconcile().await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Repaired {
                storage_units: 0,
                compute: true
            }
        );
        assert_eq!(ctl.state().allocations, allocations);
        assert_ne!(ctl.status().endpoint, old_endpoint);
        assert_eq!(fx.compute.running(), 1);
    }

    #[tokio::test]
    async fn uninstall_tears_everything_down() {
        let fx = Fixture::new(3);
        let mut ctl = fx.controller();
        ctl.install().await.unwrap();

        let report = ctl.uninstall().await.unwrap();

        assert!(report.is_clean());
        assert_eq!(ctl.status().phase, LifecyclePhase::Uninstalled);
        assert!(ctl.status().endpoint.is_none());
        assert_eq!(fx.cluster.total_units(), 0);
        assert_eq!(fx.compute.running(), 0);
        assert_eq!(fx.cluster.free_capacity("n1"), Some(1000));
    }

    #[tokio::test]
    async fn uninstall_continues_past_unreachable_node() {
        let fx = Fixture::new(2);
        let mut ctl = fx.controller();
        ctl.install().await.unwrap();
        fx.cluster.set_reachable("n1", false);
        let on_n1 = fx.cluster.units_on("n1").len();

        let report = ctl.uninstall().await.unwrap();

        assert_eq!(report.failures.len(), on_n1);
        assert!(report.failures.iter().all(|f| f.node.as_deref() == Some("n1")));
        assert!(fx.cluster.units_on("n2").is_empty());
        assert_eq!(ctl.status().phase, LifecyclePhase::Uninstalled);
    }

    #[tokio::test]
    async fn uninstall_of_uninstalled_is_noop() {
        let fx = Fixture::new(1);
        let mut ctl = fx.controller();

        let report = ctl.uninstall().await.unwrap();

        assert!(report.is_clean());
        assert_eq!(fx.compute.deprovisions(), 0);
        assert_eq!(ctl.status().phase, LifecyclePhase::Uninstalled);
    }

    #[tokio::test]
    async fn storage_info_in_index_order() {
        let fx = Fixture::new(3);
        let mut ctl = fx.controller();
        ctl.install().await.unwrap();

        let infos = ctl.storage_info().await.unwrap();

        assert_eq!(infos.len(), UNITS);
        for (info, allocation) in infos.iter().zip(&ctl.state().allocations) {
            assert_eq!(info.handle.id, allocation.unit_id);
            assert_eq!(info.size, Some(50));
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let fx = Fixture::new(1);
        let mut config = DeploymentConfig::from_toml_str(CONFIG).unwrap();
        config.storage.parity_shards = 3;
        let remote = Collaborators {
            directory: Arc::new(fx.cluster.clone()),
            connector: Arc::new(fx.cluster.clone()),
            compute: Arc::new(fx.compute.clone()),
        };

        let err = DeploymentController::new(config, fx.store.clone(), remote).err();
        assert!(matches!(err, Some(LifecycleError::Configuration(_))));
    }
}
