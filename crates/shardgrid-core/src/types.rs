//! Domain types for ShardGrid.
//!
//! These values describe the candidate nodes offered by the directory, the
//! namespaces computed by the planner, the allocations committed on remote
//! nodes and the persisted state of a single deployment. All of them are
//! JSON-serializable so the state store can keep them as opaque values.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Unique identifier for a managed deployment.
pub type DeploymentId = String;

/// Unique identifier for a storage node.
pub type NodeId = String;

// ── Nodes ─────────────────────────────────────────────────────────

/// Kind of disk a namespace is carved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskType {
    #[default]
    Ssd,
    Hdd,
}

impl fmt::Display for DiskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskType::Ssd => f.write_str("ssd"),
            DiskType::Hdd => f.write_str("hdd"),
        }
    }
}

/// Addressing mode of a namespace on its storage daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceMode {
    User,
    Seq,
    #[default]
    Direct,
}

/// A node offered by the directory as a placement target.
///
/// `remaining_capacity` is a snapshot taken when the directory was queried
/// and may already be stale; the remote node has the final word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateNode {
    pub id: NodeId,
    /// Free capacity in the same unit as namespace sizes (GB).
    pub remaining_capacity: u64,
    /// Address of the node's remote execution endpoint.
    pub address: String,
}

impl CandidateNode {
    pub fn new(id: impl Into<String>, remaining_capacity: u64, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            remaining_capacity,
            address: address.into(),
        }
    }
}

// ── Planning ──────────────────────────────────────────────────────

/// One namespace the planner wants created.
///
/// Plans are immutable once computed. `index` is significant: consumers bind
/// to namespaces by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespacePlan {
    pub index: u32,
    pub size: u64,
    /// Whether the namespace is protected by the deployment password.
    pub required_password: bool,
}

/// Credentials shared by every namespace of a deployment.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secrets {
    pub namespace_password: String,
}

impl Secrets {
    pub fn new(namespace_password: impl Into<String>) -> Self {
        Self {
            namespace_password: namespace_password.into(),
        }
    }

    /// Generate a random 32 character password.
    pub fn generate() -> ConfigResult<Self> {
        let mut buf = [0u8; 16];
        getrandom::getrandom(&mut buf).map_err(|e| ConfigError::Entropy(e.to_string()))?;
        Ok(Self::new(hex::encode(buf)))
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("namespace_password", &"<redacted>")
            .finish()
    }
}

// ── Remote handles ────────────────────────────────────────────────

/// Kind of remote resource behind a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    StorageUnit,
    ComputeUnit,
}

/// Reference to a resource that exists on the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub kind: ResourceKind,
    pub id: String,
    /// Reachable address of the resource (namespace URL, compute URL).
    pub endpoint: String,
}

impl ResourceHandle {
    pub fn storage(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::StorageUnit,
            id: id.into(),
            endpoint: endpoint.into(),
        }
    }

    pub fn compute(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::ComputeUnit,
            id: id.into(),
            endpoint: endpoint.into(),
        }
    }
}

// ── Allocations ───────────────────────────────────────────────────

/// A namespace committed on a remote node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Position of the namespace in the plan.
    pub index: u32,
    pub namespace_name: String,
    pub node_id: NodeId,
    pub node_address: String,
    pub size: u64,
    /// Identifier returned by the remote node.
    pub unit_id: String,
    pub endpoint: String,
}

impl Allocation {
    /// Handle used to address this namespace on its node.
    pub fn handle(&self) -> ResourceHandle {
        ResourceHandle::storage(self.unit_id.clone(), self.endpoint.clone())
    }
}

/// Deterministic namespace name for a deployment's `index`-th unit.
pub fn namespace_name(deployment_id: &str, index: u32) -> String {
    format!("{deployment_id}_{index}")
}

// ── Lifecycle ─────────────────────────────────────────────────────

/// Health of an installed deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstalledHealth {
    Healthy,
    Degraded,
}

/// Lifecycle phase shared by every managed resource kind.
///
/// ```text
/// uninstalled → installing → installed(healthy) ⇄ installed(degraded) → uninstalling → uninstalled
/// ```
///
/// `installed(degraded)` always leaves through `installing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "health", rename_all = "snake_case")]
pub enum LifecyclePhase {
    Uninstalled,
    Installing,
    Installed(InstalledHealth),
    Uninstalling,
}

impl LifecyclePhase {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: LifecyclePhase) -> bool {
        use InstalledHealth::*;
        use LifecyclePhase::*;

        match (self, next) {
            // Teardown must always be reachable.
            (_, Uninstalling) => true,
            (Uninstalled, Installing) => true,
            (Installing, Installing) => true,
            (Installing, Installed(Healthy)) => true,
            (Installed(Healthy), Installed(Degraded)) => true,
            // Sub-resources went missing from a healthy record.
            (Installed(Healthy), Installing) => true,
            (Installed(Degraded), Installing) => true,
            (Uninstalling, Uninstalled) => true,
            _ => false,
        }
    }

    pub fn is_installed(self) -> bool {
        matches!(self, LifecyclePhase::Installed(_))
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecyclePhase::Uninstalled => f.write_str("uninstalled"),
            LifecyclePhase::Installing => f.write_str("installing"),
            LifecyclePhase::Installed(InstalledHealth::Healthy) => f.write_str("installed(healthy)"),
            LifecyclePhase::Installed(InstalledHealth::Degraded) => {
                f.write_str("installed(degraded)")
            }
            LifecyclePhase::Uninstalling => f.write_str("uninstalling"),
        }
    }
}

/// Consecutive probe counters, persisted between reconcile passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

// ── Deployment state ──────────────────────────────────────────────

/// Persisted state of one managed deployment.
///
/// Owned by exactly one lifecycle controller; never shared across deployments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentState {
    pub id: DeploymentId,
    pub phase: LifecyclePhase,
    /// Committed namespaces, ordered by `index`.
    pub allocations: Vec<Allocation>,
    /// Reachable URL of the compute resource once it is up.
    pub derived_endpoint: Option<String>,
    pub compute: Option<ResourceHandle>,
    pub secrets: Secrets,
    #[serde(default)]
    pub health: HealthRecord,
    /// Nodes whose namespaces failed health checks; skipped by the next placement.
    #[serde(default)]
    pub quarantined_nodes: BTreeSet<NodeId>,
    /// Unix timestamp of the last write.
    pub updated_at: u64,
}

impl DeploymentState {
    pub fn new(id: impl Into<String>, secrets: Secrets) -> Self {
        Self {
            id: id.into(),
            phase: LifecyclePhase::Uninstalled,
            allocations: Vec::new(),
            derived_endpoint: None,
            compute: None,
            secrets,
            health: HealthRecord::default(),
            quarantined_nodes: BTreeSet::new(),
            updated_at: epoch_secs(),
        }
    }

    /// Nodes already hosting a namespace of this deployment, in index order.
    pub fn master_nodes(&self) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        self.allocations
            .iter()
            .filter(|a| seen.insert(a.node_id.as_str()))
            .map(|a| a.node_id.clone())
            .collect()
    }

    /// Plan indices in `0..unit_count` that have no allocation yet.
    pub fn missing_indices(&self, unit_count: u32) -> Vec<u32> {
        let present: HashSet<u32> = self.allocations.iter().map(|a| a.index).collect();
        (0..unit_count).filter(|i| !present.contains(i)).collect()
    }

    /// Insert allocations, replacing any with the same index, keeping index order.
    pub fn merge_allocations(&mut self, allocations: impl IntoIterator<Item = Allocation>) {
        for allocation in allocations {
            self.allocations.retain(|a| a.index != allocation.index);
            self.allocations.push(allocation);
        }
        self.allocations.sort_by_key(|a| a.index);
    }

    /// Namespace endpoints in index order, as bound by the compute resource.
    pub fn storage_endpoints(&self) -> Vec<String> {
        self.allocations.iter().map(|a| a.endpoint.clone()).collect()
    }

    pub fn status(&self) -> DeploymentStatus {
        DeploymentStatus {
            phase: self.phase,
            endpoint: self.derived_endpoint.clone(),
        }
    }

    /// Refresh `updated_at` before a write.
    pub fn touch(&mut self) {
        self.updated_at = epoch_secs();
    }
}

/// Externally visible summary of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub phase: LifecyclePhase,
    pub endpoint: Option<String>,
}

pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc(index: u32, node: &str) -> Allocation {
        Allocation {
            index,
            namespace_name: namespace_name("s3", index),
            node_id: node.to_string(),
            node_address: format!("http://{node}:6600"),
            size: 100,
            unit_id: namespace_name("s3", index),
            endpoint: format!("{node}:9900"),
        }
    }

    fn state() -> DeploymentState {
        DeploymentState::new("s3", Secrets::new("pw"))
    }

    #[test]
    fn phase_graph_allows_documented_path() {
        use InstalledHealth::*;
        use LifecyclePhase::*;

        assert!(Uninstalled.can_transition_to(Installing));
        assert!(Installing.can_transition_to(Installed(Healthy)));
        assert!(Installed(Healthy).can_transition_to(Installed(Degraded)));
        assert!(Installed(Degraded).can_transition_to(Installing));
        assert!(Installed(Healthy).can_transition_to(Uninstalling));
        assert!(Uninstalling.can_transition_to(Uninstalled));
    }

    #[test]
    fn degraded_never_returns_directly_to_healthy() {
        use InstalledHealth::*;
        use LifecyclePhase::*;

        assert!(!Installed(Degraded).can_transition_to(Installed(Healthy)));
        assert!(!Uninstalled.can_transition_to(Installed(Healthy)));
        assert!(!Installing.can_transition_to(Installed(Degraded)));
        assert!(!Installing.can_transition_to(Uninstalled));
    }

    #[test]
    fn phase_display_and_serde() {
        let phase = LifecyclePhase::Installed(InstalledHealth::Degraded);
        assert_eq!(phase.to_string(), "installed(degraded)");

        let json = serde_json::to_string(&phase).unwrap();
        assert_eq!(json, r#"{"phase":"installed","health":"degraded"}"#);
        let back: LifecyclePhase = serde_json::from_str(&json).unwrap();
        assert_eq!(back, phase);

        let json = serde_json::to_string(&LifecyclePhase::Uninstalled).unwrap();
        assert_eq!(json, r#"{"phase":"uninstalled"}"#);
    }

    #[test]
    fn merge_keeps_index_order_and_replaces() {
        let mut s = state();
        s.merge_allocations(vec![alloc(2, "n3"), alloc(0, "n1")]);
        s.merge_allocations(vec![alloc(1, "n2"), alloc(2, "n4")]);

        let indices: Vec<u32> = s.allocations.iter().map(|a| a.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(s.allocations[2].node_id, "n4");
    }

    #[test]
    fn missing_indices_reports_gaps() {
        let mut s = state();
        s.merge_allocations(vec![alloc(0, "n1"), alloc(2, "n2")]);
        assert_eq!(s.missing_indices(4), vec![1, 3]);
        assert!(state().missing_indices(0).is_empty());
    }

    #[test]
    fn master_nodes_are_distinct_in_index_order() {
        let mut s = state();
        s.merge_allocations(vec![alloc(0, "n2"), alloc(1, "n1"), alloc(2, "n2")]);
        assert_eq!(s.master_nodes(), vec!["n2".to_string(), "n1".to_string()]);
    }

    #[test]
    fn generated_secrets_are_32_hex_chars() {
        let secrets = Secrets::generate().unwrap();
        assert_eq!(secrets.namespace_password.len(), 32);
        assert!(secrets.namespace_password.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secrets, Secrets::generate().unwrap());
    }

    #[test]
    fn secrets_debug_is_redacted() {
        let debug = format!("{:?}", Secrets::new("hunter2"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn status_mirrors_phase_and_endpoint() {
        let mut s = state();
        s.phase = LifecyclePhase::Installed(InstalledHealth::Healthy);
        s.derived_endpoint = Some("http://10.0.0.9:9000".to_string());

        let status = s.status();
        assert_eq!(status.phase, s.phase);
        assert_eq!(status.endpoint.as_deref(), Some("http://10.0.0.9:9000"));
    }
}
