//! In-memory collaborators.
//!
//! `MemoryCluster` simulates a directory plus the storage nodes it lists;
//! `MemoryCompute` simulates the compute provisioner. Both keep their state
//! behind an `Arc<Mutex<_>>`, so clones observe the same cluster and tests
//! can flip failure switches while a controller holds a trait object.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::json;
use tracing::debug;

use shardgrid_core::{CandidateNode, DiskType, ResourceHandle};

use crate::directory::{NodeDirectory, NodeFilter};
use crate::error::{RemoteError, RemoteResult};
use crate::resource::{
    ComputeUnitSpec, Health, NodeConnector, RemoteFuture, RemoteResource, ResourceInfo,
    ResourceSpec,
};

// ── Storage nodes ─────────────────────────────────────────────────

#[derive(Debug)]
struct SimNode {
    id: String,
    address: String,
    farm: String,
    disk_type: DiskType,
    free: u64,
    /// Capacity the directory advertises, when it differs from `free`.
    reported: Option<u64>,
    /// Remaining namespace slots; unlimited when `None`.
    slots: Option<u32>,
    reachable: bool,
    unhealthy: bool,
    create_error: Option<RemoteError>,
    /// Error returned after the namespace was already created.
    post_create_error: Option<RemoteError>,
    create_attempts: u32,
    units: BTreeMap<String, u64>,
}

impl SimNode {
    fn handle(&self, name: &str) -> ResourceHandle {
        ResourceHandle::storage(name, format!("zdb://{}:9900/{name}", self.id))
    }

    fn ensure_reachable(&self) -> RemoteResult<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(RemoteError::Transport(format!("node {} unreachable", self.id)))
        }
    }
}

#[derive(Debug, Default)]
struct ClusterInner {
    /// Directory order is insertion order.
    nodes: Vec<SimNode>,
}

/// Simulated node directory and storage nodes.
#[derive(Debug, Clone, Default)]
pub struct MemoryCluster {
    inner: Arc<Mutex<ClusterInner>>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reachable, healthy node with `capacity` GB free.
    pub fn add_node(&self, id: &str, farm: &str, disk_type: DiskType, capacity: u64) {
        self.lock().nodes.push(SimNode {
            id: id.to_string(),
            address: Self::address_of(id),
            farm: farm.to_string(),
            disk_type,
            free: capacity,
            reported: None,
            slots: None,
            reachable: true,
            unhealthy: false,
            create_error: None,
            post_create_error: None,
            create_attempts: 0,
            units: BTreeMap::new(),
        });
    }

    /// Address the directory reports for `id`.
    pub fn address_of(id: &str) -> String {
        format!("http://{id}:6600")
    }

    pub fn set_namespace_slots(&self, id: &str, slots: u32) {
        self.with_node(id, |n| n.slots = Some(slots));
    }

    /// Make the directory advertise `capacity` regardless of actual free space.
    pub fn set_reported_capacity(&self, id: &str, capacity: u64) {
        self.with_node(id, |n| n.reported = Some(capacity));
    }

    pub fn set_reachable(&self, id: &str, reachable: bool) {
        self.with_node(id, |n| n.reachable = reachable);
    }

    /// Make every namespace on the node report unhealthy.
    pub fn set_unhealthy(&self, id: &str, unhealthy: bool) {
        self.with_node(id, |n| n.unhealthy = unhealthy);
    }

    /// Fail every subsequent create on the node with `error`.
    pub fn set_create_error(&self, id: &str, error: Option<RemoteError>) {
        self.with_node(id, |n| n.create_error = error);
    }

    /// Create the namespace, then fail the call with `error` anyway.
    pub fn set_post_create_error(&self, id: &str, error: Option<RemoteError>) {
        self.with_node(id, |n| n.post_create_error = error);
    }

    /// Names of the namespaces currently on the node.
    pub fn units_on(&self, id: &str) -> Vec<String> {
        self.with_node(id, |n| n.units.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn total_units(&self) -> usize {
        self.lock().nodes.iter().map(|n| n.units.len()).sum()
    }

    pub fn free_capacity(&self, id: &str) -> Option<u64> {
        self.with_node(id, |n| n.free)
    }

    pub fn create_attempts(&self, id: &str) -> u32 {
        self.with_node(id, |n| n.create_attempts).unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, ClusterInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_node<R>(&self, id: &str, f: impl FnOnce(&mut SimNode) -> R) -> Option<R> {
        let mut inner = self.lock();
        inner.nodes.iter_mut().find(|n| n.id == id).map(f)
    }
}

impl NodeDirectory for MemoryCluster {
    fn list_candidates<'a>(&'a self, filter: &'a NodeFilter) -> RemoteFuture<'a, Vec<CandidateNode>> {
        Box::pin(async move {
            let inner = self.lock();
            let nodes = inner
                .nodes
                .iter()
                .filter(|n| n.farm == filter.farm && n.disk_type == filter.disk_type)
                .map(|n| CandidateNode::new(&n.id, n.reported.unwrap_or(n.free), &n.address))
                .filter(|c| c.remaining_capacity >= filter.min_capacity)
                .collect();
            Ok(nodes)
        })
    }
}

impl NodeConnector for MemoryCluster {
    fn connect(&self, node_id: &str, _address: &str) -> Arc<dyn RemoteResource> {
        Arc::new(MemoryNode {
            cluster: self.clone(),
            node_id: node_id.to_string(),
        })
    }
}

/// Endpoint of one simulated storage node.
struct MemoryNode {
    cluster: MemoryCluster,
    node_id: String,
}

impl MemoryNode {
    fn on_node<R>(&self, f: impl FnOnce(&mut SimNode) -> RemoteResult<R>) -> RemoteResult<R> {
        self.cluster
            .with_node(&self.node_id, f)
            .unwrap_or_else(|| Err(RemoteError::Transport(format!("unknown node {}", self.node_id))))
    }
}

impl RemoteResource for MemoryNode {
    fn create<'a>(&'a self, spec: &'a ResourceSpec) -> RemoteFuture<'a, ResourceHandle> {
        Box::pin(async move {
            let ResourceSpec::Storage(spec) = spec else {
                return Err(RemoteError::Validation(
                    "storage nodes only host storage units".to_string(),
                ));
            };
            self.on_node(|node| {
                node.create_attempts += 1;
                node.ensure_reachable()?;
                if let Some(err) = &node.create_error {
                    return Err(err.clone());
                }
                if node.units.contains_key(&spec.name) {
                    return Ok(node.handle(&spec.name));
                }
                if node.slots == Some(0) {
                    return Err(RemoteError::CapacityExhausted(format!(
                        "node {} has no namespace slots left",
                        node.id
                    )));
                }
                if spec.size > node.free {
                    return Err(RemoteError::CapacityExhausted(format!(
                        "node {} has {} free, {} requested",
                        node.id, node.free, spec.size
                    )));
                }

                node.free -= spec.size;
                if let Some(slots) = node.slots.as_mut() {
                    *slots -= 1;
                }
                node.units.insert(spec.name.clone(), spec.size);
                debug!(node = %node.id, unit = %spec.name, size = spec.size, "namespace created");
                if let Some(err) = &node.post_create_error {
                    return Err(err.clone());
                }
                Ok(node.handle(&spec.name))
            })
        })
    }

    fn delete<'a>(&'a self, handle: &'a ResourceHandle) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            self.on_node(|node| {
                node.ensure_reachable()?;
                let size = node
                    .units
                    .remove(&handle.id)
                    .ok_or_else(|| RemoteError::NotFound(handle.id.clone()))?;
                node.free += size;
                if let Some(slots) = node.slots.as_mut() {
                    *slots += 1;
                }
                Ok(())
            })
        })
    }

    fn health<'a>(&'a self, handle: &'a ResourceHandle) -> RemoteFuture<'a, Health> {
        Box::pin(async move {
            self.on_node(|node| {
                node.ensure_reachable()?;
                if !node.units.contains_key(&handle.id) {
                    return Err(RemoteError::NotFound(handle.id.clone()));
                }
                Ok(if node.unhealthy {
                    Health::Unhealthy
                } else {
                    Health::Healthy
                })
            })
        })
    }

    fn info<'a>(&'a self, handle: &'a ResourceHandle) -> RemoteFuture<'a, ResourceInfo> {
        Box::pin(async move {
            self.on_node(|node| {
                node.ensure_reachable()?;
                let size = *node
                    .units
                    .get(&handle.id)
                    .ok_or_else(|| RemoteError::NotFound(handle.id.clone()))?;
                Ok(ResourceInfo {
                    handle: node.handle(&handle.id),
                    size: Some(size),
                    used: Some(0),
                    details: json!({ "node": node.id, "disk_type": node.disk_type }),
                })
            })
        })
    }
}

// ── Compute ───────────────────────────────────────────────────────

#[derive(Debug)]
struct ComputeInner {
    healthy: bool,
    provision_error: Option<RemoteError>,
    instances: BTreeMap<String, ResourceHandle>,
    provisions: Vec<ComputeUnitSpec>,
    deprovisions: u32,
    next_host: u32,
}

/// Simulated compute provisioner.
#[derive(Debug, Clone)]
pub struct MemoryCompute {
    inner: Arc<Mutex<ComputeInner>>,
}

impl Default for MemoryCompute {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ComputeInner {
                healthy: true,
                provision_error: None,
                instances: BTreeMap::new(),
                provisions: Vec::new(),
                deprovisions: 0,
                next_host: 100,
            })),
        }
    }
}

impl MemoryCompute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.lock().healthy = healthy;
    }

    /// Fail every subsequent provision with `error`.
    pub fn set_provision_error(&self, error: Option<RemoteError>) {
        self.lock().provision_error = error;
    }

    /// Every spec that was successfully provisioned, oldest first.
    pub fn provisions(&self) -> Vec<ComputeUnitSpec> {
        self.lock().provisions.clone()
    }

    pub fn running(&self) -> usize {
        self.lock().instances.len()
    }

    pub fn deprovisions(&self) -> u32 {
        self.lock().deprovisions
    }

    fn lock(&self) -> MutexGuard<'_, ComputeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RemoteResource for MemoryCompute {
    fn create<'a>(&'a self, spec: &'a ResourceSpec) -> RemoteFuture<'a, ResourceHandle> {
        Box::pin(async move {
            let ResourceSpec::Compute(spec) = spec else {
                return Err(RemoteError::Validation(
                    "compute provisioner only hosts compute units".to_string(),
                ));
            };
            let mut inner = self.lock();
            if let Some(err) = &inner.provision_error {
                return Err(err.clone());
            }
            let host = inner.next_host;
            inner.next_host += 1;
            let handle = ResourceHandle::compute(&spec.name, format!("http://10.0.0.{host}:9000"));
            inner.instances.insert(spec.name.clone(), handle.clone());
            inner.provisions.push(spec.clone());
            Ok(handle)
        })
    }

    fn delete<'a>(&'a self, handle: &'a ResourceHandle) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            let mut inner = self.lock();
            inner
                .instances
                .remove(&handle.id)
                .ok_or_else(|| RemoteError::NotFound(handle.id.clone()))?;
            inner.deprovisions += 1;
            Ok(())
        })
    }

    fn health<'a>(&'a self, handle: &'a ResourceHandle) -> RemoteFuture<'a, Health> {
        Box::pin(async move {
            let inner = self.lock();
            if !inner.instances.contains_key(&handle.id) {
                return Err(RemoteError::NotFound(handle.id.clone()));
            }
            Ok(if inner.healthy {
                Health::Healthy
            } else {
                Health::Unhealthy
            })
        })
    }

    fn info<'a>(&'a self, handle: &'a ResourceHandle) -> RemoteFuture<'a, ResourceInfo> {
        Box::pin(async move {
            let inner = self.lock();
            let live = inner
                .instances
                .get(&handle.id)
                .ok_or_else(|| RemoteError::NotFound(handle.id.clone()))?;
            Ok(ResourceInfo {
                handle: live.clone(),
                size: None,
                used: None,
                details: json!({ "healthy": inner.healthy }),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardgrid_core::NamespaceMode;

    use crate::resource::StorageUnitSpec;

    fn storage(name: &str, size: u64) -> ResourceSpec {
        ResourceSpec::Storage(StorageUnitSpec {
            name: name.to_string(),
            size,
            disk_type: DiskType::Ssd,
            mode: NamespaceMode::Direct,
            password: Some("pw".to_string()),
            public: false,
        })
    }

    fn cluster() -> MemoryCluster {
        let cluster = MemoryCluster::new();
        cluster.add_node("n1", "farm", DiskType::Ssd, 100);
        cluster.add_node("n2", "farm", DiskType::Hdd, 100);
        cluster.add_node("n3", "other", DiskType::Ssd, 100);
        cluster
    }

    #[tokio::test]
    async fn directory_filters_by_farm_and_disk() {
        let cluster = cluster();
        let nodes = cluster
            .list_candidates(&NodeFilter::new("farm", DiskType::Ssd))
            .await
            .unwrap();

        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "n1");
        assert_eq!(nodes[0].address, MemoryCluster::address_of("n1"));
    }

    #[tokio::test]
    async fn directory_reports_stale_capacity() {
        let cluster = cluster();
        cluster.set_reported_capacity("n1", 5000);
        let nodes = cluster
            .list_candidates(&NodeFilter::new("farm", DiskType::Ssd).with_min_capacity(1000))
            .await
            .unwrap();

        assert_eq!(nodes[0].remaining_capacity, 5000);
        assert_eq!(cluster.free_capacity("n1"), Some(100));
    }

    #[tokio::test]
    async fn create_and_delete_track_capacity() {
        let cluster = cluster();
        let node = cluster.connect("n1", &MemoryCluster::address_of("n1"));

        let handle = node.create(&storage("s3_0", 40)).await.unwrap();
        assert_eq!(cluster.free_capacity("n1"), Some(60));
        assert_eq!(node.health(&handle).await.unwrap(), Health::Healthy);

        node.delete(&handle).await.unwrap();
        assert_eq!(cluster.free_capacity("n1"), Some(100));
        assert!(node.delete(&handle).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn create_is_idempotent_by_name() {
        let cluster = cluster();
        let node = cluster.connect("n1", "");

        let first = node.create(&storage("s3_0", 40)).await.unwrap();
        let second = node.create(&storage("s3_0", 40)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(cluster.free_capacity("n1"), Some(60));
    }

    #[tokio::test]
    async fn out_of_slots_is_capacity_class() {
        let cluster = cluster();
        cluster.set_namespace_slots("n1", 0);
        let node = cluster.connect("n1", "");

        let err = node.create(&storage("s3_0", 1)).await.unwrap_err();
        assert!(err.is_capacity());
    }

    #[tokio::test]
    async fn unreachable_node_is_transport_error() {
        let cluster = cluster();
        let node = cluster.connect("n1", "");
        let handle = node.create(&storage("s3_0", 1)).await.unwrap();

        cluster.set_reachable("n1", false);
        assert!(matches!(
            node.health(&handle).await,
            Err(RemoteError::Transport(_))
        ));
        assert!(matches!(
            node.create(&storage("s3_1", 1)).await,
            Err(RemoteError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn post_create_error_leaves_unit_behind() {
        let cluster = cluster();
        cluster.set_post_create_error("n1", Some(RemoteError::Transport("reset".into())));
        let node = cluster.connect("n1", "");

        assert!(matches!(
            node.create(&storage("s3_0", 10)).await,
            Err(RemoteError::Transport(_))
        ));
        assert_eq!(cluster.units_on("n1"), vec!["s3_0".to_string()]);
        assert_eq!(cluster.free_capacity("n1"), Some(90));
    }

    #[tokio::test]
    async fn storage_node_rejects_compute_spec() {
        let cluster = cluster();
        let node = cluster.connect("n1", "");
        let spec = ResourceSpec::Compute(ComputeUnitSpec {
            name: "vm".to_string(),
            storage_endpoints: vec![],
            data_shards: 1,
            parity_shards: 1,
            namespace_password: None,
            login: "admin".to_string(),
            password: None,
        });

        assert!(matches!(
            node.create(&spec).await,
            Err(RemoteError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn compute_lifecycle() {
        let compute = MemoryCompute::new();
        let spec = ResourceSpec::Compute(ComputeUnitSpec {
            name: "s3_compute".to_string(),
            storage_endpoints: vec!["zdb://n1:9900/s3_0".to_string()],
            data_shards: 1,
            parity_shards: 1,
            namespace_password: None,
            login: "admin".to_string(),
            password: None,
        });

        let handle = compute.create(&spec).await.unwrap();
        assert_eq!(compute.health(&handle).await.unwrap(), Health::Healthy);

        compute.set_healthy(false);
        assert_eq!(compute.health(&handle).await.unwrap(), Health::Unhealthy);

        compute.delete(&handle).await.unwrap();
        assert_eq!(compute.running(), 0);
        assert_eq!(compute.deprovisions(), 1);
        assert!(compute.health(&handle).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn bounded_times_out_slow_calls() {
        let slow: RemoteFuture<'_, ()> = Box::pin(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(())
        });
        let err = crate::bounded(std::time::Duration::from_millis(10), slow)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Timeout(_)));
    }
}
