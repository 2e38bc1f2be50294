//! Controller registry: one lock per deployment.
//!
//! Controllers of different deployments run concurrently; operations on the
//! same deployment are serialized by its mutex. `reconcile_all` is what an
//! external scheduler calls on every tick.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::{self, JoinSet};
use tracing::{debug, error};

use shardgrid_core::DeploymentId;

use crate::controller::{DeploymentController, ReconcileOutcome};
use crate::error::{LifecycleError, LifecycleResult};

pub type SharedController = Arc<Mutex<DeploymentController>>;

#[derive(Default)]
pub struct ControllerRegistry {
    controllers: BTreeMap<DeploymentId, SharedController>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller, replacing any previous one for the same deployment.
    pub fn register(&mut self, controller: DeploymentController) -> SharedController {
        let id = controller.id().to_string();
        let shared = Arc::new(Mutex::new(controller));
        self.controllers.insert(id, shared.clone());
        shared
    }

    pub fn get(&self, id: &str) -> Option<SharedController> {
        self.controllers.get(id).cloned()
    }

    pub fn remove(&mut self, id: &str) -> Option<SharedController> {
        self.controllers.remove(id)
    }

    pub fn ids(&self) -> Vec<DeploymentId> {
        self.controllers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// Reconcile every registered deployment concurrently.
    ///
    /// A deployment whose lock is held by an in-flight operation is reported
    /// as [`ReconcileOutcome::Busy`] instead of waited for.
    pub async fn reconcile_all(&self) -> BTreeMap<DeploymentId, LifecycleResult<ReconcileOutcome>> {
        let mut results = BTreeMap::new();
        let mut tasks = JoinSet::new();
        let mut spawned: HashMap<task::Id, DeploymentId> = HashMap::new();

        for (id, controller) in &self.controllers {
            match controller.clone().try_lock_owned() {
                Ok(mut guard) => {
                    let handle = tasks.spawn(async move { guard.reconcile().await });
                    spawned.insert(handle.id(), id.clone());
                }
                Err(_) => {
                    debug!(deployment = %id, "deployment busy, skipping reconcile");
                    results.insert(id.clone(), Ok(ReconcileOutcome::Busy));
                }
            }
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (task_id, outcome) = match joined {
                Ok((task_id, outcome)) => (task_id, outcome),
                Err(e) => (e.id(), Err(LifecycleError::TaskFailed(e.to_string()))),
            };
            let Some(id) = spawned.remove(&task_id) else {
                continue;
            };
            if let Err(e) = &outcome {
                error!(deployment = %id, error = %e, "reconcile failed");
            }
            results.insert(id, outcome);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use shardgrid_core::{DeploymentConfig, DiskType, ResourceHandle};
    use shardgrid_remote::{
        Health, MemoryCluster, MemoryCompute, RemoteFuture, RemoteResource, ResourceInfo,
        ResourceSpec,
    };
    use shardgrid_state::StateStore;

    use crate::controller::Collaborators;

    /// Compute whose health probe panics once `panic` is set.
    struct PanickingCompute {
        inner: MemoryCompute,
        panic: Arc<AtomicBool>,
    }

    impl RemoteResource for PanickingCompute {
        fn create<'a>(&'a self, spec: &'a ResourceSpec) -> RemoteFuture<'a, ResourceHandle> {
            self.inner.create(spec)
        }

        fn delete<'a>(&'a self, handle: &'a ResourceHandle) -> RemoteFuture<'a, ()> {
            self.inner.delete(handle)
        }

        fn health<'a>(&'a self, handle: &'a ResourceHandle) -> RemoteFuture<'a, Health> {
            assert!(!self.panic.load(Ordering::SeqCst), "compute probe exploded");
            self.inner.health(handle)
        }

        fn info<'a>(&'a self, handle: &'a ResourceHandle) -> RemoteFuture<'a, ResourceInfo> {
            self.inner.info(handle)
        }
    }

    fn controller(name: &str, cluster: &MemoryCluster, store: &StateStore) -> DeploymentController {
        controller_with(name, cluster, store, Arc::new(MemoryCompute::new()))
    }

    fn controller_with(
        name: &str,
        cluster: &MemoryCluster,
        store: &StateStore,
        compute: Arc<dyn RemoteResource>,
    ) -> DeploymentController {
        let config = DeploymentConfig::from_toml_str(&format!(
            r#"
[deployment]
name = "{name}"
farm = "farm"

[storage]
size = 10
data_shards = 1
parity_shards = 1

[health]
probe_interval = "1ms"
ready_timeout = "200ms"
"#
        ))
        .unwrap();
        let remote = Collaborators {
            directory: Arc::new(cluster.clone()),
            connector: Arc::new(cluster.clone()),
            compute,
        };
        DeploymentController::new(config, store.clone(), remote).unwrap()
    }

    fn fixture() -> (MemoryCluster, StateStore) {
        let cluster = MemoryCluster::new();
        cluster.add_node("n1", "farm", DiskType::Ssd, 1000);
        cluster.add_node("n2", "farm", DiskType::Ssd, 1000);
        (cluster, StateStore::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn register_get_remove() {
        let (cluster, store) = fixture();
        let mut registry = ControllerRegistry::new();
        registry.register(controller("a", &cluster, &store));
        registry.register(controller("b", &cluster, &store));

        assert_eq!(registry.ids(), vec!["a".to_string(), "b".to_string()]);
        assert!(registry.get("a").is_some());
        assert!(registry.remove("a").is_some());
        assert!(registry.get("a").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn reconcile_all_covers_every_deployment() {
        let (cluster, store) = fixture();
        let mut registry = ControllerRegistry::new();
        let a = registry.register(controller("a", &cluster, &store));
        registry.register(controller("b", &cluster, &store));
        a.lock().await.install().await.unwrap();

        let results = registry.reconcile_all().await;

        assert_eq!(results.len(), 2);
        assert_eq!(results["a"].as_ref().unwrap(), &ReconcileOutcome::Healthy);
        assert_eq!(results["b"].as_ref().unwrap(), &ReconcileOutcome::Skipped);
    }

    #[tokio::test]
    async fn locked_deployment_is_reported_busy() {
        let (cluster, store) = fixture();
        let mut registry = ControllerRegistry::new();
        let a = registry.register(controller("a", &cluster, &store));

        let _held = a.lock().await;
        let results = registry.reconcile_all().await;

        assert_eq!(results["a"].as_ref().unwrap(), &ReconcileOutcome::Busy);
    }

    #[tokio::test]
    async fn panicked_reconcile_is_reported_under_its_deployment() {
        let (cluster, store) = fixture();
        let panic = Arc::new(AtomicBool::new(false));
        let compute = PanickingCompute {
            inner: MemoryCompute::new(),
            panic: panic.clone(),
        };
        let mut registry = ControllerRegistry::new();
        let a = registry.register(controller_with("a", &cluster, &store, Arc::new(compute)));
        let b = registry.register(controller("b", &cluster, &store));
        a.lock().await.install().await.unwrap();
        b.lock().await.install().await.unwrap();

        panic.store(true, Ordering::SeqCst);
        let results = registry.reconcile_all().await;

        assert_eq!(results.len(), 2);
        assert!(matches!(results["a"], Err(LifecycleError::TaskFailed(_))));
        assert_eq!(results["b"].as_ref().unwrap(), &ReconcileOutcome::Healthy);
    }
}
