//! Remote resource capability interface.
//!
//! Storage units and compute units are driven through the same four calls.
//! The concrete kind is chosen by the [`ResourceSpec`] variant handed to
//! `create`, not by a type hierarchy: a storage node rejects compute specs and
//! the compute provisioner rejects storage specs.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use shardgrid_core::{DiskType, NamespaceMode, ResourceHandle, ResourceKind};

use crate::error::RemoteResult;

/// Boxed future returned by every remote call.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = RemoteResult<T>> + Send + 'a>>;

/// Parameters of a namespace to create on a storage node.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUnitSpec {
    pub name: String,
    pub size: u64,
    pub disk_type: DiskType,
    pub mode: NamespaceMode,
    pub password: Option<String>,
    pub public: bool,
}

impl fmt::Debug for StorageUnitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageUnitSpec")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("disk_type", &self.disk_type)
            .field("mode", &self.mode)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("public", &self.public)
            .finish()
    }
}

/// Parameters of the compute resource serving the namespaces.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeUnitSpec {
    pub name: String,
    /// Namespace endpoints; the compute resource binds to them by position.
    pub storage_endpoints: Vec<String>,
    pub data_shards: u32,
    pub parity_shards: u32,
    pub namespace_password: Option<String>,
    pub login: String,
    pub password: Option<String>,
}

impl fmt::Debug for ComputeUnitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeUnitSpec")
            .field("name", &self.name)
            .field("storage_endpoints", &self.storage_endpoints)
            .field("data_shards", &self.data_shards)
            .field("parity_shards", &self.parity_shards)
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

/// What to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    Storage(StorageUnitSpec),
    Compute(ComputeUnitSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Storage(_) => ResourceKind::StorageUnit,
            ResourceSpec::Compute(_) => ResourceKind::ComputeUnit,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ResourceSpec::Storage(s) => &s.name,
            ResourceSpec::Compute(c) => &c.name,
        }
    }
}

/// Result of a health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    Unhealthy,
}

/// Descriptive information about a live resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub handle: ResourceHandle,
    pub size: Option<u64>,
    pub used: Option<u64>,
    /// Backend-specific fields.
    pub details: serde_json::Value,
}

/// A kind of remote resource ShardGrid can manage.
pub trait RemoteResource: Send + Sync {
    /// Create the resource, or return the existing one with the same name.
    fn create<'a>(&'a self, spec: &'a ResourceSpec) -> RemoteFuture<'a, ResourceHandle>;

    /// Destroy the resource. Fails with `NotFound` if it is already gone.
    fn delete<'a>(&'a self, handle: &'a ResourceHandle) -> RemoteFuture<'a, ()>;

    fn health<'a>(&'a self, handle: &'a ResourceHandle) -> RemoteFuture<'a, Health>;

    fn info<'a>(&'a self, handle: &'a ResourceHandle) -> RemoteFuture<'a, ResourceInfo>;
}

/// Hands out the remote execution endpoint of a storage node.
pub trait NodeConnector: Send + Sync {
    fn connect(&self, node_id: &str, address: &str) -> Arc<dyn RemoteResource>;
}
