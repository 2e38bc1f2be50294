//! shardgrid-remote: contracts for everything ShardGrid talks to.
//!
//! The wire protocol used to reach remote nodes is out of scope; this crate
//! only fixes the shape of the calls:
//!
//! - **`directory`**: `NodeDirectory`, the source of candidate nodes
//! - **`resource`**: `RemoteResource`, one capability interface
//!   (`create`/`delete`/`health`/`info`) for storage units and compute units,
//!   and `NodeConnector`, which hands out the endpoint of a given node
//! - **`memory`**: in-memory backends with failure injection, used by tests
//!
//! Every call returns a boxed `Send` future so implementations can be
//! injected as trait objects. Callers bound each call with [`bounded`].

pub mod directory;
pub mod error;
pub mod memory;
pub mod resource;

use std::time::Duration;

pub use directory::{NodeDirectory, NodeFilter};
pub use error::{RemoteError, RemoteResult};
pub use memory::{MemoryCluster, MemoryCompute};
pub use resource::{
    ComputeUnitSpec, Health, NodeConnector, RemoteFuture, RemoteResource, ResourceInfo,
    ResourceSpec, StorageUnitSpec,
};

/// Await a remote call, failing with [`RemoteError::Timeout`] after `limit`.
pub async fn bounded<T>(limit: Duration, call: RemoteFuture<'_, T>) -> RemoteResult<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout(limit)),
    }
}
