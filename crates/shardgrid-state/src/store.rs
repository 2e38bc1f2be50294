//! StateStore: redb-backed persistence for deployment records.
//!
//! One `DeploymentState` per deployment, JSON-serialized into a `&[u8]` value
//! column. Writes replace the whole record (write-after-mutate). The store
//! supports both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use shardgrid_core::DeploymentState;

use crate::error::{StateError, StateResult};
use crate::tables::DEPLOYMENTS;

/// Convert any `Display` error into `StateError::Storage`.
macro_rules! storage_err {
    () => {
        |e| StateError::Storage(e.to_string())
    };
}

/// Thread-safe deployment state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(|e| StateError::Open(e.to_string()))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(|e| StateError::Open(e.to_string()))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(storage_err!())?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(DEPLOYMENTS).map_err(storage_err!())?;
        txn.commit().map_err(storage_err!())?;
        Ok(())
    }

    /// Insert or replace a deployment record.
    pub fn put_deployment(&self, state: &DeploymentState) -> StateResult<()> {
        let value = serde_json::to_vec(state).map_err(|e| StateError::Encode {
            id: state.id.clone(),
            reason: e.to_string(),
        })?;
        let txn = self.db.begin_write().map_err(storage_err!())?;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(storage_err!())?;
            table
                .insert(state.id.as_str(), value.as_slice())
                .map_err(storage_err!())?;
        }
        txn.commit().map_err(storage_err!())?;
        debug!(deployment = %state.id, phase = %state.phase, "deployment state stored");
        Ok(())
    }

    /// Get a deployment record by id.
    pub fn get_deployment(&self, id: &str) -> StateResult<Option<DeploymentState>> {
        let txn = self.db.begin_read().map_err(storage_err!())?;
        let table = txn.open_table(DEPLOYMENTS).map_err(storage_err!())?;
        match table.get(id).map_err(storage_err!())? {
            Some(guard) => decode(id, guard.value()).map(Some),
            None => Ok(None),
        }
    }

    /// List every deployment record.
    pub fn list_deployments(&self) -> StateResult<Vec<DeploymentState>> {
        let txn = self.db.begin_read().map_err(storage_err!())?;
        let table = txn.open_table(DEPLOYMENTS).map_err(storage_err!())?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(storage_err!())? {
            let (key, value) = entry.map_err(storage_err!())?;
            results.push(decode(key.value(), value.value())?);
        }
        Ok(results)
    }

    /// Delete a deployment record. Returns true if it existed.
    pub fn delete_deployment(&self, id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(storage_err!())?;
        let existed;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(storage_err!())?;
            existed = table.remove(id).map_err(storage_err!())?.is_some();
        }
        txn.commit().map_err(storage_err!())?;
        debug!(deployment = %id, existed, "deployment state deleted");
        Ok(existed)
    }
}

fn decode(id: &str, bytes: &[u8]) -> StateResult<DeploymentState> {
    serde_json::from_slice(bytes).map_err(|e| StateError::Corrupt {
        id: id.to_string(),
        reason: e.to_string(),
    })
}
