//! shardgrid-state: persisted deployment records.
//!
//! Backed by [redb](https://docs.rs/redb). Each managed deployment owns one
//! `DeploymentState` record, JSON-serialized into a `&[u8]` value column and
//! keyed by deployment id. The lifecycle controller reads the record before
//! every operation and writes it after every state transition.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared by the controllers of many deployments.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::StateStore;
