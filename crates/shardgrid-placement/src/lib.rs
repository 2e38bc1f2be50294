//! shardgrid-placement: turns a capacity request into committed namespaces.
//!
//! This crate decides how many namespaces a deployment needs and where they
//! go. It does NOT track deployments over time (that's
//! `shardgrid-lifecycle`); one call to [`Allocator::allocate`] is one
//! planning pass over a fresh directory snapshot.
//!
//! # Components
//!
//! - **`planner`**: namespace count and size for a redundancy ratio
//! - **`ranking`**: candidate ordering, nodes already in use go last
//! - **`ledger`**: per-pass capacity accounting with rollback
//! - **`allocator`**: round-robin placement through the remote endpoints

pub mod allocator;
pub mod error;
pub mod ledger;
pub mod planner;
pub mod ranking;

pub use allocator::Allocator;
pub use error::{ExhaustionCause, PlacementExhausted, PlanError};
pub use ledger::CapacityLedger;
pub use planner::{ShardPlan, plan};
pub use ranking::rank;
