//! shardgrid-lifecycle: keeps erasure-coded deployments alive.
//!
//! A deployment is a set of storage namespaces spread over remote nodes plus
//! one compute resource bound to them by position. This crate drives it
//! through `uninstalled → installing → installed → uninstalling`, repairing
//! it when reconciliation finds a failed dependency.
//!
//! # Components
//!
//! - **`controller`**: per-deployment state machine (install, reconcile, uninstall)
//! - **`health`**: consecutive-probe thresholds
//! - **`registry`**: per-deployment locking and fan-out reconciliation
//!
//! Nothing here owns a timer: an external scheduler calls `reconcile`.

pub mod controller;
pub mod error;
pub mod health;
pub mod registry;

pub use controller::{
    Collaborators, DeploymentController, ReconcileOutcome, TeardownFailure, UninstallReport,
};
pub use error::{LifecycleError, LifecycleResult};
pub use health::{HealthTracker, ProbeResult, Verdict};
pub use registry::{ControllerRegistry, SharedController};
