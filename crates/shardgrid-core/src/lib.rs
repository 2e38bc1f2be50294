//! shardgrid-core: data model and configuration shared by every ShardGrid crate.
//!
//! Holds the value types that flow between the planner, the allocator and the
//! lifecycle controller (`CandidateNode`, `NamespacePlan`, `Allocation`,
//! `DeploymentState`) and the TOML deployment configuration.

pub mod config;
pub mod error;
pub mod types;

pub use config::{DEFAULT_MAX_UNIT_SIZE, DeploymentConfig, parse_duration};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
