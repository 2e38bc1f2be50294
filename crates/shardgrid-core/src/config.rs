//! Deployment configuration parser.
//!
//! A deployment is described by a TOML document with `[deployment]` and
//! `[storage]` sections; `[compute]`, `[health]` and `[timeouts]` are optional.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{DiskType, NamespaceMode};

/// Largest namespace the planner creates unless configured otherwise (GB).
pub const DEFAULT_MAX_UNIT_SIZE: u64 = 4000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub deployment: DeploymentSection,
    pub storage: StorageConfig,
    #[serde(default)]
    pub compute: ComputeConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSection {
    pub name: String,
    /// Directory organisation whose nodes may host namespaces.
    pub farm: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Total usable capacity in GB.
    pub size: u64,
    pub data_shards: u32,
    pub parity_shards: u32,
    #[serde(default)]
    pub disk_type: DiskType,
    #[serde(default = "default_max_unit_size")]
    pub max_unit_size: u64,
    #[serde(default)]
    pub mode: NamespaceMode,
    #[serde(default = "default_true")]
    pub password_required: bool,
    /// Generated on first install when absent.
    #[serde(default)]
    pub namespace_password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    pub login: String,
    pub password: Option<String>,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            login: "admin".to_string(),
            password: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Consecutive failed probes before the deployment is degraded.
    pub unhealthy_threshold: u32,
    /// Consecutive healthy probes before an install is declared ready.
    pub healthy_threshold: u32,
    pub probe_interval: String,
    pub ready_timeout: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            unhealthy_threshold: 1,
            healthy_threshold: 2,
            probe_interval: "2s".to_string(),
            ready_timeout: "10m".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound for every call to a remote collaborator.
    pub remote_call: String,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            remote_call: "30s".to_string(),
        }
    }
}

fn default_max_unit_size() -> u64 {
    DEFAULT_MAX_UNIT_SIZE
}

fn default_true() -> bool {
    true
}

impl DeploymentConfig {
    /// Read, parse and validate a configuration file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a configuration document.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: DeploymentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configurations that can never be planned or placed.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.deployment.name.trim().is_empty() {
            return Err(ConfigError::Invalid("deployment.name must not be empty".into()));
        }
        if self.deployment.farm.trim().is_empty() {
            return Err(ConfigError::Invalid("deployment.farm must not be empty".into()));
        }

        let (data, parity) = (self.storage.data_shards, self.storage.parity_shards);
        if data == 0 || parity == 0 || parity > data {
            return Err(ConfigError::InvalidRedundancy { data, parity });
        }

        if self.storage.size == 0 {
            return Err(ConfigError::Invalid("storage.size must be positive".into()));
        }
        if self.storage.max_unit_size == 0 {
            return Err(ConfigError::Invalid(
                "storage.max_unit_size must be positive".into(),
            ));
        }
        if self.health.unhealthy_threshold == 0 || self.health.healthy_threshold == 0 {
            return Err(ConfigError::Invalid("health thresholds must be at least 1".into()));
        }

        self.remote_call_timeout()?;
        self.probe_interval()?;
        self.ready_timeout()?;
        Ok(())
    }

    pub fn remote_call_timeout(&self) -> ConfigResult<Duration> {
        duration_field("timeouts.remote_call", &self.timeouts.remote_call)
    }

    pub fn probe_interval(&self) -> ConfigResult<Duration> {
        duration_field("health.probe_interval", &self.health.probe_interval)
    }

    pub fn ready_timeout(&self) -> ConfigResult<Duration> {
        duration_field("health.ready_timeout", &self.health.ready_timeout)
    }
}

fn duration_field(field: &str, value: &str) -> ConfigResult<Duration> {
    parse_duration(value)
        .ok_or_else(|| ConfigError::Invalid(format!("{field}: invalid duration '{value}'")))
}

/// Parse `"500ms"`, `"2s"`, `"10m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        return ms.trim().parse::<u64>().ok().map(Duration::from_millis);
    }
    if let Some(secs) = s.strip_suffix('s') {
        return secs.trim().parse::<u64>().ok().map(Duration::from_secs);
    }
    if let Some(mins) = s.strip_suffix('m') {
        return mins
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs);
    }
    if let Some(hours) = s.strip_suffix('h') {
        return hours
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs);
    }
    None
}
