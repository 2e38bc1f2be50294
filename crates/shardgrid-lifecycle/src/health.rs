//! Consecutive-probe health thresholds.
//!
//! One probe covers a whole deployment: every storage unit plus the compute
//! resource. The counters live in `DeploymentState` so they survive between
//! reconcile passes; the tracker is rebuilt from them on each pass.

use tracing::{debug, warn};

use shardgrid_core::HealthRecord;
use shardgrid_core::config::HealthConfig;

/// Result of probing a deployment once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Healthy,
    /// At least one dependency reported unhealthy or could not be reached.
    Unhealthy,
}

/// What the tracker concludes after a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Healthy,
    /// Failing, but below the unhealthy threshold.
    Suspect,
    Unhealthy,
}

#[derive(Debug, Clone)]
pub struct HealthTracker {
    record: HealthRecord,
    /// Consecutive failures before the deployment is degraded.
    unhealthy_threshold: u32,
    /// Consecutive successes before a fresh install counts as ready.
    healthy_threshold: u32,
}

impl HealthTracker {
    /// Resume tracking from persisted counters.
    pub fn new(record: HealthRecord, config: &HealthConfig) -> Self {
        Self::with_thresholds(record, config.unhealthy_threshold, config.healthy_threshold)
    }

    pub fn with_thresholds(
        record: HealthRecord,
        unhealthy_threshold: u32,
        healthy_threshold: u32,
    ) -> Self {
        Self {
            record,
            unhealthy_threshold: unhealthy_threshold.max(1),
            healthy_threshold: healthy_threshold.max(1),
        }
    }

    pub fn record(&mut self, result: ProbeResult) -> Verdict {
        match result {
            ProbeResult::Healthy => {
                self.record.consecutive_failures = 0;
                self.record.consecutive_successes =
                    self.record.consecutive_successes.saturating_add(1);
                debug!(successes = self.record.consecutive_successes, "probe healthy");
                Verdict::Healthy
            }
            ProbeResult::Unhealthy => {
                self.record.consecutive_successes = 0;
                self.record.consecutive_failures =
                    self.record.consecutive_failures.saturating_add(1);

                if self.record.consecutive_failures >= self.unhealthy_threshold {
                    warn!(
                        failures = self.record.consecutive_failures,
                        threshold = self.unhealthy_threshold,
                        "deployment marked unhealthy"
                    );
                    Verdict::Unhealthy
                } else {
                    Verdict::Suspect
                }
            }
        }
    }

    /// Enough consecutive healthy probes to clear a degradation.
    pub fn is_ready(&self) -> bool {
        self.record.consecutive_successes >= self.healthy_threshold
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.record.consecutive_failures
    }

    /// Counters to persist.
    pub fn snapshot(&self) -> HealthRecord {
        self.record
    }
}
