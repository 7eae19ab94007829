//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Scheduling engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on how long the dispatch loop sleeps between checks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// A fire later than this is a misfire (fire once now, resume cadence
    /// from now).
    #[serde(default = "default_misfire_threshold_ms")]
    pub misfire_threshold_ms: u64,

    /// Maximum concurrently executing jobs (0 = unlimited).
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Wait for running jobs on shutdown instead of interrupting them.
    #[serde(default = "default_true")]
    pub wait_for_jobs_on_shutdown: bool,

    /// How long shutdown waits for running jobs.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// `schedule` replaces an existing job with the same key.
    #[serde(default)]
    pub overwrite_existing_jobs: bool,

    /// Install the logging listener.
    #[serde(default = "default_true")]
    pub log_lifecycle_events: bool,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_misfire_threshold_ms() -> u64 {
    1000
}

fn default_max_concurrent_jobs() -> usize {
    10
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            misfire_threshold_ms: default_misfire_threshold_ms(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            wait_for_jobs_on_shutdown: true,
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            overwrite_existing_jobs: false,
            log_lifecycle_events: true,
        }
    }
}

impl EngineConfig {
    /// Poll interval, never shorter than one millisecond.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn misfire_threshold(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.misfire_threshold_ms).unwrap_or(i64::MAX))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Concurrency cap, `None` when unlimited.
    pub fn concurrency_limit(&self) -> Option<usize> {
        (self.max_concurrent_jobs > 0).then_some(self.max_concurrent_jobs)
    }
}
