//! Status values reported by `list()`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobKey;
use crate::trigger::Trigger;

/// Reported status of a job.
///
/// Exactly one value per job per snapshot; the values are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Armed, next fire in the future (or due and waiting for a worker).
    Scheduled,
    /// Paused; the dispatch loop skips it.
    Paused,
    /// A run is in flight.
    Executing,
    /// Trigger exhausted; reported once, then evicted.
    Completed,
    /// Last run failed; still armed unless exhausted.
    Error,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Scheduled => "SCHEDULED",
            JobStatus::Paused => "PAUSED",
            JobStatus::Executing => "EXECUTING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SCHEDULED" => Ok(JobStatus::Scheduled),
            "PAUSED" => Ok(JobStatus::Paused),
            "EXECUTING" => Ok(JobStatus::Executing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "ERROR" => Ok(JobStatus::Error),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Point-in-time view of one job, as returned by `list()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub key: JobKey,
    /// Registered logic name.
    pub job_ref: String,
    pub status: JobStatus,
    pub trigger: Trigger,
    /// Trigger start time, or the registration time for cron triggers.
    pub start_at: DateTime<Utc>,
    pub previous_fire_at: Option<DateTime<Utc>>,
    pub next_fire_at: Option<DateTime<Utc>>,
    pub times_fired: u32,
    /// Error recorded by the most recent failed run.
    pub last_error: Option<String>,
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_round_trip() {
        for status in [
            JobStatus::Scheduled,
            JobStatus::Paused,
            JobStatus::Executing,
            JobStatus::Completed,
            JobStatus::Error,
        ] {
            let parsed: JobStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_upper_case() {
        let json = serde_json::to_string(&JobStatus::Executing).unwrap();
        assert_eq!(json, "\"EXECUTING\"");
    }
}
