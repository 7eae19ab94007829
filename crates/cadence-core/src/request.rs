//! Flat job request, as accepted from configuration files and adapters.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::builtin::SleepJob;
use crate::error::{SchedulerError, SchedulerResult};
use crate::job::{JobData, JobDescriptor, JobKey, DEFAULT_GROUP};
use crate::trigger::{Trigger, REPEAT_INDEFINITELY};

/// Request to schedule one job.
///
/// A non-empty `cron_expression` wins over the interval fields. Otherwise a
/// zero `repeat_interval_secs` means a one-shot at `start_at` (now when
/// absent), and anything else a repeating trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub name: String,

    #[serde(default = "default_group")]
    pub group: String,

    /// Registered logic to run.
    #[serde(default = "default_job_ref", rename = "job")]
    pub job_ref: String,

    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub repeat_interval_secs: u64,

    /// Repeats after the first fire; absent means forever.
    #[serde(default)]
    pub repeat_count: Option<i32>,

    #[serde(default)]
    pub cron_expression: Option<String>,

    #[serde(default)]
    pub data: JobData,

    #[serde(default)]
    pub description: Option<String>,
}

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

fn default_job_ref() -> String {
    SleepJob::NAME.to_string()
}

impl JobRequest {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            job_ref: default_job_ref(),
            start_at: None,
            repeat_interval_secs: 0,
            repeat_count: None,
            cron_expression: None,
            data: JobData::new(),
            description: None,
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(self.name.clone(), self.group.clone())
    }

    fn cron(&self) -> Option<&str> {
        self.cron_expression
            .as_deref()
            .map(str::trim)
            .filter(|expr| !expr.is_empty())
    }

    /// Build the trigger this request describes.
    pub fn trigger(&self, now: DateTime<Utc>) -> SchedulerResult<Trigger> {
        if let Some(expression) = self.cron() {
            return Ok(Trigger::cron(expression));
        }

        let start_at = self.start_at.unwrap_or(now);
        if self.repeat_interval_secs == 0 {
            if self.repeat_count.is_some_and(|count| count != 0) {
                return Err(SchedulerError::InvalidTrigger(format!(
                    "job '{}' sets repeat_count without repeat_interval_secs",
                    self.key()
                )));
            }
            return Ok(Trigger::once(start_at));
        }

        Ok(Trigger::repeating(
            start_at,
            Duration::from_secs(self.repeat_interval_secs),
            self.repeat_count.unwrap_or(REPEAT_INDEFINITELY),
        ))
    }

    pub fn descriptor(&self) -> JobDescriptor {
        let descriptor = JobDescriptor::new(self.key(), self.job_ref.clone()).with_data(self.data.clone());
        match &self.description {
            Some(description) => descriptor.with_description(description.clone()),
            None => descriptor,
        }
    }
}
