//! Job identity, job logic and the registry resolving references to logic.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{JobError, SchedulerError, SchedulerResult};

/// Group used when a caller does not name one.
pub const DEFAULT_GROUP: &str = "DEFAULT";

/// Arbitrary key-value payload handed to job logic.
pub type JobData = serde_json::Map<String, serde_json::Value>;

/// External identity of a scheduled job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub name: String,
    pub group: String,
}

impl JobKey {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }

    /// Key in [`DEFAULT_GROUP`].
    pub fn in_default_group(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_GROUP)
    }

    /// Reject empty names and groups.
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.name.trim().is_empty() {
            return Err(SchedulerError::InvalidKey("job name is empty".to_string()));
        }
        if self.group.trim().is_empty() {
            return Err(SchedulerError::InvalidKey(format!(
                "group of job '{}' is empty",
                self.name
            )));
        }
        Ok(())
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// What to run: identity, reference to registered logic, and payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub key: JobKey,
    /// Name the logic is registered under in the [`JobRegistry`].
    pub job_ref: String,
    #[serde(default)]
    pub data: JobData,
    #[serde(default)]
    pub description: Option<String>,
}

impl JobDescriptor {
    pub fn new(key: JobKey, job_ref: impl Into<String>) -> Self {
        Self {
            key,
            job_ref: job_ref.into(),
            data: JobData::new(),
            description: None,
        }
    }

    /// Replace the payload.
    pub fn with_data(mut self, data: JobData) -> Self {
        self.data = data;
        self
    }

    /// Insert a single payload value.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Execution context handed to job logic for one run.
///
/// Carries the payload, fire details and the interruption signal. Logic
/// that runs for a while must check [`JobContext::is_interrupted`] or wait
/// through [`JobContext::sleep`] at bounded intervals; interruption is
/// cooperative.
#[derive(Debug, Clone)]
pub struct JobContext {
    key: JobKey,
    data: JobData,
    run_id: Uuid,
    scheduled_fire_time: DateTime<Utc>,
    fire_time: DateTime<Utc>,
    times_fired: u32,
    misfired: bool,
    cancel: CancellationToken,
}

impl JobContext {
    /// Context for a run firing now.
    pub fn new(key: JobKey, data: JobData, cancel: CancellationToken) -> Self {
        let now = Utc::now();
        Self {
            key,
            data,
            run_id: Uuid::new_v4(),
            scheduled_fire_time: now,
            fire_time: now,
            times_fired: 1,
            misfired: false,
            cancel,
        }
    }

    pub(crate) fn with_fire(
        mut self,
        run_id: Uuid,
        scheduled_fire_time: DateTime<Utc>,
        fire_time: DateTime<Utc>,
        times_fired: u32,
        misfired: bool,
    ) -> Self {
        self.run_id = run_id;
        self.scheduled_fire_time = scheduled_fire_time;
        self.fire_time = fire_time;
        self.times_fired = times_fired;
        self.misfired = misfired;
        self
    }

    pub fn key(&self) -> &JobKey {
        &self.key
    }

    pub fn data(&self) -> &JobData {
        &self.data
    }

    /// String payload value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Unsigned integer payload value.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.data.get(key).and_then(|v| v.as_u64())
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// When the trigger wanted this run to start.
    pub fn scheduled_fire_time(&self) -> DateTime<Utc> {
        self.scheduled_fire_time
    }

    /// When the run actually started.
    pub fn fire_time(&self) -> DateTime<Utc> {
        self.fire_time
    }

    /// Fires produced by the trigger so far, this one included.
    pub fn times_fired(&self) -> u32 {
        self.times_fired
    }

    pub fn is_misfire(&self) -> bool {
        self.misfired
    }

    /// Whether an interrupt has been requested.
    pub fn is_interrupted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// `Err(Interrupted)` once an interrupt has been requested.
    pub fn check_interrupted(&self) -> Result<(), JobError> {
        if self.is_interrupted() {
            Err(JobError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Resolves when an interrupt is requested.
    pub async fn interrupted(&self) {
        self.cancel.cancelled().await
    }

    /// Cancellable wait. Returns early with `Err(Interrupted)` on interrupt.
    pub async fn sleep(&self, duration: Duration) -> Result<(), JobError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(JobError::Interrupted),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// Executable job logic.
#[async_trait]
pub trait Job: Send + Sync {
    /// Run once. Returning `Err(JobError::Interrupted)` after honouring an
    /// interrupt request is not treated as a failure.
    async fn execute(&self, ctx: JobContext) -> Result<(), JobError>;
}

type JobFn = dyn Fn(JobContext) -> BoxFuture<'static, Result<(), JobError>> + Send + Sync;

/// Job logic backed by a closure.
pub struct FnJob {
    f: Box<JobFn>,
}

impl FnJob {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        Self {
            f: Box::new(move |ctx| f(ctx).boxed()),
        }
    }
}

#[async_trait]
impl Job for FnJob {
    async fn execute(&self, ctx: JobContext) -> Result<(), JobError> {
        (self.f)(ctx).await
    }
}

/// Resolves executable references to job logic.
///
/// Supplied by the hosting application; the engine only resolves names.
#[derive(Default)]
pub struct JobRegistry {
    jobs: DashMap<String, Arc<dyn Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register logic under `name`, replacing any previous registration.
    pub fn register<J: Job + 'static>(&self, name: impl Into<String>, job: J) {
        self.register_arc(name, Arc::new(job));
    }

    pub fn register_arc(&self, name: impl Into<String>, job: Arc<dyn Job>) {
        self.jobs.insert(name.into(), job);
    }

    /// Register a closure as job logic.
    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        self.register(name, FnJob::new(f));
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.jobs.remove(name).is_some()
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Job>> {
        self.jobs.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
