//! Built-in job logic.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::JobError;
use crate::job::{Job, JobContext, JobRegistry};

/// Interruptible reference job: sleeps in fixed steps and checks for an
/// interrupt between them.
///
/// Job data may override `iterations` and `step_ms`.
#[derive(Debug, Clone)]
pub struct SleepJob {
    iterations: u64,
    step: Duration,
}

impl SleepJob {
    pub const NAME: &'static str = "sleep";

    pub fn new(iterations: u64, step: Duration) -> Self {
        Self { iterations, step }
    }
}

impl Default for SleepJob {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(1))
    }
}

#[async_trait]
impl Job for SleepJob {
    async fn execute(&self, ctx: JobContext) -> Result<(), JobError> {
        let iterations = ctx.get_u64("iterations").unwrap_or(self.iterations);
        let step = ctx
            .get_u64("step_ms")
            .map(Duration::from_millis)
            .unwrap_or(self.step);

        for i in 0..iterations {
            ctx.sleep(step).await?;
            debug!(job = %ctx.key(), step = i + 1, of = iterations, "Sleep step done");
        }
        Ok(())
    }
}

/// Logs its payload and returns.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogJob;

impl LogJob {
    pub const NAME: &'static str = "log";
}

#[async_trait]
impl Job for LogJob {
    async fn execute(&self, ctx: JobContext) -> Result<(), JobError> {
        let message = ctx.get_str("message").unwrap_or("tick");
        let data = serde_json::Value::Object(ctx.data().clone());
        info!(
            job = %ctx.key(),
            times_fired = ctx.times_fired(),
            misfire = ctx.is_misfire(),
            %data,
            "{}",
            message
        );
        Ok(())
    }
}

/// Register the built-in jobs under their default names.
pub fn register_builtin_jobs(registry: &JobRegistry) {
    registry.register(SleepJob::NAME, SleepJob::default());
    registry.register(LogJob::NAME, LogJob);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobData, JobKey};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn ctx_with(data: JobData, token: CancellationToken) -> JobContext {
        JobContext::new(JobKey::new("builtin", "test"), data, token)
    }

    #[tokio::test]
    async fn test_sleep_job_honours_overrides() {
        let mut data = JobData::new();
        data.insert("iterations".to_string(), json!(3));
        data.insert("step_ms".to_string(), json!(5));

        let started = std::time::Instant::now();
        SleepJob::default()
            .execute(ctx_with(data, CancellationToken::new()))
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn test_sleep_job_interrupted() {
        let token = CancellationToken::new();
        token.cancel();
        let result = SleepJob::default()
            .execute(ctx_with(JobData::new(), token))
            .await;
        assert_eq!(result, Err(JobError::Interrupted));
    }

    #[tokio::test]
    async fn test_log_job_and_registration() {
        let registry = JobRegistry::new();
        register_builtin_jobs(&registry);
        assert_eq!(registry.names(), vec![LogJob::NAME, SleepJob::NAME]);

        let job = registry.resolve(LogJob::NAME).unwrap();
        assert!(job
            .execute(ctx_with(JobData::new(), CancellationToken::new()))
            .await
            .is_ok());
    }
}
