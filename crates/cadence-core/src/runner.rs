//! Cooperatively interruptible execution of one job run.
//!
//! The store creates a [`RunnerHandle`] when it marks an entry executing, so
//! an interrupt or delete that races with the start of a run still reaches
//! it. [`JobRunner::start`] then spawns the logic on the tokio runtime and
//! [`JobRunner::wait`] turns the result, including a panic, into a
//! [`RunOutcome`].

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::error::JobError;
use crate::job::{Job, JobContext};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Logic returned `Ok`.
    Succeeded,
    /// Logic honoured an interrupt request.
    Interrupted,
    /// Logic returned an execution error or panicked.
    Failed(String),
    /// A listener vetoed the run; the logic never started.
    Vetoed,
}

impl RunOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failed(_))
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            RunOutcome::Failed(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Handle to a live (or about to start) run.
#[derive(Debug, Clone)]
pub struct RunnerHandle {
    id: Uuid,
    token: CancellationToken,
    started_at: DateTime<Utc>,
}

impl RunnerHandle {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            token: CancellationToken::new(),
            started_at,
        }
    }

    /// Run id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Token observed by the job logic.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request cooperative cancellation.
    ///
    /// Returns `false` if an interrupt had already been requested.
    pub fn interrupt(&self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_interrupt_requested(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A spawned run of job logic.
pub struct JobRunner {
    handle: RunnerHandle,
    task: JoinHandle<Result<(), JobError>>,
}

impl JobRunner {
    /// Spawn `job` on the runtime.
    ///
    /// `ctx` must have been built from `handle.token()` so the logic sees
    /// interrupts sent through the handle.
    pub fn start(handle: RunnerHandle, job: Arc<dyn Job>, ctx: JobContext) -> Self {
        let span = tracing::info_span!(
            "job_run",
            run_id = %handle.id(),
            job = %ctx.key(),
        );

        debug!(run_id = %handle.id(), job = %ctx.key(), "Starting job run");

        let task = tokio::spawn(async move { job.execute(ctx).await }.instrument(span));

        Self { handle, task }
    }

    pub fn handle(&self) -> &RunnerHandle {
        &self.handle
    }

    /// Request cooperative cancellation of this run.
    pub fn interrupt(&self) -> bool {
        self.handle.interrupt()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to end.
    pub async fn wait(self) -> RunOutcome {
        match self.task.await {
            Ok(Ok(())) => RunOutcome::Succeeded,
            Ok(Err(JobError::Interrupted)) => RunOutcome::Interrupted,
            Ok(Err(JobError::Execution(msg))) => RunOutcome::Failed(msg),
            Err(e) if e.is_panic() => {
                RunOutcome::Failed(format!("job panicked: {}", panic_message(e.into_panic())))
            }
            Err(_) => RunOutcome::Interrupted,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
