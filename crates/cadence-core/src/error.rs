//! Error types for the scheduling engine.

use thiserror::Error;

use crate::job::JobKey;

/// Errors returned synchronously by engine and store operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A job with the same key is already scheduled.
    #[error("Job already exists: {0}")]
    DuplicateKey(JobKey),

    /// No job with the given key is known.
    #[error("Job not found: {0}")]
    NotFound(JobKey),

    /// Malformed trigger (bad cron expression, non-positive interval, ...).
    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    /// Malformed job key.
    #[error("Invalid job key: {0}")]
    InvalidKey(String),

    /// The executable reference does not resolve in the job registry.
    #[error("No job logic registered under '{0}'")]
    UnknownJob(String),

    /// The dispatch loop has already been started.
    #[error("Engine is already running")]
    AlreadyRunning,

    /// The engine has been shut down.
    #[error("Engine is shut down")]
    ShutDown,

    /// Internal invariant violation.
    #[error("Engine fault: {0}")]
    EngineFault(String),
}

/// Result type for engine operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors raised by job logic during a run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    /// The job observed an interrupt request and stopped early.
    #[error("Job interrupted")]
    Interrupted,

    /// The job failed. Recorded on the entry, never propagated to callers.
    #[error("Job execution failed: {0}")]
    Execution(String),
}

impl JobError {
    /// Build an execution error from anything displayable.
    pub fn execution(message: impl std::fmt::Display) -> Self {
        JobError::Execution(message.to_string())
    }
}
