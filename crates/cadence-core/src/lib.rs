//! # Cadence Core
//!
//! In-process job scheduling engine.
//!
//! Callers register jobs under a [`JobKey`], each driven by a [`Trigger`]
//! (one-shot, fixed-interval repeating, or cron). A dispatch loop fires due
//! jobs on the tokio runtime, and every job can be paused, resumed,
//! interrupted or deleted while the engine runs.
//!
//! ## Architecture
//!
//! ```text
//!  schedule / delete / pause / resume / interrupt / list
//!                       │
//!              ┌────────▼─────────┐
//!              │ SchedulingEngine │──── ListenerSet (lifecycle callbacks)
//!              └────────┬─────────┘
//!                       │ one lock, atomic per-key steps
//!              ┌────────▼─────────┐
//!              │  SchedulerStore  │  entries + min-heap of next fires
//!              └────────┬─────────┘
//!                       │ claim_next_due / mark_completed
//!              ┌────────▼─────────┐
//!              │  dispatch loop   │── spawns ──▶ JobRunner (one per fire)
//!              └──────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - A key never has two runs at once. A fire that comes due while the
//!   previous run is still going is skipped and the trigger rescheduled
//!   from the run's completion.
//! - Interruption is cooperative: job logic observes it through
//!   [`JobContext`].
//! - A job error or panic is recorded on its entry and never disturbs
//!   other jobs.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use cadence_core::{
//!     EngineConfig, JobData, JobKey, JobRegistry, SchedulingEngine, Trigger,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(JobRegistry::new());
//!     registry.register_fn("hello", |ctx| async move {
//!         println!("hello from {}", ctx.key());
//!         Ok(())
//!     });
//!
//!     let engine = SchedulingEngine::new(EngineConfig::default(), registry);
//!     engine.schedule(
//!         JobKey::in_default_group("greeter"),
//!         Trigger::repeat_forever(chrono::Utc::now(), Duration::from_secs(5)),
//!         "hello",
//!         JobData::new(),
//!     )?;
//!     engine.start()?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     engine.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod builtin;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod listener;
pub mod request;
pub mod runner;
pub mod status;
pub mod store;
pub mod trigger;

pub use builtin::{register_builtin_jobs, LogJob, SleepJob};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{EngineBuilder, SchedulingEngine};
pub use error::{JobError, SchedulerError, SchedulerResult};
pub use job::{FnJob, Job, JobContext, JobData, JobDescriptor, JobKey, JobRegistry, DEFAULT_GROUP};
pub use listener::{FireEvent, ListenerSet, LoggingListener, SchedulerListener};
pub use request::JobRequest;
pub use runner::{JobRunner, RunOutcome, RunnerHandle};
pub use status::{JobStatus, JobStatusView};
pub use store::{Completion, FireClaim, Registered, SchedulerStore};
pub use trigger::{parse_cron, Trigger, REPEAT_INDEFINITELY};
