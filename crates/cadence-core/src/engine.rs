//! The scheduling engine: lifecycle façade plus the dispatch loop.
//!
//! The dispatch loop claims due entries from the [`SchedulerStore`] and
//! hands each fire to its own supervisor task. The supervisor runs the
//! listeners and the job, then reports completion back to the store, so the
//! loop itself never waits on job logic.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::job::{JobContext, JobData, JobDescriptor, JobKey, JobRegistry};
use crate::listener::{FireEvent, ListenerSet, LoggingListener, SchedulerListener};
use crate::request::JobRequest;
use crate::runner::{JobRunner, RunOutcome};
use crate::status::JobStatusView;
use crate::store::{Completion, FireClaim, Registered, SchedulerStore};
use crate::trigger::Trigger;

/// Builder for [`SchedulingEngine`].
pub struct EngineBuilder {
    config: EngineConfig,
    registry: Option<Arc<JobRegistry>>,
    clock: Option<Arc<dyn Clock>>,
    listeners: Vec<(String, Arc<dyn SchedulerListener>)>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            registry: None,
            clock: None,
            listeners: Vec::new(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Registry resolving job references. Defaults to an empty registry.
    pub fn registry(mut self, registry: Arc<JobRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn listener(mut self, name: impl Into<String>, listener: Arc<dyn SchedulerListener>) -> Self {
        self.listeners.push((name.into(), listener));
        self
    }

    pub fn build(self) -> SchedulingEngine {
        let listeners = ListenerSet::new();
        if self.config.log_lifecycle_events {
            listeners.add(LoggingListener::NAME, Arc::new(LoggingListener));
        }
        for (name, listener) in self.listeners {
            listeners.add(name, listener);
        }

        let permits = self
            .config
            .concurrency_limit()
            .map(|limit| Arc::new(Semaphore::new(limit)));

        SchedulingEngine {
            inner: Arc::new(EngineInner {
                store: SchedulerStore::new(),
                registry: self.registry.unwrap_or_default(),
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                listeners,
                permits,
                wake: Notify::new(),
                shutdown: CancellationToken::new(),
                tracker: TaskTracker::new(),
                config: self.config,
            }),
            started: AtomicBool::new(false),
            dispatch: Mutex::new(None),
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct EngineInner {
    config: EngineConfig,
    store: SchedulerStore,
    registry: Arc<JobRegistry>,
    clock: Arc<dyn Clock>,
    listeners: ListenerSet,
    /// `None` when concurrency is unlimited.
    permits: Option<Arc<Semaphore>>,
    wake: Notify,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl EngineInner {
    async fn run_dispatch_loop(self: Arc<Self>) {
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            "Dispatch loop started"
        );

        loop {
            let saturated = self.dispatch_due();
            let wait = self.time_until_next(saturated);

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }

        info!("Dispatch loop stopped");
    }

    /// Start every due fire. Returns `true` when the loop stopped because
    /// the concurrency cap was reached.
    fn dispatch_due(self: &Arc<Self>) -> bool {
        loop {
            if self.shutdown.is_cancelled() {
                return false;
            }

            let permit = match &self.permits {
                Some(semaphore) => match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => Some(permit),
                    Err(_) => return true,
                },
                None => None,
            };

            let now = self.clock.now();
            let Some(claim) = self.store.claim_next_due(now, self.config.misfire_threshold()) else {
                return false;
            };

            debug!(
                job = %claim.key,
                run_id = %claim.handle.id(),
                times_fired = claim.times_fired,
                misfired = claim.misfired,
                "Dispatching fire"
            );

            let inner = Arc::clone(self);
            self.tracker.spawn(async move {
                inner.supervise(claim, permit).await;
            });
        }
    }

    fn time_until_next(&self, saturated: bool) -> Duration {
        let poll = self.config.poll_interval();
        if saturated {
            return poll;
        }
        match self.store.next_wakeup() {
            Some(next) => (next - self.clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(poll),
            None => poll,
        }
    }

    /// Drive one fire from listeners to completion.
    async fn supervise(self: Arc<Self>, claim: FireClaim, permit: Option<OwnedSemaphorePermit>) {
        let FireClaim {
            key,
            descriptor,
            job,
            handle,
            start_at,
            scheduled_fire_time,
            fire_time,
            times_fired,
            misfired,
            next_fire_at,
        } = claim;

        let event = FireEvent {
            key: key.clone(),
            job_ref: descriptor.job_ref.clone(),
            run_id: handle.id(),
            start_at,
            scheduled_fire_time,
            fire_time,
            times_fired,
            misfired,
            next_fire_at,
        };

        let run = async {
            self.listeners.trigger_fired(&event).await;
            if misfired {
                self.listeners.trigger_misfired(&event).await;
            }

            if self.listeners.veto_job_execution(&event).await {
                self.listeners.job_execution_vetoed(&event).await;
                return RunOutcome::Vetoed;
            }

            self.listeners.job_to_be_executed(&event).await;
            let ctx = JobContext::new(key.clone(), descriptor.data.clone(), handle.token())
                .with_fire(handle.id(), scheduled_fire_time, fire_time, times_fired, misfired);
            let outcome = JobRunner::start(handle.clone(), job, ctx).wait().await;
            self.listeners.job_was_executed(&event, &outcome).await;
            outcome
        };

        // A panicking listener must not leave the entry stuck in EXECUTING.
        let outcome = match AssertUnwindSafe(run).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(job = %key, run_id = %handle.id(), "Listener panicked during fire");
                RunOutcome::Failed("listener panicked".to_string())
            }
        };
        drop(permit);

        match self
            .store
            .mark_completed(&key, handle.id(), &outcome, self.clock.now())
        {
            Completion::Rearmed(next) => {
                debug!(job = %key, next_fire_at = %next.to_rfc3339(), "Job rearmed");
            }
            Completion::Exhausted => {
                self.listeners.trigger_finalized(&key).await;
            }
            Completion::Discarded => {
                debug!(job = %key, run_id = %handle.id(), "Run result discarded");
            }
        }

        self.wake.notify_one();
    }
}

/// Schedules, fires and tracks jobs.
///
/// Lifecycle operations are synchronous and may be called before
/// [`start`](Self::start); fires only happen while the dispatch loop runs.
/// Must be started from within a tokio runtime.
pub struct SchedulingEngine {
    inner: Arc<EngineInner>,
    started: AtomicBool,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulingEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Engine with the given configuration and registry and the system clock.
    pub fn new(config: EngineConfig, registry: Arc<JobRegistry>) -> Self {
        EngineBuilder::new().config(config).registry(registry).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.inner.registry
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.inner.shutdown.is_cancelled()
    }

    /// Spawn the dispatch loop.
    pub fn start(&self) -> SchedulerResult<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SchedulerError::ShutDown);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let inner = Arc::clone(&self.inner);
        *self.dispatch.lock() = Some(tokio::spawn(inner.run_dispatch_loop()));

        info!(jobs = self.inner.store.len(), "Scheduling engine started");
        Ok(())
    }

    /// Stop the dispatch loop and settle running jobs.
    ///
    /// With `wait_for_jobs_on_shutdown` running jobs are awaited up to the
    /// shutdown timeout and interrupted after it; without it they are
    /// interrupted right away. Calling this twice is harmless.
    pub async fn shutdown(&self) -> SchedulerResult<()> {
        self.inner.shutdown.cancel();

        let dispatch = self.dispatch.lock().take();
        if let Some(handle) = dispatch {
            if let Err(e) = handle.await {
                error!("Dispatch loop ended abnormally: {}", e);
                return Err(SchedulerError::EngineFault(format!("dispatch loop failed: {}", e)));
            }
        }

        self.inner.tracker.close();
        let config = &self.inner.config;

        if !config.wait_for_jobs_on_shutdown {
            let interrupted = self.inner.store.interrupt_all();
            if interrupted > 0 {
                info!(interrupted, "Interrupted running jobs for shutdown");
            }
        } else if !self.inner.tracker.is_empty() {
            info!(
                running = self.inner.tracker.len(),
                timeout_secs = config.shutdown_timeout_secs,
                "Waiting for running jobs to complete"
            );
        }

        if tokio::time::timeout(config.shutdown_timeout(), self.inner.tracker.wait())
            .await
            .is_err()
        {
            let interrupted = self.inner.store.interrupt_all();
            warn!(
                interrupted,
                remaining = self.inner.tracker.len(),
                "Shutdown timeout reached, interrupting jobs"
            );
            // Cooperative jobs stop within one of their own steps.
            let grace = config.poll_interval();
            if tokio::time::timeout(grace, self.inner.tracker.wait())
                .await
                .is_err()
            {
                warn!(remaining = self.inner.tracker.len(), "Jobs still running after shutdown");
            }
        }

        info!("Scheduling engine shut down");
        Ok(())
    }

    fn ensure_open(&self) -> SchedulerResult<()> {
        if self.inner.shutdown.is_cancelled() {
            Err(SchedulerError::ShutDown)
        } else {
            Ok(())
        }
    }

    /// Schedule `job_ref` under `key`.
    ///
    /// Fails with `DuplicateKey` unless `overwrite_existing_jobs` is set.
    /// Returns the first fire time.
    pub fn schedule(
        &self,
        key: JobKey,
        trigger: Trigger,
        job_ref: impl Into<String>,
        data: JobData,
    ) -> SchedulerResult<DateTime<Utc>> {
        let descriptor = JobDescriptor::new(key, job_ref).with_data(data);
        let registered =
            self.schedule_job(descriptor, trigger, self.inner.config.overwrite_existing_jobs)?;
        Ok(registered.next_fire_at)
    }

    /// Schedule a descriptor, replacing an existing job when `replace` is set.
    pub fn schedule_job(
        &self,
        descriptor: JobDescriptor,
        trigger: Trigger,
        replace: bool,
    ) -> SchedulerResult<Registered> {
        self.ensure_open()?;
        let job = self
            .inner
            .registry
            .resolve(&descriptor.job_ref)
            .ok_or_else(|| SchedulerError::UnknownJob(descriptor.job_ref.clone()))?;

        let key = descriptor.key.clone();
        let kind = trigger.kind();
        let registered = self
            .inner
            .store
            .register(descriptor, job, trigger, self.inner.clock.now(), replace)?;

        info!(
            job = %key,
            trigger = kind,
            next_fire_at = %registered.next_fire_at.to_rfc3339(),
            replaced = registered.replaced,
            "Job scheduled"
        );
        self.inner.wake.notify_one();
        Ok(registered)
    }

    /// Schedule from a flat request.
    pub fn submit(&self, request: &JobRequest) -> SchedulerResult<Registered> {
        let trigger = request.trigger(self.inner.clock.now())?;
        self.schedule_job(
            request.descriptor(),
            trigger,
            self.inner.config.overwrite_existing_jobs,
        )
    }

    /// Remove a job, interrupting it if it is executing.
    pub fn delete(&self, key: &JobKey) -> SchedulerResult<()> {
        let interrupted = self.inner.store.remove(key)?.is_some();
        info!(job = %key, interrupted, "Job deleted");
        self.inner.wake.notify_one();
        Ok(())
    }

    pub fn pause(&self, key: &JobKey) -> SchedulerResult<()> {
        self.inner.store.pause(key)?;
        info!(job = %key, "Job paused");
        Ok(())
    }

    pub fn resume(&self, key: &JobKey) -> SchedulerResult<()> {
        self.inner.store.resume(key)?;
        info!(job = %key, "Job resumed");
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Request interruption of the job's current run.
    ///
    /// Returns `false` if the job is not executing. Callers that need
    /// confirmation poll [`get`](Self::get) until it leaves EXECUTING.
    pub fn interrupt(&self, key: &JobKey) -> SchedulerResult<bool> {
        let requested = self.inner.store.interrupt(key)?;
        if requested {
            info!(job = %key, "Interrupt requested");
        }
        Ok(requested)
    }

    /// Status of every job, in scheduling order.
    pub fn list(&self) -> Vec<JobStatusView> {
        self.inner.store.snapshot()
    }

    pub fn get(&self, key: &JobKey) -> SchedulerResult<JobStatusView> {
        self.inner.store.get(key)
    }

    /// Number of fires currently in flight, including deleted jobs still
    /// finishing.
    pub fn running_count(&self) -> usize {
        self.inner.store.active_runs().len()
    }

    pub fn add_listener(&self, name: impl Into<String>, listener: Arc<dyn SchedulerListener>) {
        self.inner.listeners.add(name, listener);
    }

    pub fn remove_listener(&self, name: &str) -> bool {
        self.inner.listeners.remove(name)
    }

    pub fn listener_names(&self) -> Vec<String> {
        self.inner.listeners.names()
    }
}

impl Drop for SchedulingEngine {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
