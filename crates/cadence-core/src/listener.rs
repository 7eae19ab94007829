//! Lifecycle listeners.
//!
//! Listeners are notified at each step of a fire, in this order:
//!
//! 1. `trigger_fired` (and `trigger_misfired` when the fire was late)
//! 2. `veto_job_execution`; if any listener vetoes, `job_execution_vetoed`
//!    follows and the logic never starts
//! 3. `job_to_be_executed`
//! 4. `job_was_executed`
//! 5. `trigger_finalized`, only when the trigger produced its last fire
//!
//! All callbacks run on the fire's supervisor task, never on the dispatch
//! loop, so a slow listener delays only its own job.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::job::JobKey;
use crate::runner::RunOutcome;

/// Details of one fire, shared by every callback of that fire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FireEvent {
    pub key: JobKey,
    pub job_ref: String,
    pub run_id: Uuid,
    /// Trigger start time, when the trigger has one.
    pub start_at: Option<DateTime<Utc>>,
    pub scheduled_fire_time: DateTime<Utc>,
    pub fire_time: DateTime<Utc>,
    pub times_fired: u32,
    pub misfired: bool,
    /// Projected next fire at the time this fire was claimed.
    pub next_fire_at: Option<DateTime<Utc>>,
}

/// Receives job and trigger lifecycle callbacks. Every method is optional.
#[async_trait]
pub trait SchedulerListener: Send + Sync {
    async fn trigger_fired(&self, _event: &FireEvent) {}

    async fn trigger_misfired(&self, _event: &FireEvent) {}

    /// Return `true` to stop this run before the logic starts.
    async fn veto_job_execution(&self, _event: &FireEvent) -> bool {
        false
    }

    async fn job_execution_vetoed(&self, _event: &FireEvent) {}

    async fn job_to_be_executed(&self, _event: &FireEvent) {}

    async fn job_was_executed(&self, _event: &FireEvent, _outcome: &RunOutcome) {}

    /// The trigger will never fire again.
    async fn trigger_finalized(&self, _key: &JobKey) {}
}

/// Named listeners, notified in registration order.
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<(String, Arc<dyn SchedulerListener>)>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener. A listener with the same name is replaced in place.
    pub fn add(&self, name: impl Into<String>, listener: Arc<dyn SchedulerListener>) {
        let name = name.into();
        let mut listeners = self.listeners.write();
        match listeners.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = listener,
            None => listeners.push((name, listener)),
        }
    }

    pub fn remove(&self, name: &str) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(n, _)| n != name);
        listeners.len() != before
    }

    pub fn names(&self) -> Vec<String> {
        self.listeners.read().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    // Callbacks await, so never hold the lock across them.
    fn current(&self) -> Vec<Arc<dyn SchedulerListener>> {
        self.listeners.read().iter().map(|(_, l)| l.clone()).collect()
    }

    pub async fn trigger_fired(&self, event: &FireEvent) {
        for listener in self.current() {
            listener.trigger_fired(event).await;
        }
    }

    pub async fn trigger_misfired(&self, event: &FireEvent) {
        for listener in self.current() {
            listener.trigger_misfired(event).await;
        }
    }

    /// `true` if any listener vetoes. Every listener is asked.
    pub async fn veto_job_execution(&self, event: &FireEvent) -> bool {
        let mut vetoed = false;
        for listener in self.current() {
            vetoed |= listener.veto_job_execution(event).await;
        }
        vetoed
    }

    pub async fn job_execution_vetoed(&self, event: &FireEvent) {
        for listener in self.current() {
            listener.job_execution_vetoed(event).await;
        }
    }

    pub async fn job_to_be_executed(&self, event: &FireEvent) {
        for listener in self.current() {
            listener.job_to_be_executed(event).await;
        }
    }

    pub async fn job_was_executed(&self, event: &FireEvent, outcome: &RunOutcome) {
        for listener in self.current() {
            listener.job_was_executed(event, outcome).await;
        }
    }

    pub async fn trigger_finalized(&self, key: &JobKey) {
        for listener in self.current() {
            listener.trigger_finalized(key).await;
        }
    }
}

/// Logs every lifecycle step.
///
/// Installed by the engine when `log_lifecycle_events` is enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

impl LoggingListener {
    pub const NAME: &'static str = "logging";
}

#[async_trait]
impl SchedulerListener for LoggingListener {
    async fn trigger_fired(&self, event: &FireEvent) {
        info!(
            job = %event.key,
            run_id = %event.run_id,
            scheduled = %event.scheduled_fire_time.to_rfc3339(),
            times_fired = event.times_fired,
            "Trigger fired"
        );
    }

    async fn trigger_misfired(&self, event: &FireEvent) {
        let lateness = event.fire_time - event.scheduled_fire_time;
        warn!(
            job = %event.key,
            scheduled = %event.scheduled_fire_time.to_rfc3339(),
            late_ms = lateness.num_milliseconds(),
            "Trigger misfired, firing now"
        );
    }

    async fn job_execution_vetoed(&self, event: &FireEvent) {
        info!(job = %event.key, run_id = %event.run_id, "Job execution vetoed");
    }

    async fn job_to_be_executed(&self, event: &FireEvent) {
        info!(job = %event.key, job_ref = %event.job_ref, run_id = %event.run_id, "Job to be executed");
    }

    async fn job_was_executed(&self, event: &FireEvent, outcome: &RunOutcome) {
        let elapsed_ms = (Utc::now() - event.fire_time).num_milliseconds();
        match outcome {
            RunOutcome::Failed(error) => warn!(
                job = %event.key,
                run_id = %event.run_id,
                elapsed_ms,
                %error,
                "Job failed"
            ),
            other => info!(
                job = %event.key,
                run_id = %event.run_id,
                elapsed_ms,
                outcome = ?other,
                "Job was executed"
            ),
        }
    }

    async fn trigger_finalized(&self, key: &JobKey) {
        info!(job = %key, "Trigger finalized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event() -> FireEvent {
        let now = Utc::now();
        FireEvent {
            key: JobKey::new("l", "test"),
            job_ref: "noop".to_string(),
            run_id: Uuid::new_v4(),
            start_at: Some(now),
            scheduled_fire_time: now,
            fire_time: now,
            times_fired: 1,
            misfired: false,
            next_fire_at: None,
        }
    }

    struct Counting {
        fired: AtomicUsize,
        veto: bool,
    }

    #[async_trait]
    impl SchedulerListener for Counting {
        async fn trigger_fired(&self, _event: &FireEvent) {
            self.fired.fetch_add(1, Ordering::SeqCst);
        }

        async fn veto_job_execution(&self, _event: &FireEvent) -> bool {
            self.veto
        }
    }

    fn counting(veto: bool) -> Arc<Counting> {
        Arc::new(Counting {
            fired: AtomicUsize::new(0),
            veto,
        })
    }

    #[tokio::test]
    async fn test_listener_set_dispatch_and_veto() {
        let set = ListenerSet::new();
        let a = counting(false);
        let b = counting(false);
        set.add("a", a.clone());
        set.add("b", b.clone());
        set.add(LoggingListener::NAME, Arc::new(LoggingListener));
        assert_eq!(set.names(), vec!["a", "b", LoggingListener::NAME]);

        set.trigger_fired(&event()).await;
        assert_eq!(a.fired.load(Ordering::SeqCst), 1);
        assert_eq!(b.fired.load(Ordering::SeqCst), 1);
        assert!(!set.veto_job_execution(&event()).await);

        set.add("b", counting(true));
        assert_eq!(set.len(), 3);
        assert!(set.veto_job_execution(&event()).await);

        assert!(set.remove("b"));
        assert!(!set.remove("b"));
        assert!(!set.veto_job_execution(&event()).await);
    }
}
