//! Scheduler store: the single owner of all job entry state.
//!
//! Every mutation happens under one mutex and is applied as a single step,
//! so the dispatch loop and the lifecycle operations never observe a torn
//! entry. Due entries are found through a min-heap keyed by
//! `(next_fire_at, insertion order)`. Heap items are invalidated lazily:
//! each carries the generation of the entry it was pushed for, and pause,
//! replace and delete simply make that generation stale.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::{SchedulerError, SchedulerResult};
use crate::job::{Job, JobDescriptor, JobKey};
use crate::runner::{RunOutcome, RunnerHandle};
use crate::status::{JobStatus, JobStatusView};
use crate::trigger::Trigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for its next fire.
    Armed,
    /// A run is in flight.
    Executing,
    /// Trigger exhausted; kept until reported once.
    Completed,
}

struct ActiveRun {
    handle: RunnerHandle,
    /// Run started for a previous registration under the same key.
    inherited: bool,
}

struct JobEntry {
    descriptor: JobDescriptor,
    job: Arc<dyn Job>,
    trigger: Trigger,
    phase: Phase,
    paused: bool,
    seq: u64,
    generation: u64,
    registered_at: DateTime<Utc>,
    previous_fire_at: Option<DateTime<Utc>>,
    next_fire_at: Option<DateTime<Utc>>,
    times_fired: u32,
    run: Option<ActiveRun>,
    last_error: Option<String>,
    /// Completed entry has appeared in a `snapshot`.
    listed: bool,
    /// Completed entry has been returned by `get`.
    fetched: bool,
}

impl JobEntry {
    fn status(&self) -> JobStatus {
        if self.run.is_some() {
            JobStatus::Executing
        } else if self.phase == Phase::Completed {
            JobStatus::Completed
        } else if self.paused {
            JobStatus::Paused
        } else if self.last_error.is_some() {
            JobStatus::Error
        } else {
            JobStatus::Scheduled
        }
    }

    fn view(&self) -> JobStatusView {
        JobStatusView {
            key: self.descriptor.key.clone(),
            job_ref: self.descriptor.job_ref.clone(),
            status: self.status(),
            trigger: self.trigger.clone(),
            start_at: self.trigger.start_at().unwrap_or(self.registered_at),
            previous_fire_at: self.previous_fire_at,
            next_fire_at: self.next_fire_at,
            times_fired: self.times_fired,
            last_error: self.last_error.clone(),
            description: self.descriptor.description.clone(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct QueueItem {
    fire_at: DateTime<Utc>,
    seq: u64,
    generation: u64,
    key: JobKey,
}

#[derive(Default)]
struct StoreState {
    entries: HashMap<JobKey, JobEntry>,
    queue: BinaryHeap<Reverse<QueueItem>>,
    /// Runs whose entry was deleted while they were still executing.
    orphans: HashMap<JobKey, RunnerHandle>,
    next_seq: u64,
    next_generation: u64,
}

impl StoreState {
    /// Push the entry's next fire onto the heap under a fresh generation.
    fn arm(&mut self, key: &JobKey) {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        self.next_generation += 1;
        entry.generation = self.next_generation;
        if entry.phase != Phase::Armed || entry.paused {
            return;
        }
        if let Some(fire_at) = entry.next_fire_at {
            self.queue.push(Reverse(QueueItem {
                fire_at,
                seq: entry.seq,
                generation: entry.generation,
                key: key.clone(),
            }));
        }
    }

    /// Invalidate any queued item for the entry.
    fn disarm(&mut self, key: &JobKey) {
        if let Some(entry) = self.entries.get_mut(key) {
            self.next_generation += 1;
            entry.generation = self.next_generation;
        }
    }

    fn is_live(&self, item: &QueueItem) -> bool {
        self.entries.get(&item.key).is_some_and(|entry| {
            entry.generation == item.generation
                && entry.phase == Phase::Armed
                && !entry.paused
                && entry.next_fire_at == Some(item.fire_at)
        })
    }

    /// Evict completed entries that a status query has already returned.
    fn evict_observed(&mut self) {
        self.entries.retain(|_, entry| {
            !(entry.phase == Phase::Completed && (entry.listed || entry.fetched))
        });
    }

    /// Drop stale items from the top of the heap.
    fn prune_queue(&mut self) {
        while let Some(Reverse(top)) = self.queue.peek() {
            if self.is_live(top) {
                break;
            }
            self.queue.pop();
        }
    }

    /// Transition an armed entry to executing for a fire scheduled at
    /// `scheduled`.
    fn mark_executing(
        &mut self,
        key: &JobKey,
        scheduled: DateTime<Utc>,
        now: DateTime<Utc>,
        misfire_threshold: Duration,
    ) -> Option<FireClaim> {
        let entry = self.entries.get_mut(key)?;

        let misfired = now - scheduled > misfire_threshold;
        // A misfired fire resumes the cadence from now; an on-time fire keeps
        // the trigger's own schedule.
        let recorded_fire = if misfired { now } else { scheduled };

        entry.times_fired = entry.times_fired.saturating_add(1);
        entry.previous_fire_at = Some(recorded_fire);
        entry.next_fire_at = entry
            .trigger
            .next_fire_after(now, Some(recorded_fire), entry.times_fired);
        entry.phase = Phase::Executing;

        let handle = RunnerHandle::new(now);
        entry.run = Some(ActiveRun {
            handle: handle.clone(),
            inherited: false,
        });

        Some(FireClaim {
            key: key.clone(),
            descriptor: entry.descriptor.clone(),
            job: entry.job.clone(),
            handle,
            start_at: entry.trigger.start_at(),
            scheduled_fire_time: scheduled,
            fire_time: now,
            times_fired: entry.times_fired,
            misfired,
            next_fire_at: entry.next_fire_at,
        })
    }
}

/// Result of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registered {
    pub next_fire_at: DateTime<Utc>,
    /// An existing registration under the same key was replaced.
    pub replaced: bool,
}

/// A fire claimed by the dispatch loop. The entry is already EXECUTING.
pub struct FireClaim {
    pub key: JobKey,
    pub descriptor: JobDescriptor,
    pub job: Arc<dyn Job>,
    pub handle: RunnerHandle,
    pub start_at: Option<DateTime<Utc>>,
    pub scheduled_fire_time: DateTime<Utc>,
    pub fire_time: DateTime<Utc>,
    pub times_fired: u32,
    pub misfired: bool,
    /// Projected next fire, recomputed when the run completes.
    pub next_fire_at: Option<DateTime<Utc>>,
}

/// What happened to an entry when its run completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Entry armed again for the given instant (held back while paused).
    Rearmed(DateTime<Utc>),
    /// Trigger exhausted; entry is COMPLETED until the next snapshot.
    Exhausted,
    /// The entry was deleted or replaced; the result was dropped.
    Discarded,
}

/// Registry of job entries keyed by [`JobKey`].
#[derive(Default)]
pub struct SchedulerStore {
    state: Mutex<StoreState>,
}

impl SchedulerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job under its key.
    ///
    /// Fails with `DuplicateKey` if a live entry exists and `replace` is
    /// false. A completed entry never blocks registration. A replacement of
    /// an executing entry, or a registration while a deleted entry's run is
    /// still finishing, waits for that run before its first fire.
    pub fn register(
        &self,
        descriptor: JobDescriptor,
        job: Arc<dyn Job>,
        trigger: Trigger,
        now: DateTime<Utc>,
        replace: bool,
    ) -> SchedulerResult<Registered> {
        descriptor.key.validate()?;
        trigger.validate(now)?;
        let next_fire_at = trigger.next_fire_after(now, None, 0).ok_or_else(|| {
            SchedulerError::InvalidTrigger(format!("trigger for {} never fires", descriptor.key))
        })?;

        let mut state = self.state.lock();
        state.evict_observed();
        let key = descriptor.key.clone();

        let (seq, inherited, replaced) = match state.entries.remove(&key) {
            Some(existing) => {
                if existing.phase != Phase::Completed && !replace {
                    state.entries.insert(key.clone(), existing);
                    return Err(SchedulerError::DuplicateKey(key));
                }
                let live = existing.phase != Phase::Completed;
                (existing.seq, existing.run.map(|r| r.handle), live)
            }
            None => {
                state.next_seq += 1;
                let seq = state.next_seq;
                (seq, state.orphans.remove(&key), false)
            }
        };

        let phase = if inherited.is_some() {
            Phase::Executing
        } else {
            Phase::Armed
        };

        state.entries.insert(
            key.clone(),
            JobEntry {
                descriptor,
                job,
                trigger,
                phase,
                paused: false,
                seq,
                generation: 0,
                registered_at: now,
                previous_fire_at: None,
                next_fire_at: Some(next_fire_at),
                times_fired: 0,
                run: inherited.map(|handle| ActiveRun {
                    handle,
                    inherited: true,
                }),
                last_error: None,
                listed: false,
                fetched: false,
            },
        );
        state.arm(&key);

        debug!(job = %key, next_fire_at = %next_fire_at.to_rfc3339(), replaced, "Job registered");
        Ok(Registered {
            next_fire_at,
            replaced,
        })
    }

    /// Remove an entry. A live run is interrupted and returned.
    pub fn remove(&self, key: &JobKey) -> SchedulerResult<Option<RunnerHandle>> {
        let mut state = self.state.lock();
        let entry = state
            .entries
            .remove(key)
            .ok_or_else(|| SchedulerError::NotFound(key.clone()))?;

        let handle = entry.run.map(|run| run.handle);
        if let Some(ref handle) = handle {
            handle.interrupt();
            state.orphans.insert(key.clone(), handle.clone());
        }
        debug!(job = %key, interrupted = handle.is_some(), "Job removed");
        Ok(handle)
    }

    /// Stop firing an entry. A run already in flight continues.
    pub fn pause(&self, key: &JobKey) -> SchedulerResult<()> {
        let mut state = self.state.lock();
        let entry = state
            .entries
            .get_mut(key)
            .ok_or_else(|| SchedulerError::NotFound(key.clone()))?;
        if entry.paused {
            return Ok(());
        }
        entry.paused = true;
        state.disarm(key);
        Ok(())
    }

    /// Resume a paused entry with its original next fire time.
    pub fn resume(&self, key: &JobKey) -> SchedulerResult<()> {
        let mut state = self.state.lock();
        let entry = state
            .entries
            .get_mut(key)
            .ok_or_else(|| SchedulerError::NotFound(key.clone()))?;
        if !entry.paused {
            return Ok(());
        }
        entry.paused = false;
        state.arm(key);
        Ok(())
    }

    /// Request interruption of the entry's live run.
    ///
    /// Returns `Ok(false)` when nothing is executing or an interrupt was
    /// already requested.
    pub fn interrupt(&self, key: &JobKey) -> SchedulerResult<bool> {
        let state = self.state.lock();
        let entry = state
            .entries
            .get(key)
            .ok_or_else(|| SchedulerError::NotFound(key.clone()))?;
        Ok(entry
            .run
            .as_ref()
            .is_some_and(|run| run.handle.interrupt()))
    }

    /// Claim the earliest due entry, marking it EXECUTING.
    ///
    /// Ties on fire time go to the entry registered first.
    pub fn claim_next_due(
        &self,
        now: DateTime<Utc>,
        misfire_threshold: Duration,
    ) -> Option<FireClaim> {
        let mut state = self.state.lock();
        loop {
            state.prune_queue();
            let fire_at = match state.queue.peek() {
                Some(Reverse(top)) if top.fire_at <= now => top.fire_at,
                _ => return None,
            };
            let Some(Reverse(item)) = state.queue.pop() else {
                return None;
            };
            if let Some(claim) = state.mark_executing(&item.key, fire_at, now, misfire_threshold) {
                return Some(claim);
            }
        }
    }

    /// Record the end of a run and compute the entry's next fire.
    pub fn mark_completed(
        &self,
        key: &JobKey,
        run_id: Uuid,
        outcome: &RunOutcome,
        now: DateTime<Utc>,
    ) -> Completion {
        let mut state = self.state.lock();
        state.evict_observed();

        let owns_run = state
            .entries
            .get(key)
            .and_then(|entry| entry.run.as_ref())
            .is_some_and(|run| run.handle.id() == run_id);
        if !owns_run {
            if state.orphans.get(key).is_some_and(|h| h.id() == run_id) {
                state.orphans.remove(key);
            }
            return Completion::Discarded;
        }

        let Some(entry) = state.entries.get_mut(key) else {
            return Completion::Discarded;
        };
        let inherited = entry.run.take().is_some_and(|run| run.inherited);

        match outcome {
            RunOutcome::Succeeded => entry.last_error = None,
            RunOutcome::Failed(msg) if !inherited => entry.last_error = Some(msg.clone()),
            _ => {}
        }

        if !inherited {
            entry.next_fire_at =
                entry
                    .trigger
                    .next_fire_after(now, entry.previous_fire_at, entry.times_fired);
        }

        match entry.next_fire_at {
            Some(next) => {
                entry.phase = Phase::Armed;
                state.arm(key);
                Completion::Rearmed(next)
            }
            None => {
                entry.phase = Phase::Completed;
                entry.listed = false;
                entry.fetched = false;
                state.disarm(key);
                Completion::Exhausted
            }
        }
    }

    /// Consistent point-in-time view of all entries, in registration order.
    ///
    /// Completed entries already listed by an earlier snapshot are evicted
    /// first; the ones listed now are evicted by the next call.
    pub fn snapshot(&self) -> Vec<JobStatusView> {
        let mut state = self.state.lock();
        state
            .entries
            .retain(|_, entry| !(entry.phase == Phase::Completed && entry.listed));

        let mut entries: Vec<&mut JobEntry> = state.entries.values_mut().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries
            .into_iter()
            .map(|entry| {
                if entry.phase == Phase::Completed {
                    entry.listed = true;
                }
                entry.view()
            })
            .collect()
    }

    /// View of a single entry.
    ///
    /// Returning a completed entry counts as reporting it: the next
    /// registration or run completion evicts it.
    pub fn get(&self, key: &JobKey) -> SchedulerResult<JobStatusView> {
        let mut state = self.state.lock();
        let entry = state
            .entries
            .get_mut(key)
            .ok_or_else(|| SchedulerError::NotFound(key.clone()))?;
        if entry.phase == Phase::Completed {
            entry.fetched = true;
        }
        Ok(entry.view())
    }

    pub fn contains(&self, key: &JobKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Earliest pending fire time of an armed, unpaused entry.
    pub fn next_wakeup(&self) -> Option<DateTime<Utc>> {
        let mut state = self.state.lock();
        state.prune_queue();
        state.queue.peek().map(|Reverse(top)| top.fire_at)
    }

    /// Every live run, including runs of deleted entries.
    pub fn active_runs(&self) -> Vec<(JobKey, RunnerHandle)> {
        let state = self.state.lock();
        state
            .entries
            .iter()
            .filter_map(|(key, entry)| entry.run.as_ref().map(|run| (key.clone(), run.handle.clone())))
            .chain(state.orphans.iter().map(|(k, h)| (k.clone(), h.clone())))
            .collect()
    }

    /// Interrupt every live run. Returns how many requests were sent.
    pub fn interrupt_all(&self) -> usize {
        self.active_runs()
            .into_iter()
            .filter(|(_, handle)| handle.interrupt())
            .count()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
