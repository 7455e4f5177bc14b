//! Concurrency-bounded experiment scheduler.
//!
//! The scheduler runs at most `capacity` experiments at a time; each
//! running experiment contributes one trial-pool task per trial as a
//! single data-parallel batch. Everything beyond capacity queues FIFO.
//! Scheduler bookkeeping is mutated only under the coordination lock,
//! never from trial workers: workers write to their own trial's status
//! slot and report back once per batch.

use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use evorun_core::errors::{ErrorInfo, EvoError};

use crate::experiment::{lock_or_recover, Experiment, Status, TrialRuntime};

/// Identifier assigned to an experiment when it is added to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExpId(u32);

impl ExpId {
    /// Creates an identifier from its raw integer representation.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw integer representation of the identifier.
    pub fn as_raw(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ExpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Change notifications emitted by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// An experiment's aggregate status changed.
    StatusChanged {
        /// The experiment.
        id: ExpId,
        /// Its new status.
        status: Status,
    },
    /// A running experiment's aggregate progress changed.
    ProgressUpdated {
        /// The experiment.
        id: ExpId,
        /// Completed fraction of trial-steps, in `[0, 1]`.
        progress: f64,
    },
    /// An experiment was killed and its state deallocated.
    Killed {
        /// The removed experiment.
        id: ExpId,
    },
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of concurrently running experiments.
    #[serde(default = "default_parallelism")]
    pub capacity: usize,
    /// Worker threads in the trial pool.
    #[serde(default = "default_parallelism")]
    pub threads: usize,
    /// Progress polling interval in milliseconds.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

fn default_parallelism() -> usize {
    thread::available_parallelism().map(usize::from).unwrap_or(1)
}

fn default_progress_interval_ms() -> u64 {
    500
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            capacity: default_parallelism(),
            threads: default_parallelism(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

struct Inner {
    experiments: IndexMap<ExpId, Arc<Experiment>>,
    next_id: u32,
    capacity: usize,
    running: Vec<ExpId>,
    queue: VecDeque<ExpId>,
    pending_kill: Vec<ExpId>,
    ticker_alive: bool,
    events: Sender<SchedulerEvent>,
}

impl Inner {
    fn emit(&self, event: SchedulerEvent) {
        let _ = self.events.send(event);
    }

    fn is_idle(&self) -> bool {
        self.running.is_empty() && self.queue.is_empty()
    }
}

struct Shared {
    pool: rayon::ThreadPool,
    interval: Duration,
    inner: Mutex<Inner>,
    idle_cv: Condvar,
}

/// The experiment scheduler.
///
/// Constructed explicitly and passed by reference to whatever owns the
/// experiment lifecycle; there is no process-wide scheduler state.
/// Operations on untracked experiment ids are warn-logged no-ops.
pub struct ExperimentsMgr {
    shared: Arc<Shared>,
}

impl ExperimentsMgr {
    /// Builds a scheduler and the receiving end of its event channel.
    pub fn new(config: SchedulerConfig) -> Result<(Self, Receiver<SchedulerEvent>), EvoError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads.max(1))
            .build()
            .map_err(|err| {
                EvoError::Scheduler(ErrorInfo::new("mgr.thread_pool", err.to_string()))
            })?;
        let (events, receiver) = channel();
        let shared = Arc::new(Shared {
            pool,
            interval: Duration::from_millis(config.progress_interval_ms),
            inner: Mutex::new(Inner {
                experiments: IndexMap::new(),
                next_id: 0,
                capacity: config.capacity.max(1),
                running: Vec::new(),
                queue: VecDeque::new(),
                pending_kill: Vec::new(),
                ticker_alive: false,
                events,
            }),
            idle_cv: Condvar::new(),
        });
        Ok((Self { shared }, receiver))
    }

    /// Registers an experiment and returns its id.
    pub fn add(&self, experiment: Experiment) -> ExpId {
        let mut inner = lock_or_recover(&self.shared.inner);
        let id = ExpId(inner.next_id);
        inner.next_id += 1;
        inner.experiments.insert(id, Arc::new(experiment));
        id
    }

    /// Looks up a tracked experiment.
    pub fn experiment(&self, id: ExpId) -> Option<Arc<Experiment>> {
        lock_or_recover(&self.shared.inner).experiments.get(&id).cloned()
    }

    /// Maximum number of concurrently running experiments.
    pub fn capacity(&self) -> usize {
        lock_or_recover(&self.shared.inner).capacity
    }

    /// Ids of the currently running experiments.
    pub fn running_ids(&self) -> Vec<ExpId> {
        lock_or_recover(&self.shared.inner).running.clone()
    }

    /// Ids of the queued experiments, front first.
    pub fn queued_ids(&self) -> Vec<ExpId> {
        lock_or_recover(&self.shared.inner).queue.iter().copied().collect()
    }

    /// Starts an experiment, or queues it when capacity is exhausted.
    /// Playing an already queued or running experiment is a no-op.
    pub fn play(&self, id: ExpId) {
        let mut inner = lock_or_recover(&self.shared.inner);
        let Some(exp) = inner.experiments.get(&id).cloned() else {
            warn!(%id, "tried to play an untracked experiment");
            return;
        };
        if inner.running.contains(&id) {
            return;
        }
        match exp.status() {
            Status::Invalid | Status::Running | Status::Finished => return,
            Status::Ready | Status::Queued => {}
        }

        if inner.running.len() < inner.capacity {
            inner.queue.retain(|q| *q != id);
            promote(&self.shared, &mut inner, id, &exp);
        } else if exp.status() != Status::Queued {
            exp.set_status(Status::Queued);
            inner.emit(SchedulerEvent::StatusChanged {
                id,
                status: Status::Queued,
            });
            inner.queue.push_back(id);
        }
    }

    /// Asks a running experiment to pause at the next step boundary.
    pub fn pause(&self, id: ExpId) {
        let inner = lock_or_recover(&self.shared.inner);
        match inner.experiments.get(&id) {
            Some(exp) => exp.pause(),
            None => warn!(%id, "tried to pause an untracked experiment"),
        }
    }

    /// Sets a soft step bound for all trials of an experiment.
    pub fn pause_at(&self, id: ExpId, step: u64) {
        let inner = lock_or_recover(&self.shared.inner);
        match inner.experiments.get(&id) {
            Some(exp) => exp.set_pause_at(step),
            None => warn!(%id, "tried to set a pause step on an untracked experiment"),
        }
    }

    /// Stops an experiment as soon as possible: trials finish at their
    /// current step and the experiment completes.
    pub fn stop(&self, id: ExpId) {
        {
            let inner = lock_or_recover(&self.shared.inner);
            let Some(exp) = inner.experiments.get(&id) else {
                warn!(%id, "tried to stop an untracked experiment");
                return;
            };
            exp.force_stop();
        }
        // flush through the normal play path; a running batch drains on
        // its own
        self.play(id);
    }

    /// Pulls a queued experiment back to `Ready`.
    pub fn remove_from_queue(&self, id: ExpId) {
        let mut inner = lock_or_recover(&self.shared.inner);
        let Some(exp) = inner.experiments.get(&id).cloned() else {
            warn!(%id, "tried to dequeue an untracked experiment");
            return;
        };
        if exp.status() != Status::Queued {
            return;
        }
        inner.queue.retain(|q| *q != id);
        exp.pause();
        exp.set_status(Status::Ready);
        inner.emit(SchedulerEvent::StatusChanged {
            id,
            status: Status::Ready,
        });
    }

    /// Pulls every queued experiment back to `Ready`.
    pub fn clear_queue(&self) {
        let mut inner = lock_or_recover(&self.shared.inner);
        let queued: Vec<ExpId> = inner.queue.drain(..).collect();
        for id in queued {
            if let Some(exp) = inner.experiments.get(&id).cloned() {
                exp.pause();
                exp.set_status(Status::Ready);
                inner.emit(SchedulerEvent::StatusChanged {
                    id,
                    status: Status::Ready,
                });
            }
        }
    }

    /// Adjusts the number of concurrently running experiments.
    ///
    /// Increasing by k promotes up to k queued experiments in FIFO order;
    /// decreasing demotes the oldest running experiments back to the front
    /// of the queue, preserving their in-progress trial state through a
    /// cooperative pause.
    pub fn set_capacity(&self, capacity: usize) -> Result<(), EvoError> {
        if capacity < 1 {
            return Err(EvoError::Scheduler(
                ErrorInfo::new("mgr.bad_capacity", "capacity must be at least 1")
                    .with_context("capacity", capacity.to_string()),
            ));
        }
        let mut inner = lock_or_recover(&self.shared.inner);
        if capacity == inner.capacity {
            return Ok(());
        }
        debug!(old = inner.capacity, new = capacity, "adjusting scheduler capacity");

        if capacity > inner.capacity {
            inner.capacity = capacity;
            drain_queue(&self.shared, &mut inner);
        } else {
            inner.capacity = capacity;
            let excess = inner.running.len().saturating_sub(capacity);
            let demoted: Vec<ExpId> = inner.running.drain(..excess).collect();
            for id in demoted.iter().rev() {
                inner.queue.push_front(*id);
            }
            for id in demoted {
                if let Some(exp) = inner.experiments.get(&id).cloned() {
                    exp.pause();
                    exp.set_status(Status::Queued);
                    inner.emit(SchedulerEvent::StatusChanged {
                        id,
                        status: Status::Queued,
                    });
                }
            }
        }
        Ok(())
    }

    /// Kills an experiment.
    ///
    /// A running experiment is marked for deferred termination, applied
    /// once its current batch naturally completes; anything else is
    /// deallocated and purged immediately.
    pub fn kill(&self, id: ExpId) {
        let mut inner = lock_or_recover(&self.shared.inner);
        if !inner.experiments.contains_key(&id) {
            warn!(%id, "tried to kill an untracked experiment");
            return;
        }
        inner.queue.retain(|q| *q != id);
        if inner.running.contains(&id) {
            if !inner.pending_kill.contains(&id) {
                inner.pending_kill.push(id);
            }
        } else {
            if let Some(exp) = inner.experiments.shift_remove(&id) {
                exp.clear_runtimes();
            }
            inner.emit(SchedulerEvent::Killed { id });
            self.shared.idle_cv.notify_all();
        }
    }

    /// Resets a finished, paused or invalid experiment back to `Ready`
    /// at step 0 so it can run again in full.
    pub fn reset(&self, id: ExpId) {
        let mut inner = lock_or_recover(&self.shared.inner);
        let Some(exp) = inner.experiments.get(&id).cloned() else {
            warn!(%id, "tried to reset an untracked experiment");
            return;
        };
        if matches!(exp.status(), Status::Running | Status::Queued) {
            warn!(%id, "tried to reset a scheduled experiment");
            return;
        }
        exp.reset_trials();
        exp.set_status(Status::Ready);
        inner.emit(SchedulerEvent::StatusChanged {
            id,
            status: Status::Ready,
        });
        inner.emit(SchedulerEvent::ProgressUpdated { id, progress: 0.0 });
    }

    /// Blocks until the running set and the queue are both empty.
    pub fn wait_idle(&self) {
        let mut inner = lock_or_recover(&self.shared.inner);
        while !inner.is_idle() {
            inner = match self.shared.idle_cv.wait(inner) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }
}

/// Moves an experiment into the running set and submits its trial batch.
/// Capacity has already been checked and any stale queue entry removed.
fn promote(shared: &Arc<Shared>, inner: &mut Inner, id: ExpId, exp: &Arc<Experiment>) {
    if exp.pause_at() == 0 {
        // cleared by a cooperative pause; resume the full run
        exp.reset_pause();
    }
    exp.set_status(Status::Running);
    inner.emit(SchedulerEvent::StatusChanged {
        id,
        status: Status::Running,
    });
    inner.running.push(id);
    ensure_ticker(shared, inner);
    if let Some(runtimes) = exp.take_runtimes() {
        spawn_batch(shared, id, Arc::clone(exp), runtimes);
    }
    // with the runtimes still held by an in-flight batch, the finish
    // handler resubmits on completion
}

fn spawn_batch(shared: &Arc<Shared>, id: ExpId, exp: Arc<Experiment>, runtimes: Vec<TrialRuntime>) {
    let handler = Arc::clone(shared);
    shared.pool.spawn(move || {
        let mut runtimes = runtimes;
        runtimes.par_iter_mut().for_each(|trial| trial.run(&exp));
        batch_finished(&handler, id, exp, runtimes);
    });
}

/// Runs on the pool once every trial task of a batch has completed.
fn batch_finished(shared: &Arc<Shared>, id: ExpId, exp: Arc<Experiment>, runtimes: Vec<TrialRuntime>) {
    let mut inner = lock_or_recover(&shared.inner);
    exp.store_runtimes(runtimes);

    if let Some(pos) = inner.pending_kill.iter().position(|k| *k == id) {
        inner.pending_kill.remove(pos);
        inner.running.retain(|r| *r != id);
        inner.queue.retain(|q| *q != id);
        inner.experiments.shift_remove(&id);
        exp.clear_runtimes();
        inner.emit(SchedulerEvent::Killed { id });
        drain_queue(shared, &mut inner);
        shared.idle_cv.notify_all();
        return;
    }

    let scheduled = inner.running.contains(&id) && exp.status() == Status::Running;

    if exp.any_trial_invalid() {
        inner.running.retain(|r| *r != id);
        exp.pause();
        exp.set_status(Status::Invalid);
        inner.emit(SchedulerEvent::StatusChanged {
            id,
            status: Status::Invalid,
        });
    } else if exp.all_trials_finished() {
        inner.running.retain(|r| *r != id);
        inner.queue.retain(|q| *q != id);
        exp.restore_stop();
        if exp.update_progress() {
            inner.emit(SchedulerEvent::ProgressUpdated {
                id,
                progress: exp.progress(),
            });
        }
        exp.set_status(Status::Finished);
        inner.emit(SchedulerEvent::StatusChanged {
            id,
            status: Status::Finished,
        });
        if exp.setup().auto_delete {
            exp.clear_runtimes();
        }
    } else if scheduled && exp.min_unfinished_step().is_some_and(|step| step < exp.pause_at()) {
        // still scheduled with runnable work (the experiment was
        // re-promoted while this batch drained): continue right away
        if let Some(runtimes) = exp.take_runtimes() {
            spawn_batch(shared, id, exp, runtimes);
        }
        return;
    } else if exp.status() == Status::Queued {
        // demoted to the queue head by a capacity shrink; its trial
        // state stays put until a slot frees up
        inner.running.retain(|r| *r != id);
    } else {
        inner.running.retain(|r| *r != id);
        exp.reset_pause();
        exp.set_status(Status::Ready);
        inner.emit(SchedulerEvent::StatusChanged {
            id,
            status: Status::Ready,
        });
    }

    drain_queue(shared, &mut inner);
    shared.idle_cv.notify_all();
}

/// Promotes queued experiments until capacity is saturated or the queue is
/// empty. This is deliberately a loop, not a single pop, so that several
/// slots freed at once are all refilled.
fn drain_queue(shared: &Arc<Shared>, inner: &mut Inner) {
    while inner.running.len() < inner.capacity {
        let Some(id) = inner.queue.pop_front() else {
            break;
        };
        let Some(exp) = inner.experiments.get(&id).cloned() else {
            continue;
        };
        promote(shared, inner, id, &exp);
    }
}

/// Starts the progress poller if it is not already alive. It dies on its
/// own as soon as the running set empties.
fn ensure_ticker(shared: &Arc<Shared>, inner: &mut Inner) {
    if inner.ticker_alive {
        return;
    }
    inner.ticker_alive = true;
    let shared = Arc::clone(shared);
    let spawned = thread::Builder::new()
        .name("evorun-progress".into())
        .spawn(move || loop {
            thread::sleep(shared.interval);
            let mut inner = lock_or_recover(&shared.inner);
            if inner.running.is_empty() {
                inner.ticker_alive = false;
                return;
            }
            let running: Vec<ExpId> = inner.running.clone();
            for id in running {
                if let Some(exp) = inner.experiments.get(&id).cloned() {
                    if exp.update_progress() {
                        inner.emit(SchedulerEvent::ProgressUpdated {
                            id,
                            progress: exp.progress(),
                        });
                    }
                }
            }
        });
    if spawned.is_err() {
        warn!("could not start the progress poller");
        inner.ticker_alive = false;
    }
}
