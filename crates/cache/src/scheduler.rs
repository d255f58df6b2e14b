//! Delayed background task scheduling
//!
//! Caches hand one-shot jobs to a [`TaskScheduler`] and keep the returned
//! [`TaskHandle`] to cancel them. [`TokioScheduler`] runs jobs on a tokio
//! runtime; [`ManualScheduler`] runs them only when driven, which keeps tests
//! and simulations deterministic.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, ManualClock, Timestamp};
use crate::errors::SchedulerError;

/// A unit of deferred work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Cancellation handle for a scheduled job.
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
    token: Option<CancellationToken>,
}

impl TaskHandle {
    fn with_token(token: CancellationToken) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            token: Some(token),
        }
    }

    /// Prevents the job from running if it has not started yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(token) = &self.token {
            token.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Runs a job after a delay on some worker.
pub trait TaskScheduler: Send + Sync + fmt::Debug {
    fn schedule(&self, delay: Duration, job: Job) -> Result<TaskHandle, SchedulerError>;

    /// Cancels every outstanding job and refuses new ones.
    fn shutdown(&self);

    fn is_shutdown(&self) -> bool;
}

// -----------------
// TokioScheduler
// -----------------
/// Scheduler backed by tokio timers.
///
/// Created inside a runtime it spawns onto that runtime; created outside of
/// one it owns a small private runtime that lives until shutdown.
pub struct TokioScheduler {
    handle: Handle,
    shutdown: CancellationToken,
    runtime: Mutex<Option<Runtime>>,
}

impl TokioScheduler {
    pub fn new() -> Result<Self, SchedulerError> {
        if let Ok(handle) = Handle::try_current() {
            return Ok(Self::with_handle(handle));
        }

        let runtime = match Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("blockttl-reclaim")
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                return Err(SchedulerError::Unavailable {
                    reason: format!("failed to create tokio runtime: {e}"),
                });
            }
        };

        Ok(Self {
            handle: runtime.handle().clone(),
            shutdown: CancellationToken::new(),
            runtime: Mutex::new(Some(runtime)),
        })
    }

    /// Spawns jobs onto an existing runtime.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            shutdown: CancellationToken::new(),
            runtime: Mutex::new(None),
        }
    }

    pub fn owns_runtime(&self) -> bool {
        self.runtime.lock().is_some()
    }
}

impl TaskScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, job: Job) -> Result<TaskHandle, SchedulerError> {
        if self.shutdown.is_cancelled() {
            return Err(SchedulerError::ShutDown);
        }

        let token = self.shutdown.child_token();
        let task = TaskHandle::with_token(token.clone());
        let cancelled = Arc::clone(&task.cancelled);

        self.handle.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if !cancelled.load(Ordering::SeqCst) {
                        job();
                    }
                }
            }
        });

        Ok(task)
    }

    fn shutdown(&self) {
        self.shutdown.cancel();
        // Safe to call from within an async context, unlike dropping the runtime
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("owns_runtime", &self.owns_runtime())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

// -----------------
// ManualScheduler
// -----------------
struct ScheduledJob {
    due: Timestamp,
    seq: u64,
    handle: TaskHandle,
    job: Job,
}

#[derive(Default)]
struct ManualState {
    jobs: Vec<ScheduledJob>,
    shutdown: bool,
    refuse: bool,
}

/// Deterministic scheduler driven by a [`ManualClock`].
///
/// Jobs run only from [`ManualScheduler::run_due`] or
/// [`ManualScheduler::advance`], in due order, on the calling thread.
pub struct ManualScheduler {
    clock: Arc<ManualClock>,
    state: Mutex<ManualState>,
    next_seq: AtomicU64,
}

impl ManualScheduler {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            state: Mutex::new(ManualState::default()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Makes subsequent `schedule` calls fail with [`SchedulerError::Rejected`].
    pub fn refuse_tasks(&self, refuse: bool) {
        self.state.lock().refuse = refuse;
    }

    /// Jobs that are neither cancelled nor run yet.
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .jobs
            .iter()
            .filter(|scheduled| !scheduled.handle.is_cancelled())
            .count()
    }

    /// Due time of the earliest outstanding job.
    pub fn next_due(&self) -> Option<Timestamp> {
        self.state
            .lock()
            .jobs
            .iter()
            .filter(|scheduled| !scheduled.handle.is_cancelled())
            .map(|scheduled| scheduled.due)
            .min()
    }

    /// Runs every job due at the clock's current reading.
    ///
    /// Returns the number of jobs that ran.
    pub fn run_due(&self) -> usize {
        let now = self.clock.now_millis();
        let mut due = {
            let mut state = self.state.lock();
            let (due, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut state.jobs)
                .into_iter()
                .partition(|scheduled| scheduled.due <= now);
            state.jobs = rest;
            due
        };
        due.sort_by_key(|scheduled| (scheduled.due, scheduled.seq));

        // Jobs may schedule more work, so the lock is released before running
        let mut ran = 0;
        for scheduled in due {
            if !scheduled.handle.is_cancelled() {
                (scheduled.job)();
                ran += 1;
            }
        }
        ran
    }

    /// Moves the clock forward and runs whatever became due.
    pub fn advance(&self, by: Duration) -> usize {
        self.clock.advance(by);
        self.run_due()
    }
}

impl TaskScheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, job: Job) -> Result<TaskHandle, SchedulerError> {
        let mut state = self.state.lock();
        if state.shutdown {
            return Err(SchedulerError::ShutDown);
        }
        if state.refuse {
            return Err(SchedulerError::Rejected {
                reason: "manual scheduler is refusing tasks".to_string(),
            });
        }

        let handle = TaskHandle::default();
        state.jobs.push(ScheduledJob {
            due: self
                .clock
                .now_millis()
                .saturating_add(delay.as_millis() as u64),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            handle: handle.clone(),
            job,
        });
        Ok(handle)
    }

    fn shutdown(&self) {
        let dropped = {
            let mut state = self.state.lock();
            state.shutdown = true;
            std::mem::take(&mut state.jobs)
        };
        for scheduled in &dropped {
            scheduled.handle.cancel();
        }
    }

    fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &self.clock.now_millis())
            .field("jobs", &state.jobs.len())
            .field("shutdown", &state.shutdown)
            .field("refuse", &state.refuse)
            .finish()
    }
}
