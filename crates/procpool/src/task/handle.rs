use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use procpool_core::Outcome;
use serde::de::DeserializeOwned;

/// Raised when a resolved task's `Outcome` cannot be turned into the caller's
/// requested return type.
#[derive(Debug, thiserror::Error)]
pub enum OutcomeError {
    #[error("the registered function returned an error: {0}")]
    UserError(String),
    #[error("task exceeded its timeout")]
    Timeout,
    #[error("task was cancelled")]
    Cancelled,
    #[error("worker process owning this task exited unexpectedly (exit code {exit_code})")]
    ProcessExpired { exit_code: i32 },
    #[error("failed to deserialize the task's return value: {0}")]
    Deserialize(#[from] serde_json::Error),
}

trait IntoOutcomeResult {
    fn into_outcome_result(self) -> Result<Vec<u8>, OutcomeError>;
}

impl IntoOutcomeResult for Outcome {
    fn into_outcome_result(self) -> Result<Vec<u8>, OutcomeError> {
        match self {
            Outcome::UserValue(bytes) => Ok(bytes),
            Outcome::UserError(message) => Err(OutcomeError::UserError(message)),
            Outcome::TimeoutError => Err(OutcomeError::Timeout),
            Outcome::TaskCancelled => Err(OutcomeError::Cancelled),
            Outcome::ProcessExpired { exit_code } => {
                Err(OutcomeError::ProcessExpired { exit_code })
            }
        }
    }
}

struct Shared {
    outcome: Mutex<Option<Outcome>>,
    done: Condvar,
    cancelled: AtomicBool,
    started: AtomicBool,
}

/// Type-erased view of a [`Task`], independent of its return type `R`. The
/// Task Manager holds tasks of many different `R`s in one table and only
/// ever needs to install an outcome or inspect cancellation/start state, so
/// it stores this trait object rather than `Task<R>` itself.
pub(crate) trait ResolvableTask: Send + Sync {
    fn set_results(&self, outcome: Outcome);
    fn is_cancelled(&self) -> bool;
    fn mark_started(&self);
}

impl<R: Send + Sync> ResolvableTask for Task<R> {
    fn set_results(&self, outcome: Outcome) {
        Task::set_results(self, outcome);
    }

    fn is_cancelled(&self) -> bool {
        Task::is_cancelled(self)
    }

    fn mark_started(&self) {
        Task::mark_started(self);
    }
}

/// A handle to a single dispatched task, returned by `Pool::submit`.
///
/// Cloning shares the same underlying task: every clone observes the same
/// resolution and the same cancellation flag.
pub struct Task<R> {
    number: u64,
    timeout: Option<Duration>,
    shared: Arc<Shared>,
    _marker: std::marker::PhantomData<fn() -> R>,
}

impl<R> Clone for Task<R> {
    fn clone(&self) -> Self {
        Self {
            number: self.number,
            timeout: self.timeout,
            shared: Arc::clone(&self.shared),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<R> Task<R> {
    pub(crate) fn new(number: u64, timeout: Option<Duration>) -> Self {
        Self {
            number,
            timeout,
            shared: Arc::new(Shared {
                outcome: Mutex::new(None),
                done: Condvar::new(),
                cancelled: AtomicBool::new(false),
                started: AtomicBool::new(false),
            }),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Marks the task cancelled. If it has not yet been claimed by a worker,
    /// the scheduler loop drops it without dispatch; if it is already
    /// running, the status loop observes the flag on its next tick and
    /// resolves it with `Outcome::TaskCancelled`.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_started(&self) {
        self.shared.started.store(true, Ordering::SeqCst);
    }

    /// Blocks until the task resolves or `timeout` elapses, returning
    /// whether it resolved. `None` blocks indefinitely.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut outcome = self.shared.outcome.lock();
        if outcome.is_some() {
            return true;
        }
        match timeout {
            None => {
                self.shared.done.wait(&mut outcome);
                true
            }
            Some(d) => !self.shared.done.wait_for(&mut outcome, d).timed_out() || outcome.is_some(),
        }
    }

    pub(crate) fn set_results(&self, outcome: Outcome) {
        let mut guard = self.shared.outcome.lock();
        if guard.is_none() {
            *guard = Some(outcome);
            self.shared.done.notify_all();
        }
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.shared.outcome.lock().is_some()
    }
}

impl<R: DeserializeOwned> Task<R> {
    /// Blocks until the task resolves (or `timeout` elapses) and returns its
    /// typed result.
    pub fn get(&self, timeout: Option<Duration>) -> Result<R, OutcomeError> {
        if !self.wait(timeout) {
            return Err(OutcomeError::Timeout);
        }
        let outcome = self
            .shared
            .outcome
            .lock()
            .clone()
            .expect("wait() returned true without an installed outcome");
        let bytes = outcome.into_outcome_result()?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
