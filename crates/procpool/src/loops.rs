//! The three daemon threads `Pool::start` spawns: scheduler, status, and
//! message loops, all observing a shared `alive` flag for shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use procpool_core::Outcome;

use crate::pool::manager::PoolManager;
use crate::queue::TaskQueue;

/// Pulls tasks off the submission queue and dispatches them. `None` from
/// `queue.get()` is the shutdown sentinel. A task already cancelled before
/// being claimed by a worker is resolved as `TaskCancelled` without ever
/// consuming a worker slot.
pub fn scheduler_loop(queue: TaskQueue, pool: Arc<PoolManager>, alive: Arc<AtomicBool>) {
    while alive.load(Ordering::Acquire) {
        let Some(scheduled) = queue.get() else {
            break;
        };
        if scheduled.handle.is_cancelled() {
            scheduled.handle.set_results(Outcome::TaskCancelled);
            queue.task_done();
            continue;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(task_id = scheduled.task_id, "dispatching task");
        if let Err(_err) = pool.schedule(scheduled) {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %_err, "failed to dispatch task");
        }
    }
}

/// Ticks every `sleep_unit`, the sole driver of timeout and crash detection.
pub fn status_loop(pool: Arc<PoolManager>, sleep_unit: Duration, alive: Arc<AtomicBool>) {
    while alive.load(Ordering::Acquire) {
        std::thread::sleep(sleep_unit);
        pool.update_status();
    }
}

/// Consumes messages from the worker-facing channel and folds them into the
/// Task Manager. Polls with a timeout rather than blocking indefinitely so
/// it observes `alive` being cleared promptly.
pub fn message_loop(pool: Arc<PoolManager>, sleep_unit: Duration, alive: Arc<AtomicBool>) {
    while alive.load(Ordering::Acquire) {
        match pool.poll_events(Some(sleep_unit)) {
            Ok(true) => match pool.recv_event() {
                Ok(message) => pool.process_message(message),
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %_err, "failed to read event from worker channel");
                }
            },
            Ok(false) => {}
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_err, "failed to poll worker channel");
            }
        }
    }
}
