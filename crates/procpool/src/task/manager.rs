//! Bookkeeping for in-flight tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use procpool_core::Outcome;

use super::handle::ResolvableTask;
use crate::queue::TaskQueue;

struct TaskRecord {
    task: Arc<dyn ResolvableTask>,
    timeout: Option<Duration>,
    started_at: Option<Instant>,
    worker_pid: Option<u32>,
}

/// A task observed as having run past its deadline or been cancelled while
/// running, resolved by the pool manager against a live worker.
pub struct StalledTask {
    pub task_id: u64,
    pub worker_pid: u32,
}

/// Tracks every dispatched-but-unresolved task, keyed by task id, plus an
/// inverse index from worker pid to the task it last claimed (so a crashed
/// worker's orphaned task can be found without a linear scan).
pub struct TaskManager {
    tasks: Mutex<HashMap<u64, TaskRecord>>,
    by_worker: Mutex<HashMap<u32, u64>>,
    queue: TaskQueue,
}

impl TaskManager {
    pub fn new(queue: TaskQueue) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            by_worker: Mutex::new(HashMap::new()),
            queue,
        }
    }

    /// Registers a freshly scheduled task. Must be called before the
    /// corresponding `NewTask` is dispatched, so an implausibly fast
    /// `Acknowledgement` can never race ahead of the record's existence.
    pub fn register(&self, task_id: u64, task: Arc<dyn ResolvableTask>, timeout: Option<Duration>) {
        let mut tasks = self.tasks.lock();
        debug_assert!(
            !tasks.contains_key(&task_id),
            "task id {task_id} registered twice"
        );
        tasks.insert(
            task_id,
            TaskRecord {
                task,
                timeout,
                started_at: None,
                worker_pid: None,
            },
        );
    }

    /// Stamps the worker that claimed `task_id`. A missing id means the task
    /// already resolved (e.g. cancelled) before this ack was processed; drop
    /// it silently.
    pub fn task_start(&self, task_id: u64, worker_pid: u32) {
        let mut tasks = self.tasks.lock();
        if let Some(record) = tasks.get_mut(&task_id) {
            record.started_at = Some(Instant::now());
            record.worker_pid = Some(worker_pid);
            record.task.mark_started();
            self.by_worker.lock().insert(worker_pid, task_id);
        }
    }

    /// Resolves and removes `task_id`. A missing id is dropped silently
    /// (duplicate or late message after the task was already resolved by the
    /// status loop).
    pub fn task_done(&self, task_id: u64, outcome: Outcome) {
        let mut tasks = self.tasks.lock();
        if let Some(record) = tasks.remove(&task_id) {
            if let Some(pid) = record.worker_pid {
                self.by_worker.lock().remove(&pid);
            }
            record.task.set_results(outcome);
            self.queue.task_done();
        }
    }

    /// A consistent snapshot of tasks that have exceeded their deadline or
    /// were cancelled after starting, taken under one lock acquisition.
    pub fn inspect_tasks(&self) -> (Vec<StalledTask>, Vec<StalledTask>) {
        let tasks = self.tasks.lock();
        let mut timed_out = Vec::new();
        let mut cancelled_running = Vec::new();
        for (&task_id, record) in tasks.iter() {
            let (Some(started_at), Some(worker_pid)) = (record.started_at, record.worker_pid)
            else {
                continue;
            };
            if record
                .timeout
                .is_some_and(|timeout| started_at.elapsed() > timeout)
            {
                timed_out.push(StalledTask { task_id, worker_pid });
            } else if record.task.is_cancelled() {
                cancelled_running.push(StalledTask { task_id, worker_pid });
            }
        }
        (timed_out, cancelled_running)
    }

    /// Looks up the task a worker had claimed, if any. Used when a worker
    /// exits abnormally so its orphaned task can be resolved with
    /// `Outcome::ProcessExpired`.
    pub fn task_owned_by(&self, worker_pid: u32) -> Option<u64> {
        self.by_worker.lock().get(&worker_pid).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FakeTask {
        resolved: Mutex<Option<Outcome>>,
        cancelled: AtomicBool,
    }

    impl ResolvableTask for FakeTask {
        fn set_results(&self, outcome: Outcome) {
            *self.resolved.lock() = Some(outcome);
        }

        fn is_cancelled(&self) -> bool {
            self.cancelled.load(Ordering::SeqCst)
        }

        fn mark_started(&self) {}
    }

    fn manager() -> TaskManager {
        TaskManager::new(TaskQueue::new())
    }

    #[test]
    fn task_start_is_a_noop_for_unknown_id() {
        let mgr = manager();
        mgr.task_start(999, 1);
        assert_eq!(mgr.task_owned_by(1), None);
    }

    #[test]
    fn task_done_resolves_and_clears_inverse_index() {
        let mgr = manager();
        let task = Arc::new(FakeTask::default());
        mgr.register(1, task.clone(), None);
        mgr.task_start(1, 42);
        assert_eq!(mgr.task_owned_by(42), Some(1));

        mgr.task_done(1, Outcome::UserValue(vec![1, 2, 3]));
        assert_eq!(mgr.task_owned_by(42), None);
        assert!(matches!(
            *task.resolved.lock(),
            Some(Outcome::UserValue(_))
        ));
    }

    #[test]
    fn task_done_on_unknown_id_does_not_panic() {
        let mgr = manager();
        mgr.task_done(123, Outcome::TimeoutError);
    }

    #[test]
    fn inspect_tasks_only_reports_started_tasks() {
        let mgr = manager();
        let unstarted = Arc::new(FakeTask::default());
        mgr.register(1, unstarted, Some(Duration::from_millis(0)));

        let (timed_out, cancelled) = mgr.inspect_tasks();
        assert!(timed_out.is_empty());
        assert!(cancelled.is_empty());
    }

    #[test]
    fn inspect_tasks_detects_timeout_once_started() {
        let mgr = manager();
        let task = Arc::new(FakeTask::default());
        mgr.register(1, task, Some(Duration::from_millis(1)));
        mgr.task_start(1, 7);
        std::thread::sleep(Duration::from_millis(20));

        let (timed_out, _cancelled) = mgr.inspect_tasks();
        assert_eq!(timed_out.len(), 1);
        assert_eq!(timed_out[0].task_id, 1);
        assert_eq!(timed_out[0].worker_pid, 7);
    }

    #[test]
    fn inspect_tasks_detects_cancellation_once_started() {
        let mgr = manager();
        let task = Arc::new(FakeTask::default());
        mgr.register(1, task.clone(), None);
        mgr.task_start(1, 7);
        task.cancelled.store(true, Ordering::SeqCst);

        let (timed_out, cancelled) = mgr.inspect_tasks();
        assert!(timed_out.is_empty());
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].task_id, 1);
    }
}
