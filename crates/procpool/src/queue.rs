//! The blocking submission queue between `Pool::submit` and the scheduler
//! loop, in the style of Python's `queue.Queue` but natively typed and built
//! directly on `parking_lot`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use procpool_core::Payload;

use crate::task::ResolvableTask;

/// A task that has been submitted but not yet dispatched to a worker.
pub struct ScheduledTask {
    pub task_id: u64,
    pub payload: Payload,
    pub timeout: Option<Duration>,
    pub handle: Arc<dyn ResolvableTask>,
}

enum Item {
    Task(ScheduledTask),
    /// Shutdown sentinel; wakes a blocked `get()` without a task to hand
    /// back, telling the scheduler loop to exit.
    Stop,
}

struct Inner {
    items: VecDeque<Item>,
    unfinished: usize,
}

/// Shared submission queue. Cheaply cloneable; every clone refers to the
/// same underlying queue.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Mutex<Inner>>,
    not_empty: Arc<Condvar>,
    all_done: Arc<Condvar>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                items: VecDeque::new(),
                unfinished: 0,
            })),
            not_empty: Arc::new(Condvar::new()),
            all_done: Arc::new(Condvar::new()),
        }
    }

    /// Enqueues a task and counts it against `join()`'s completion barrier.
    pub fn put(&self, task: ScheduledTask) {
        let mut inner = self.inner.lock();
        inner.unfinished += 1;
        inner.items.push_back(Item::Task(task));
        self.not_empty.notify_one();
    }

    /// Wakes the scheduler loop to exit without handing it a task.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.items.push_back(Item::Stop);
        self.not_empty.notify_one();
    }

    /// Blocks until an item is available. `None` means the shutdown
    /// sentinel was received; the caller should stop pulling.
    pub fn get(&self) -> Option<ScheduledTask> {
        let mut inner = self.inner.lock();
        loop {
            match inner.items.pop_front() {
                Some(Item::Task(task)) => return Some(task),
                Some(Item::Stop) => return None,
                None => self.not_empty.wait(&mut inner),
            }
        }
    }

    /// Marks one previously-`put` task as accounted for (resolved or
    /// dropped without dispatch), decrementing the completion counter that
    /// `join()` waits on.
    pub fn task_done(&self) {
        let mut inner = self.inner.lock();
        assert!(inner.unfinished > 0, "task_done() called more times than put()");
        inner.unfinished -= 1;
        if inner.unfinished == 0 {
            self.all_done.notify_all();
        }
    }

    /// Blocks until every task submitted so far has been accounted for via
    /// `task_done()`.
    pub fn join(&self) {
        let mut inner = self.inner.lock();
        while inner.unfinished > 0 {
            self.all_done.wait(&mut inner);
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procpool_core::Outcome;

    struct NoopHandle;
    impl ResolvableTask for NoopHandle {
        fn set_results(&self, _outcome: Outcome) {}
        fn is_cancelled(&self) -> bool {
            false
        }
        fn mark_started(&self) {}
    }

    fn scheduled(id: u64) -> ScheduledTask {
        ScheduledTask {
            task_id: id,
            payload: Payload {
                fn_name: "noop".into(),
                args: Vec::new(),
            },
            timeout: None,
            handle: Arc::new(NoopHandle),
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let queue = TaskQueue::new();
        queue.put(scheduled(1));
        let task = queue.get().expect("task");
        assert_eq!(task.task_id, 1);
    }

    #[test]
    fn stop_unblocks_get_with_none() {
        let queue = TaskQueue::new();
        queue.stop();
        assert!(queue.get().is_none());
    }

    #[test]
    fn join_waits_for_task_done() {
        let queue = TaskQueue::new();
        queue.put(scheduled(1));
        let queue2 = queue.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            queue2.task_done();
        });
        queue.join();
        handle.join().unwrap();
    }
}
