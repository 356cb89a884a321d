//! Composes the Task Manager and Worker Manager into the operations the
//! coordinator loops drive.

use procpool_core::{Message, Outcome, Payload, Result};

use crate::config::PoolConfig;
use crate::queue::ScheduledTask;
use crate::task::manager::TaskManager;
use crate::worker::manager::WorkerManager;

pub struct PoolManager {
    tasks: TaskManager,
    workers: WorkerManager,
    config: PoolConfig,
}

impl PoolManager {
    pub fn new(tasks: TaskManager, workers: WorkerManager, config: PoolConfig) -> Self {
        Self {
            tasks,
            workers,
            config,
        }
    }

    pub fn create_workers(&self) -> Result<()> {
        self.workers.create_workers(self.config.workers)
    }

    pub fn poll_events(&self, timeout: Option<std::time::Duration>) -> Result<bool> {
        self.workers.poll_events(timeout)
    }

    pub fn recv_event(&self) -> Result<Message> {
        self.workers.recv_event()
    }

    pub fn stop_workers(&self) {
        self.workers.stop_workers();
    }

    /// Registration strictly precedes dispatch, so an implausibly fast
    /// acknowledgement can never arrive before the record exists.
    pub fn schedule(&self, scheduled: ScheduledTask) -> Result<()> {
        let ScheduledTask {
            task_id,
            payload,
            timeout,
            handle,
        } = scheduled;
        self.tasks.register(task_id, handle, timeout);
        self.dispatch_with_fallback(task_id, payload)
    }

    fn dispatch_with_fallback(&self, task_id: u64, payload: Payload) -> Result<()> {
        self.workers.dispatch(task_id, payload)
    }

    pub fn process_message(&self, message: Message) {
        match message {
            Message::Acknowledgement { worker_pid, task_id } => {
                self.tasks.task_start(task_id, worker_pid);
            }
            Message::Results { task_id, outcome } => {
                self.tasks.task_done(task_id, outcome);
            }
            Message::NewTask { .. } => {
                // Never received on the coordinator's event_pipe endpoint.
            }
        }
    }

    pub fn update_status(&self) {
        self.update_tasks();
        self.update_workers();
    }

    fn update_tasks(&self) {
        let (timed_out, cancelled_running) = self.tasks.inspect_tasks();
        for stalled in timed_out {
            #[cfg(feature = "tracing")]
            tracing::info!(task_id = stalled.task_id, "task timed out");
            self.tasks.task_done(stalled.task_id, Outcome::TimeoutError);
            self.workers.stop_worker(stalled.worker_pid);
        }
        for stalled in cancelled_running {
            #[cfg(feature = "tracing")]
            tracing::info!(task_id = stalled.task_id, "running task cancelled");
            self.tasks.task_done(stalled.task_id, Outcome::TaskCancelled);
            self.workers.stop_worker(stalled.worker_pid);
        }
    }

    fn update_workers(&self) {
        for expired in self.workers.inspect_workers() {
            if let Some(task_id) = self.tasks.task_owned_by(expired.pid) {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    task_id,
                    pid = expired.pid,
                    exit_code = expired.exit_code,
                    "task orphaned by crashed worker"
                );
                self.tasks.task_done(
                    task_id,
                    Outcome::ProcessExpired {
                        exit_code: expired.exit_code,
                    },
                );
            }
        }
        // Best effort: if re-provisioning fails here, the next status tick
        // retries.
        let _ = self.create_workers();
    }
}
