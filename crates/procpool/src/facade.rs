//! The public entry point: a fixed-size pool of worker processes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use procpool_core::{Error, Payload, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::PoolConfig;
use crate::ipc::PoolEndpoint;
use crate::pool::manager::PoolManager;
use crate::queue::{ScheduledTask, TaskQueue};
use crate::task::manager::TaskManager;
use crate::task::{Task, ResolvableTask};
use crate::worker::manager::WorkerManager;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PoolState {
    Created,
    Running,
    Stopped,
}

struct RunningLoops {
    alive: Arc<AtomicBool>,
    handles: Vec<std::thread::JoinHandle<()>>,
}

/// A fixed-size pool of worker processes, coordinated by three background
/// threads over a process-inherited IPC channel.
///
/// `Pool::submit` never blocks on a worker being available: tasks queue up
/// and the scheduler loop dispatches them as workers free up.
pub struct Pool {
    config: PoolConfig,
    lock_path: std::path::PathBuf,
    queue: TaskQueue,
    manager: Mutex<Option<Arc<PoolManager>>>,
    running: Mutex<Option<RunningLoops>>,
    state: Mutex<PoolState>,
    next_task_id: AtomicU64,
}

impl Pool {
    /// Creates a pool in the `Created` state. Call [`Pool::start`] before
    /// submitting any task.
    pub fn new(config: PoolConfig) -> Self {
        static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(0);
        let pool_id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let lock_path = std::env::temp_dir().join(format!(
            "procpool-{}-{pool_id}.lock",
            std::process::id()
        ));
        Self {
            config,
            lock_path,
            queue: TaskQueue::new(),
            manager: Mutex::new(None),
            running: Mutex::new(None),
            state: Mutex::new(PoolState::Created),
            next_task_id: AtomicU64::new(1),
        }
    }

    /// Spawns the configured number of worker processes and launches the
    /// scheduler, status, and message loops.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != PoolState::Created {
            return Err(Error::AlreadyRunning);
        }

        let endpoint = PoolEndpoint::create(&self.lock_path)?;
        let workers = WorkerManager::new(endpoint, self.config.worker.clone());
        let tasks = TaskManager::new(self.queue.clone());
        let manager = Arc::new(PoolManager::new(tasks, workers, self.config.clone()));
        manager.create_workers()?;

        let alive = Arc::new(AtomicBool::new(true));
        let mut handles = Vec::with_capacity(3);

        {
            let queue = self.queue.clone();
            let manager = Arc::clone(&manager);
            let alive = Arc::clone(&alive);
            handles.push(std::thread::spawn(move || {
                crate::loops::scheduler_loop(queue, manager, alive);
            }));
        }
        {
            let manager = Arc::clone(&manager);
            let alive = Arc::clone(&alive);
            let sleep_unit = self.config.sleep_unit;
            handles.push(std::thread::spawn(move || {
                crate::loops::status_loop(manager, sleep_unit, alive);
            }));
        }
        {
            let manager = Arc::clone(&manager);
            let alive = Arc::clone(&alive);
            let sleep_unit = self.config.sleep_unit;
            handles.push(std::thread::spawn(move || {
                crate::loops::message_loop(manager, sleep_unit, alive);
            }));
        }

        *self.manager.lock() = Some(manager);
        *self.running.lock() = Some(RunningLoops { alive, handles });
        *state = PoolState::Running;
        Ok(())
    }

    /// Submits a call to the function registered under `fn_name` (see
    /// [`crate::register_task!`]), returning a handle to await its result.
    pub fn submit<A, R>(
        &self,
        fn_name: &'static str,
        args: A,
        timeout: Option<Duration>,
    ) -> Result<Task<R>>
    where
        A: Serialize,
        R: DeserializeOwned + Send + Sync + 'static,
    {
        if *self.state.lock() != PoolState::Running {
            return Err(Error::PoolNotRunning);
        }

        let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let task = Task::<R>::new(task_id, timeout);
        let handle: Arc<dyn ResolvableTask> = Arc::new(task.clone());
        let payload = Payload {
            fn_name: fn_name.to_string(),
            args: serde_json::to_vec(&args)?,
        };

        self.queue.put(ScheduledTask {
            task_id,
            payload,
            timeout,
            handle,
        });

        Ok(task)
    }

    /// Clears the shutdown flag, stops every worker, and joins the three
    /// coordinator threads. Does not drain pending, un-dispatched tasks —
    /// they are simply abandoned.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state == PoolState::Stopped {
            return Err(Error::AlreadyStopped);
        }

        self.queue.stop();
        if let Some(running) = self.running.lock().take() {
            running.alive.store(false, Ordering::Release);
            for handle in running.handles {
                let _ = handle.join();
            }
        }
        if let Some(manager) = self.manager.lock().take() {
            manager.stop_workers();
        }
        let _ = std::fs::remove_file(&self.lock_path);

        *state = PoolState::Stopped;
        Ok(())
    }

    /// Blocks until every previously-submitted task has been accounted for,
    /// then stops the pool.
    pub fn close(&self) -> Result<()> {
        self.queue.join();
        self.stop()
    }
}
