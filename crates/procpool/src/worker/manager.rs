//! Spawns, tracks, and reaps worker processes.

use std::collections::HashMap;
use std::process::{Child, Command};

use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use parking_lot::Mutex;
use procpool_core::{Error, Payload, Result};

use crate::config::{ENV_WORKER_CONFIG, WorkerConfig};
use crate::ipc::PoolEndpoint;

/// An abnormally-terminated worker observed by [`WorkerManager::inspect_workers`].
pub struct ExpiredWorker {
    pub pid: u32,
    pub exit_code: i32,
}

struct WorkerEntry {
    child: Child,
}

/// Maintains the live worker-process table and the primitives to
/// create/dispatch/stop workers against it.
pub struct WorkerManager {
    workers: Mutex<HashMap<u32, WorkerEntry>>,
    channel: Mutex<PoolEndpoint>,
    worker_config: WorkerConfig,
}

impl WorkerManager {
    pub fn new(channel: PoolEndpoint, worker_config: WorkerConfig) -> Self {
        Self {
            workers: Mutex::new(HashMap::new()),
            channel: Mutex::new(channel),
            worker_config,
        }
    }

    /// Spawns children (re-executing the current binary with the worker
    /// marker argument) until the table holds `target` entries.
    pub fn create_workers(&self, target: usize) -> Result<()> {
        let current_exe = std::env::current_exe().map_err(Error::SpawnFailed)?;
        let env = {
            let channel = self.channel.lock();
            channel.child_env()
        };
        let worker_config_value = self
            .worker_config
            .to_env_value()
            .map_err(Error::Serialization)?;

        let mut workers = self.workers.lock();
        while workers.len() < target {
            let mut command = Command::new(&current_exe);
            command.arg(crate::WORKER_MARKER_ARG);
            for (key, value) in &env {
                command.env(key, value);
            }
            command.env(ENV_WORKER_CONFIG, &worker_config_value);

            let child = command.spawn().map_err(Error::SpawnFailed)?;
            let pid = child.id();
            #[cfg(feature = "tracing")]
            tracing::debug!(pid, "worker spawned");
            workers.insert(pid, WorkerEntry { child });
        }
        Ok(())
    }

    /// Writes a `NewTask` onto the shared channel. Any one of the live
    /// workers may claim it.
    pub fn dispatch(&self, task_id: u64, payload: Payload) -> Result<()> {
        self.channel.lock().dispatch(task_id, payload)
    }

    pub fn poll_events(&self, timeout: Option<std::time::Duration>) -> Result<bool> {
        self.channel.lock().poll_events(timeout)
    }

    pub fn recv_event(&self) -> Result<procpool_core::Message> {
        self.channel.lock().recv_event()
    }

    /// Terminates `pid` under the channel lock, so it cannot be killed
    /// mid-write on `event_pipe` and corrupt the frame for every worker
    /// sharing that pipe. No-ops silently if `pid` is not in the table
    /// (already reaped).
    pub fn stop_worker(&self, pid: u32) {
        let _guard = self.channel.lock().lock().ok();
        let mut workers = self.workers.lock();
        if let Some(mut entry) = workers.remove(&pid) {
            #[cfg(feature = "tracing")]
            tracing::debug!(pid, "stopping worker");
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
            let _ = entry.child.wait();
        }
    }

    pub fn stop_workers(&self) {
        let pids: Vec<u32> = self.workers.lock().keys().copied().collect();
        for pid in pids {
            self.stop_worker(pid);
        }
    }

    /// Reaps any worker that has exited, evicting it from the table and
    /// reporting those whose exit was abnormal.
    pub fn inspect_workers(&self) -> Vec<ExpiredWorker> {
        let mut expired = Vec::new();
        let mut workers = self.workers.lock();
        let pids: Vec<u32> = workers.keys().copied().collect();
        for pid in pids {
            match waitpid(Pid::from_raw(pid as i32), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(_, code)) => {
                    workers.remove(&pid);
                    if code != 0 {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(pid, code, "worker exited abnormally");
                        expired.push(ExpiredWorker { pid, exit_code: code });
                    }
                }
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    workers.remove(&pid);
                    #[cfg(feature = "tracing")]
                    tracing::warn!(pid, ?signal, "worker killed by signal");
                    expired.push(ExpiredWorker {
                        pid,
                        exit_code: 128 + signal as i32,
                    });
                }
                Ok(WaitStatus::StillAlive) | Err(_) => {}
                Ok(_) => {}
            }
        }
        expired
    }
}
