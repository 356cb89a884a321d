//! Runtime configuration for a [`crate::Pool`].
//!
//! There is deliberately no CLI, environment variable, or `.env` surface
//! here: the pool takes no outside configuration beyond what its embedder
//! passes in code.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The tick interval driving the status loop. Bounds both timeout-detection
/// latency and coordinator CPU load; exposed as a tunable constant rather
/// than hardcoded.
pub const DEFAULT_SLEEP_UNIT: Duration = Duration::from_millis(20);

/// Lifecycle parameters applied to every worker process in the pool.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Name of a task registered via [`crate::register_task!`] to run once,
    /// in-process, before a worker starts consuming tasks. A non-zero exit
    /// from the worker process is how an initializer failure is surfaced; the
    /// coordinator observes it as abnormal termination on the next status
    /// tick.
    pub initializer: Option<&'static str>,
    /// Serialized argument passed to `initializer`.
    pub initargs: Vec<u8>,
    /// Name of a task run once after a worker gracefully exhausts its
    /// `task_limit` or observes end-of-stream.
    pub deinitializer: Option<&'static str>,
    /// Serialized argument passed to `deinitializer`.
    pub deinitargs: Vec<u8>,
    /// Number of tasks a worker executes before it recycles itself (exits
    /// and is respawned). `0` means unlimited.
    pub task_limit: usize,
}

/// Pool-wide configuration.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Fixed number of worker processes to maintain. No elastic resizing.
    pub workers: usize,
    /// Status-loop tick interval.
    pub sleep_unit: Duration,
    /// Lifecycle parameters applied uniformly to every worker.
    pub worker: WorkerConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_worker_count(),
            sleep_unit: DEFAULT_SLEEP_UNIT,
            worker: WorkerConfig::default(),
        }
    }
}

impl PoolConfig {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_sleep_unit(mut self, sleep_unit: Duration) -> Self {
        self.sleep_unit = sleep_unit;
        self
    }

    #[must_use]
    pub fn with_worker_config(mut self, worker: WorkerConfig) -> Self {
        self.worker = worker;
        self
    }
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

/// Environment variable a freshly exec'd worker reads to reconstruct its
/// [`WorkerConfig`]; there is no shared memory across `exec`, so this is the
/// only way to hand it down.
pub(crate) const ENV_WORKER_CONFIG: &str = "PROCPOOL_WORKER_CONFIG";

impl WorkerConfig {
    pub(crate) fn to_env_value(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub(crate) fn from_env_value(value: &str) -> serde_json::Result<Self> {
        serde_json::from_str(value)
    }
}
