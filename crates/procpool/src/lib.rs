//! A fixed-size pool of OS worker processes with timeout, cancellation, and
//! crash-recovery semantics, coordinated over an inherited pipe-based IPC
//! channel.
//!
//! Every embedding binary must call [`init`] as the very first statement in
//! `fn main()`. A pool re-executes the current binary to spawn each worker
//! (mirroring `procspawn::init()`); `init` is what lets that re-exec branch
//! into the worker entry routine instead of running the embedder's own
//! `main` body again.
//!
//! ```ignore
//! fn main() {
//!     procpool::init();
//!     // ... ordinary program logic ...
//! }
//! ```

pub mod config;
pub mod facade;
pub mod ipc;
mod loops;
pub mod pool;
pub mod queue;
pub mod task;
pub mod worker;

pub use config::{PoolConfig, WorkerConfig};
pub use facade::Pool;
pub use procpool_core::{Error, Message, Outcome, Payload};
pub use task::{OutcomeError, Task};

/// Hidden re-exports used by [`register_task!`] and [`wrap!`] so those
/// macros work without requiring the embedder to depend on `inventory` or
/// `serde_json` directly.
#[doc(hidden)]
pub mod __private {
    pub use inventory;
    pub use serde_json;
}

/// The argument a re-exec'd worker process is launched with, distinguishing
/// it from an ordinary invocation of the embedding binary.
pub(crate) const WORKER_MARKER_ARG: &str = "--procpool-worker";

/// Must be called first in `fn main()` of any binary that builds a
/// [`Pool`]. Detects whether the current process was launched by a pool as a
/// worker and, if so, runs the worker entry routine and never returns.
pub fn init() {
    if std::env::args().nth(1).as_deref() == Some(WORKER_MARKER_ARG) {
        worker::process::run();
    }
}
