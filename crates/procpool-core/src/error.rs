//! Coordinator-level error type.
//!
//! This module defines the central `Error` enum, which captures all
//! recoverable and reportable failures at the coordinator boundary — as
//! opposed to task-level failures, which travel as `Outcome`s instead (see
//! `crate::outcome`).

/// Unified error type for coordinator-facing operations (`Pool::start`,
/// `Pool::submit`, `Pool::stop`, and the IPC channel underneath them).
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Low-level I/O failure on the IPC channel (pipe read/write, poll,
    /// spawn).
    #[error("channel I/O error: {0}")]
    ChannelIo(#[from] std::io::Error),

    /// A message or payload failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A worker received a `NewTask` whose `fn_name` has no registered
    /// handler in this binary.
    #[error("no task registered under name {name:?}")]
    UnknownTask { name: String },

    /// `WorkerManager::create_workers` failed to spawn a child process.
    #[error("failed to spawn worker process: {0}")]
    SpawnFailed(std::io::Error),

    /// An operation requiring a running pool was attempted outside the
    /// `Running` state.
    #[error("pool is not running")]
    PoolNotRunning,

    /// `Pool::start` was called on a pool already in the `Running` or
    /// `Stopped` state.
    #[error("pool is already running")]
    AlreadyRunning,

    /// `Pool::stop` (or `close`) was called more than once.
    #[error("pool is already stopped")]
    AlreadyStopped,
}
