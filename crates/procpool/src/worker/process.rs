//! The worker entry routine, run inside every freshly exec'd child process.

use std::io;
use std::time::Duration;

use nix::sys::signal::{SigHandler, Signal, signal};
use procpool_core::{Message, Payload};

use crate::config::{ENV_WORKER_CONFIG, WorkerConfig};
use crate::ipc::WorkerEndpoint;
use crate::task::registry;

const IDLE_POLL: Duration = Duration::from_millis(5);

/// Runs to completion inside a worker process, never returning to the
/// embedder's `main()`. Called by [`crate::init`] once it has detected the
/// worker marker argument.
pub fn run() -> ! {
    let config = std::env::var(ENV_WORKER_CONFIG)
        .ok()
        .and_then(|v| WorkerConfig::from_env_value(&v).ok())
        .unwrap_or_default();

    let mut channel = match WorkerEndpoint::from_env() {
        Some(channel) => channel,
        None => {
            #[cfg(feature = "tracing")]
            tracing::error!("worker process started without a valid channel in the environment");
            std::process::exit(1);
        }
    };

    // SAFETY: installing a signal disposition for this process only, before
    // any other thread is spawned.
    if unsafe { signal(Signal::SIGINT, SigHandler::SigIgn) }.is_err() {
        #[cfg(feature = "tracing")]
        tracing::warn!("failed to ignore SIGINT in worker process");
    }

    if let Some(name) = config.initializer {
        if let Err(message) = registry::call(name, &config.initargs) {
            #[cfg(feature = "tracing")]
            tracing::error!(initializer = name, error = %message, "initializer failed");
            std::process::exit(1);
        }
    }

    let worker_pid = std::process::id();
    let mut tasks_run: usize = 0;

    let exit_code = loop {
        if config.task_limit != 0 && tasks_run >= config.task_limit {
            break 0;
        }

        match channel.poll_tasks(Some(IDLE_POLL)) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(err) => break exit_code_from_io(&err),
        }

        let guard = match channel.lock() {
            Ok(guard) => guard,
            Err(_) => continue,
        };

        match channel.poll_tasks(Some(Duration::ZERO)) {
            Ok(false) => {
                // A peer worker claimed it first.
                drop(guard);
                continue;
            }
            Ok(true) => {}
            Err(err) => break exit_code_from_io(&err),
        }

        let message = match channel.recv_task() {
            Ok(message) => message,
            Err(err) => break exit_code_from_io(&err),
        };

        let Message::NewTask { task_id, payload } = message else {
            #[cfg(feature = "tracing")]
            tracing::warn!("worker received unexpected message on task_pipe");
            drop(guard);
            continue;
        };

        if let Err(err) = channel.send_event(&Message::Acknowledgement { worker_pid, task_id }) {
            break exit_code_from_io(&err);
        }
        drop(guard);

        tasks_run += 1;
        let Payload { fn_name, args } = payload;
        let outcome = match registry::invoke(&fn_name, &args) {
            Ok(outcome) => outcome,
            Err(err) => procpool_core::Outcome::UserError(err.to_string()),
        };

        if let Err(err) = channel.send_event(&Message::Results { task_id, outcome }) {
            break exit_code_from_io(&err);
        }
    };

    if let Some(name) = config.deinitializer {
        if let Err(message) = registry::call(name, &config.deinitargs) {
            #[cfg(feature = "tracing")]
            tracing::warn!(deinitializer = name, error = %message, "deinitializer failed");
        }
    }

    std::process::exit(exit_code);
}

/// The coordinator closing its end of `task_pipe` (end of stream) is a
/// graceful shutdown, not a failure, and must exit with status 0.
fn exit_code_from_io(err: &procpool_core::Error) -> i32 {
    match err {
        procpool_core::Error::ChannelIo(io_err) if io_err.kind() == io::ErrorKind::UnexpectedEof => {
            0
        }
        procpool_core::Error::ChannelIo(io_err) => io_err.raw_os_error().unwrap_or(1),
        _ => 1,
    }
}
