use serde::{Deserialize, Serialize};

/// The taxonomy of terminal outcomes a task can be resolved with.
///
/// Every non-cancelled submission receives exactly one `Outcome`, installed
/// via `Task::set_results`. The coordinator never raises these into a caller
/// thread; the `Task` handle decides caller-visible semantics (`get()`
/// re-raising `UserError`/`TimeoutError`/`TaskCancelled`/`ProcessExpired`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Outcome {
    /// The registered function returned normally. Carries its serialized
    /// return value.
    UserValue(Vec<u8>),
    /// The registered function returned an error. Carries its `Display`
    /// rendering, since the error type itself may not be known to the
    /// coordinator or to other workers.
    UserError(String),
    /// The task's deadline elapsed before it completed.
    TimeoutError,
    /// The task was cancelled after it had already started executing.
    TaskCancelled,
    /// The worker owning this task died before producing a result.
    ProcessExpired { exit_code: i32 },
}

impl Outcome {
    pub fn is_terminal_failure(&self) -> bool {
        !matches!(self, Outcome::UserValue(_))
    }
}
