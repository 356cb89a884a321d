use serde::{Deserialize, Serialize};

use crate::outcome::Outcome;

/// A task's payload as it travels over the IPC channel: the name a function
/// was registered under (see `procpool::register_task!`) plus its serialized
/// argument.
///
/// Rust has no runtime equivalent of Python's `*args, **kwargs`; keyword
/// arguments are expected to be folded into the serialized argument struct by
/// the caller before submission.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Payload {
    pub fn_name: String,
    pub args: Vec<u8>,
}

/// Tagged messages exchanged on the IPC channel.
///
/// `NewTask` travels coordinator -> workers on `task_pipe`. `Acknowledgement`
/// and `Results` travel worker -> coordinator on `event_pipe`. A synthetic
/// "no message" case never crosses the wire; it is represented on this side
/// as `channel.poll` simply returning `false` on timeout rather than as a
/// wire variant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Message {
    NewTask { task_id: u64, payload: Payload },
    Acknowledgement { worker_pid: u32, task_id: u64 },
    Results { task_id: u64, outcome: Outcome },
}
