//! Shared vocabulary for `procpool`: the wire messages that cross the IPC
//! channel, the outcome taxonomy installed on a finished task, and the
//! internal error type returned by coordinator-level operations.
//!
//! Split out of `procpool` itself so that a worker-side `fn(&[u8]) -> Outcome`
//! registered via `procpool::register_task!` can depend on this crate alone,
//! without pulling in the coordinator's threading and process-management
//! machinery.

mod error;
mod message;
mod outcome;

pub use error::Error;
pub use message::{Message, Payload};
pub use outcome::Outcome;

pub type Result<T> = core::result::Result<T, Error>;
