//! The IPC channel: two inherited OS pipes plus a cross-process advisory
//! lock, giving the coordinator and every worker process a shared,
//! lockable, duplex message transport.

mod channel;
mod lock;

pub use channel::{ChannelHandle, PoolEndpoint, WorkerEndpoint};
