use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use nix::poll::{PollFd, PollFlags, PollTimeout};
use nix::unistd::pipe;
use procpool_core::{Error, Message, Result};

use super::lock::{LockFile, LockGuard};

/// Environment variable carrying the read end of `task_pipe`, passed to a
/// freshly exec'd worker (fd numbers survive `exec`, Rust values do not).
pub const ENV_TASK_READ_FD: &str = "PROCPOOL_TASK_READ_FD";
/// Environment variable carrying the write end of `event_pipe`.
pub const ENV_EVENT_WRITE_FD: &str = "PROCPOOL_EVENT_WRITE_FD";
/// Environment variable carrying the path to the shared lock file.
pub const ENV_LOCK_PATH: &str = "PROCPOOL_LOCK_PATH";

/// One direction of the duplex channel: a raw pipe fd, framed as
/// length-prefixed `serde_json` messages.
struct Pipe {
    file: File,
}

impl Pipe {
    fn from_owned(fd: OwnedFd) -> Self {
        Self {
            file: File::from(fd),
        }
    }

    /// # Safety
    /// `fd` must name a valid, open file descriptor for the duration of this
    /// `Pipe`'s lifetime (true of an inherited channel fd, which is never
    /// closed elsewhere in the worker process).
    unsafe fn from_raw(fd: RawFd) -> Self {
        Self {
            file: unsafe { File::from_raw_fd(fd) },
        }
    }

    /// Writes the length-prefixed frame in a single `write_all` call. Several
    /// workers may hold their own `Pipe` onto the same shared `event_pipe`
    /// fd and write concurrently outside the channel lock (`Results` is only
    /// ever sent without holding it); splitting the prefix and payload across
    /// two writes would let those frames interleave and tear.
    fn send(&mut self, message: &Message) -> Result<()> {
        let bytes = serde_json::to_vec(message)?;
        #[allow(clippy::cast_possible_truncation)]
        let len = (bytes.len() as u32).to_le_bytes();
        let mut frame = Vec::with_capacity(len.len() + bytes.len());
        frame.extend_from_slice(&len);
        frame.extend_from_slice(&bytes);
        self.file.write_all(&frame)?;
        Ok(())
    }

    fn recv(&mut self) -> Result<Message> {
        let mut len_buf = [0_u8; 4];
        self.file.read_exact(&mut len_buf)?;
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut buf = vec![0_u8; len];
        self.file.read_exact(&mut buf)?;
        Ok(serde_json::from_slice(&buf)?)
    }

    /// Returns `true` iff a full frame is readable within `timeout` without
    /// consuming it. `None` blocks indefinitely; `Some(Duration::ZERO)` is
    /// non-blocking.
    fn poll(&self, timeout: Option<Duration>) -> io::Result<bool> {
        let raw = self.file.as_raw_fd();
        let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(raw) };
        let mut fds = [PollFd::new(borrowed, PollFlags::POLLIN)];
        let poll_timeout = match timeout {
            None => PollTimeout::NONE,
            #[allow(clippy::cast_possible_truncation)]
            Some(d) => PollTimeout::try_from(d.as_millis().min(u128::from(i32::MAX as u32)) as u32)
                .expect("clamped to i32::MAX"),
        };
        let n = nix::poll::poll(&mut fds, poll_timeout).map_err(io::Error::from)?;
        Ok(n > 0 && fds[0].revents().is_some_and(|e| e.contains(PollFlags::POLLIN)))
    }
}

/// The shape shared by both endpoints of the channel: one read pipe, one
/// write pipe, and the cross-process lock guarding the claim protocol
/// (§4.2) and worker termination (§4.3).
pub struct ChannelHandle {
    read: Pipe,
    write: Pipe,
    lock: LockFile,
}

impl ChannelHandle {
    pub fn send(&mut self, message: &Message) -> Result<()> {
        self.write.send(message)
    }

    pub fn recv(&mut self) -> Result<Message> {
        self.read.recv()
    }

    pub fn poll(&self, timeout: Option<Duration>) -> Result<bool> {
        Ok(self.read.poll(timeout)?)
    }

    /// Acquires the cross-endpoint lock. Held across "poll, take, acknowledge"
    /// on the worker side, and across "stop this worker" on the coordinator
    /// side, so a kill can never land mid-write and leave a torn frame.
    pub fn lock(&self) -> Result<LockGuard> {
        Ok(self.lock.lock().map_err(Error::ChannelIo)?)
    }
}

/// The coordinator's view of the channel: writes `NewTask`, reads
/// `Acknowledgement`/`Results`.
pub struct PoolEndpoint {
    inner: ChannelHandle,
    // Kept alive so the fds stay valid for every worker spawned over the
    // pool's lifetime; never read from directly by the coordinator.
    _task_read_for_children: OwnedFd,
    _event_write_for_children: OwnedFd,
}

impl PoolEndpoint {
    /// Creates the two pipes and the lock file backing a brand new pool. Must
    /// be called exactly once, before any worker is spawned.
    pub fn create(lock_path: impl Into<std::path::PathBuf>) -> Result<Self> {
        let (task_read, task_write) = pipe().map_err(|e| Error::ChannelIo(e.into()))?;
        let (event_read, event_write) = pipe().map_err(|e| Error::ChannelIo(e.into()))?;
        let lock = LockFile::create(lock_path).map_err(Error::ChannelIo)?;

        Ok(Self {
            inner: ChannelHandle {
                read: Pipe::from_owned(event_read),
                write: Pipe::from_owned(task_write),
                lock,
            },
            _task_read_for_children: task_read,
            _event_write_for_children: event_write,
        })
    }

    /// Environment variables a child must inherit to reconstruct a
    /// [`WorkerEndpoint`] after `exec`.
    pub fn child_env(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                ENV_TASK_READ_FD,
                self._task_read_for_children.as_raw_fd().to_string(),
            ),
            (
                ENV_EVENT_WRITE_FD,
                self._event_write_for_children.as_raw_fd().to_string(),
            ),
            (
                ENV_LOCK_PATH,
                self.inner.lock.path().to_string_lossy().into_owned(),
            ),
        ]
    }

    pub fn dispatch(&mut self, task_id: u64, payload: procpool_core::Payload) -> Result<()> {
        self.inner.send(&Message::NewTask { task_id, payload })
    }

    pub fn poll_events(&self, timeout: Option<Duration>) -> Result<bool> {
        self.inner.poll(timeout)
    }

    pub fn recv_event(&mut self) -> Result<Message> {
        self.inner.recv()
    }

    pub fn lock(&self) -> Result<LockGuard> {
        self.inner.lock()
    }
}

/// A worker process's view of the channel, reconstructed from inherited fd
/// numbers after `exec`. See [`PoolEndpoint::child_env`].
pub struct WorkerEndpoint {
    inner: ChannelHandle,
}

impl WorkerEndpoint {
    /// Reconstructs the channel from the environment variables set by the
    /// coordinator before spawning this process. Returns `None` if this
    /// process was not launched as a procpool worker.
    pub fn from_env() -> Option<Self> {
        let task_read_fd: RawFd = std::env::var(ENV_TASK_READ_FD).ok()?.parse().ok()?;
        let event_write_fd: RawFd = std::env::var(ENV_EVENT_WRITE_FD).ok()?.parse().ok()?;
        let lock_path = std::env::var(ENV_LOCK_PATH).ok()?;

        // Safety: these fd numbers were set by `PoolEndpoint::child_env` and
        // are guaranteed open and inherited across `exec` for this process.
        let read = unsafe { Pipe::from_raw(task_read_fd) };
        let write = unsafe { Pipe::from_raw(event_write_fd) };
        let lock = LockFile::open(lock_path).ok()?;

        Some(Self {
            inner: ChannelHandle { read, write, lock },
        })
    }

    pub fn poll_tasks(&self, timeout: Option<Duration>) -> Result<bool> {
        self.inner.poll(timeout)
    }

    pub fn recv_task(&mut self) -> Result<Message> {
        self.inner.recv()
    }

    pub fn send_event(&mut self, message: &Message) -> Result<()> {
        self.inner.send(message)
    }

    pub fn lock(&self) -> Result<LockGuard> {
        self.inner.lock()
    }
}
