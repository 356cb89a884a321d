use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};

/// A `flock`-backed mutex shared across process boundaries.
///
/// `flock(2)` locks are associated with the *open file description*, not the
/// path, so independent opens of the same file by unrelated processes still
/// contend on the same lock. That means every worker can simply re-open
/// `path` and acquire the lock by path, without needing the original fd to be
/// inherited across `exec` the way the channel pipes do (§4.1).
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    pub fn create(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        // Touch the file so every subsequent open (including from worker
        // processes) resolves to the same inode.
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        Ok(Self { path })
    }

    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        Ok(Self { path: path.into() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocks until the exclusive lock is acquired, returning a guard that
    /// releases it on drop.
    pub fn lock(&self) -> std::io::Result<LockGuard> {
        let file = OpenOptions::new().write(true).open(&self.path)?;
        let flock = Flock::lock(file, FlockArg::LockExclusive)
            .map_err(|(_file, errno)| std::io::Error::from(errno))?;
        Ok(LockGuard { _flock: flock })
    }
}

pub struct LockGuard {
    _flock: Flock<File>,
}
