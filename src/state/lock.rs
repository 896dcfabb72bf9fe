//! Cross-process invocation lock using advisory file locking (fs2 flock).
//!
//! Serializes whole invocations (store batch plus state-file publish) so two
//! keyholders logging in at once cannot interleave their writes. The lock file
//! lives beside the database, never inside the watched state directory.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{AcsError, Result};

/// Advisory file lock guarding one store and its state directory.
#[derive(Clone)]
pub struct StateLock {
    path: PathBuf,
}

/// RAII guard that releases the lock on drop.
pub struct StateLockGuard {
    file: File,
}

impl Drop for StateLockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl StateLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocking acquire. Waits until any other invocation is done.
    pub fn acquire(&self) -> Result<StateLockGuard> {
        if let Some(guard) = self.try_acquire()? {
            return Ok(guard);
        }

        debug!(lock = %self.path.display(), "another invocation running, waiting");
        let file = self.open()?;
        file.lock_exclusive()
            .map_err(|e| AcsError::state_write(&self.path, e))?;
        Ok(StateLockGuard { file })
    }

    /// Non-blocking try-acquire. Returns `None` if another process holds it.
    pub fn try_acquire(&self) -> Result<Option<StateLockGuard>> {
        let file = self.open()?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(StateLockGuard { file })),
            Err(ref e) if is_contended(e) => Ok(None),
            Err(e) => Err(AcsError::state_write(&self.path, e)),
        }
    }

    fn open(&self) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.path)
            .map_err(|e| AcsError::state_write(&self.path, e))
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
