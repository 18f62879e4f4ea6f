//! Host-wide exclusive lock on a lock file.
//!
//! # Platform Behavior
//! - **Linux/macOS**: `flock(LOCK_EX)` via `fs2`
//! - **Windows**: `LockFileEx` via `fs2`
//!
//! The OS drops the lock when the file handle is closed, including when the
//! holding process dies, so a crashed server never blocks its successor.

use crate::error::{ReadyPipeError, Result};
use crate::readiness::InterprocessLock;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive advisory lock on a file.
#[derive(Debug)]
pub struct NamedLock {
    file: File,
    path: PathBuf,
}

impl NamedLock {
    /// Open (creating if needed) the lock file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ReadyPipeError::io_with_path(e, &path))?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl InterprocessLock for NamedLock {
    fn try_lock(&self) -> Result<bool> {
        match self.file.try_lock_exclusive() {
            Ok(()) => Ok(true),
            Err(e) if is_contended(&e) => Ok(false),
            Err(e) => Err(ReadyPipeError::sync("try_lock", e)),
        }
    }

    fn lock(&self) -> Result<()> {
        self.file
            .lock_exclusive()
            .map_err(|e| ReadyPipeError::sync("lock", e))
    }

    fn unlock(&self) -> Result<()> {
        FileExt::unlock(&self.file).map_err(|e| ReadyPipeError::sync("unlock", e))
    }
}
