use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Exclusive advisory lock on `crewgrid/.lock`, held while a batch is
/// read, applied and written back.
///
/// The lock file itself stays on disk; only the flock matters. Deleting it on
/// release would let a waiter lock an unlinked inode while a third process
/// creates a fresh file.
#[derive(Debug)]
pub struct WriteLock {
    file: File,
    path: PathBuf,
}

/// Error type for lock operations
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not open lock file {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} is held by another cg process (waited {waited_ms} ms)")]
    Timeout { path: PathBuf, waited_ms: u128 },
}

const MAX_BACKOFF: Duration = Duration::from_millis(50);

impl WriteLock {
    /// Take the lock if it is free, without waiting
    pub fn try_acquire(data_dir: &Path) -> Result<Option<Self>, LockError> {
        let path = data_dir.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::Open {
                path: path.clone(),
                source,
            })?;
        if flock(&file, true) {
            Ok(Some(WriteLock { file, path }))
        } else {
            Ok(None)
        }
    }

    /// Wait up to `timeout` for the lock, backing off between attempts
    pub fn acquire(data_dir: &Path, timeout: Duration) -> Result<Self, LockError> {
        let start = Instant::now();
        let mut backoff = Duration::from_millis(2);
        loop {
            if let Some(lock) = Self::try_acquire(data_dir)? {
                return Ok(lock);
            }
            let waited = start.elapsed();
            if waited >= timeout {
                tracing::warn!(dir = %data_dir.display(), "timed out waiting for write lock");
                return Err(LockError::Timeout {
                    path: data_dir.join(".lock"),
                    waited_ms: waited.as_millis(),
                });
            }
            std::thread::sleep(backoff.min(timeout - waited));
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    /// Acquire with the default timeout (5 seconds)
    pub fn acquire_default(data_dir: &Path) -> Result<Self, LockError> {
        Self::acquire(data_dir, Duration::from_secs(5))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        flock(&self.file, false);
    }
}

/// Lock (`exclusive = true`, non-blocking) or unlock. Returns false when the
/// lock is held elsewhere.
#[cfg(unix)]
fn flock(file: &File, exclusive: bool) -> bool {
    use std::os::unix::io::AsRawFd;
    let op = if exclusive {
        libc::LOCK_EX | libc::LOCK_NB
    } else {
        libc::LOCK_UN
    };
    // SAFETY: the fd is owned by `file` and open for the duration of the call
    unsafe { libc::flock(file.as_raw_fd(), op) == 0 }
}

#[cfg(not(unix))]
fn flock(_file: &File, _exclusive: bool) -> bool {
    true
}
