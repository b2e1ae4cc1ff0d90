use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// What a lock file guards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    /// Writes to a file store
    Store,
    /// A paste in flight; never waited on
    Paste,
}

impl LockKind {
    fn file_name(self) -> &'static str {
        match self {
            LockKind::Store => ".lock",
            LockKind::Paste => ".paste.lock",
        }
    }
}

/// Advisory flock held for as long as the value lives. Separate `pb`
/// processes take it before touching the same directory.
pub struct FileLock {
    _file: File,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not open lock file {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} is held by another pb process")]
    Busy { path: PathBuf },
}

impl FileLock {
    /// Take the `kind` lock in `dir`, retrying until `timeout` has passed.
    /// A zero timeout makes exactly one attempt.
    pub fn acquire(dir: &Path, kind: LockKind, timeout: Duration) -> Result<Self, LockError> {
        let path = dir.join(kind.file_name());
        // The file stays on disk: unlinking it would let a waiter lock an
        // orphaned inode while a newcomer locks a fresh one.
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::Open {
                path: path.clone(),
                source,
            })?;

        let deadline = Instant::now() + timeout;
        while !try_lock(&file) {
            if Instant::now() >= deadline {
                tracing::debug!(path = %path.display(), "lock busy");
                return Err(LockError::Busy { path });
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok(FileLock { _file: file })
    }

    /// The store write lock with the usual 5 second wait
    pub fn store(dir: &Path) -> Result<Self, LockError> {
        Self::acquire(dir, LockKind::Store, Duration::from_secs(5))
    }

    /// The paste guard; fails at once when another paste holds it
    pub fn paste(dir: &Path) -> Result<Self, LockError> {
        Self::acquire(dir, LockKind::Paste, Duration::ZERO)
    }
}

#[cfg(unix)]
fn try_lock(file: &File) -> bool {
    use std::os::unix::io::AsRawFd;
    // Released by the kernel when the descriptor closes
    unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) == 0 }
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> bool {
    true
}
