// SPDX-License-Identifier: MIT

//! File-based mutex over the worktree state file (spec.md §4.3, §8 lock
//! liveness, §9 "a file lock with stale detection is adequate").

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};
use thiserror::Error;

use crate::env;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out acquiring lock at {0}")]
    Timeout(PathBuf),
    #[error("I/O error acquiring lock: {0}")]
    Io(#[from] std::io::Error),
}

/// A held lock on `<state>.lock`. Dropping it (or calling [`StateLock::release`])
/// deletes the lock file.
pub struct StateLock {
    path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Spin with backoff up to `env::lock_timeout()`, creating the lock file
    /// exclusively. A lock whose mtime is older than `env::lock_stale_after()`
    /// is considered abandoned by a crashed holder and removed.
    pub fn acquire(state_path: &Path) -> Result<Self, LockError> {
        let lock_path = lock_path_for(state_path);
        let deadline = Instant::now() + env::lock_timeout();
        let backoff = env::lock_backoff();

        loop {
            match try_create_exclusive(&lock_path) {
                Ok(()) => {
                    return Ok(StateLock {
                        path: lock_path,
                        released: false,
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(&lock_path) {
                        let _ = std::fs::remove_file(&lock_path);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(LockError::Timeout(lock_path));
                    }
                    std::thread::sleep(backoff);
                }
                Err(e) => return Err(LockError::Io(e)),
            }
        }
    }

    pub fn release(mut self) {
        self.do_release();
    }

    fn do_release(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
            self.released = true;
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        self.do_release();
    }
}

fn lock_path_for(state_path: &Path) -> PathBuf {
    let mut p = state_path.as_os_str().to_owned();
    p.push(".lock");
    PathBuf::from(p)
}

fn try_create_exclusive(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    let pid = std::process::id();
    let _ = write!(file, "{pid}");
    Ok(())
}

fn is_stale(path: &Path) -> bool {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return false,
    };
    let modified = match meta.modified() {
        Ok(m) => m,
        Err(_) => return false,
    };
    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or_default();
    age > env::lock_stale_after()
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
