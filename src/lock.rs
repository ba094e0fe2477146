//! Advisory file locking
//!
//! Shared/exclusive flock-based locks keyed by filesystem path. Two
//! processes locking the same path interoperate with no shared memory;
//! the cache and the passwd/group overlay copies rely on this for all
//! cross-process coordination.

use crate::error::{BurrowError, BurrowResult};
use fs4::FileExt;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// Lock acquisition mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Many holders at once; excludes exclusive holders
    Shared,
    /// Sole holder; excludes everyone
    Exclusive,
}

/// A held advisory lock on a path
///
/// Releases on drop. `release()` is idempotent and may be called early.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
    held: bool,
}

/// How long to sleep between polls when acquiring with a timeout
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn open_lock_file(path: &Path) -> BurrowResult<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| BurrowError::io(format!("creating lock directory {}", parent.display()), e))?;
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| BurrowError::Lock {
            path: path.to_path_buf(),
            source: e,
        })
}

impl FileLock {
    /// Acquire a lock, blocking until it is granted
    pub fn acquire(path: &Path, mode: LockMode) -> BurrowResult<Self> {
        let file = open_lock_file(path)?;
        let res = match mode {
            LockMode::Shared => FileExt::lock_shared(&file),
            LockMode::Exclusive => FileExt::lock_exclusive(&file),
        };
        res.map_err(|e| BurrowError::Lock {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!("Acquired {:?} lock on {}", mode, path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
            held: true,
        })
    }

    /// Acquire a lock without blocking; `None` if another holder excludes us
    pub fn try_acquire(path: &Path, mode: LockMode) -> BurrowResult<Option<Self>> {
        let file = open_lock_file(path)?;
        let res = match mode {
            LockMode::Shared => FileExt::try_lock_shared(&file),
            LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
        };
        match res {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
                held: true,
            })),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(BurrowError::Lock {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    /// Acquire a lock, failing with `LockTimeout` rather than blocking forever
    pub fn acquire_timeout(path: &Path, mode: LockMode, timeout: Duration) -> BurrowResult<Self> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(lock) = Self::try_acquire(path, mode)? {
                return Ok(lock);
            }
            if Instant::now() >= deadline {
                return Err(BurrowError::LockTimeout {
                    path: path.to_path_buf(),
                    secs: timeout.as_secs(),
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Switch lock mode on the same handle
    ///
    /// flock has no atomic upgrade: the old mode is dropped before the new
    /// one is taken, so callers must re-validate any state checked under
    /// the old mode after this returns.
    pub fn relock(&mut self, mode: LockMode) -> BurrowResult<()> {
        FileExt::unlock(&self.file).map_err(|e| BurrowError::Lock {
            path: self.path.clone(),
            source: e,
        })?;
        self.held = false;
        let res = match mode {
            LockMode::Shared => FileExt::lock_shared(&self.file),
            LockMode::Exclusive => FileExt::lock_exclusive(&self.file),
        };
        res.map_err(|e| BurrowError::Lock {
            path: self.path.clone(),
            source: e,
        })?;
        self.held = true;
        Ok(())
    }

    /// Release the lock early; safe to call more than once
    pub fn release(&mut self) -> BurrowResult<()> {
        if self.held {
            FileExt::unlock(&self.file).map_err(|e| BurrowError::Lock {
                path: self.path.clone(),
                source: e,
            })?;
            self.held = false;
            debug!("Released lock on {}", self.path.display());
        }
        Ok(())
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn shared_locks_coexist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entry.lock");

        let _a = FileLock::acquire(&path, LockMode::Shared).unwrap();
        let b = FileLock::try_acquire(&path, LockMode::Shared).unwrap();
        assert!(b.is_some());
    }

    #[test]
    fn exclusive_excludes_all() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entry.lock");

        let _a = FileLock::acquire(&path, LockMode::Exclusive).unwrap();
        assert!(FileLock::try_acquire(&path, LockMode::Shared).unwrap().is_none());
        assert!(FileLock::try_acquire(&path, LockMode::Exclusive).unwrap().is_none());
    }

    #[test]
    fn shared_excludes_exclusive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entry.lock");

        let _a = FileLock::acquire(&path, LockMode::Shared).unwrap();
        assert!(FileLock::try_acquire(&path, LockMode::Exclusive).unwrap().is_none());
    }

    #[test]
    fn timeout_errors_instead_of_blocking() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entry.lock");

        let _a = FileLock::acquire(&path, LockMode::Exclusive).unwrap();
        let err = FileLock::acquire_timeout(&path, LockMode::Exclusive, Duration::from_millis(250))
            .unwrap_err();
        assert!(matches!(err, BurrowError::LockTimeout { .. }));
    }

    #[test]
    fn release_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entry.lock");

        let mut lock = FileLock::acquire(&path, LockMode::Exclusive).unwrap();
        lock.release().unwrap();
        lock.release().unwrap();

        // Lock is actually gone: another exclusive holder succeeds
        assert!(FileLock::try_acquire(&path, LockMode::Exclusive).unwrap().is_some());
    }

    #[test]
    fn drop_releases() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entry.lock");

        {
            let _lock = FileLock::acquire(&path, LockMode::Exclusive).unwrap();
        }
        assert!(FileLock::try_acquire(&path, LockMode::Exclusive).unwrap().is_some());
    }

    #[test]
    fn relock_switches_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entry.lock");

        let mut lock = FileLock::acquire(&path, LockMode::Shared).unwrap();
        lock.relock(LockMode::Exclusive).unwrap();
        assert!(FileLock::try_acquire(&path, LockMode::Shared).unwrap().is_none());

        lock.relock(LockMode::Shared).unwrap();
        assert!(FileLock::try_acquire(&path, LockMode::Shared).unwrap().is_some());
    }

    #[test]
    fn creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c/entry.lock");
        let _lock = FileLock::acquire(&path, LockMode::Shared).unwrap();
        assert!(path.exists());
    }
}
