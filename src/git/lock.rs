//! git::lock
//!
//! Exclusive OS-level lock on the working tree.
//!
//! # Architecture
//!
//! Two backend processes may be pointed at the same clone. The in-process
//! mutex around [`Git`](super::Git) cannot see the other process, so every
//! repository mutation also holds an `fs2` exclusive lock on
//! `<git_dir>/gitstate/lock`.
//!
//! # Invariants
//!
//! - The lock is held for the whole commit-and-push sequence
//! - The lock is released on drop (RAII)
//! - [`WorktreeLock::acquire`] blocks; it runs on the blocking thread pool
//!
//! # Example
//!
//! ```
//! use gitstate::core::paths::RepoPaths;
//! use gitstate::git::WorktreeLock;
//!
//! let dir = tempfile::TempDir::new().unwrap();
//! let paths = RepoPaths::new(dir.path().to_path_buf());
//!
//! let lock = WorktreeLock::acquire(&paths).unwrap();
//! assert!(lock.is_held());
//! assert!(WorktreeLock::try_acquire(&paths).unwrap().is_none());
//! drop(lock);
//! assert!(WorktreeLock::try_acquire(&paths).unwrap().is_some());
//! ```

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

use crate::core::paths::RepoPaths;

/// Errors from the worktree lock.
#[derive(Debug, Error)]
pub enum WorktreeLockError {
    /// Failed to create the lock file or its directory.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to take the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),

    /// Failed to release the OS lock.
    #[error("failed to release lock: {0}")]
    ReleaseFailed(String),
}

/// An exclusive lock on the working tree, released on drop.
#[derive(Debug)]
pub struct WorktreeLock {
    path: PathBuf,
    file: Option<File>,
}

impl WorktreeLock {
    /// Take the lock, waiting for other processes to release it.
    pub fn acquire(paths: &RepoPaths) -> Result<Self, WorktreeLockError> {
        let (path, file) = open_lock_file(paths)?;
        file.lock_exclusive()
            .map_err(|e| WorktreeLockError::AcquireFailed(e.to_string()))?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// Take the lock if it is free, returning `None` if another holder has it.
    pub fn try_acquire(paths: &RepoPaths) -> Result<Option<Self>, WorktreeLockError> {
        let (path, file) = open_lock_file(paths)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                path,
                file: Some(file),
            })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(WorktreeLockError::AcquireFailed(e.to_string())),
        }
    }

    /// Whether this guard still holds the lock.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock before the guard is dropped.
    pub fn release(&mut self) -> Result<(), WorktreeLockError> {
        if let Some(file) = self.file.take() {
            file.unlock()
                .map_err(|e| WorktreeLockError::ReleaseFailed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for WorktreeLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}

fn open_lock_file(paths: &RepoPaths) -> Result<(PathBuf, File), WorktreeLockError> {
    let dir = paths.private_dir();
    fs::create_dir_all(&dir).map_err(|e| {
        WorktreeLockError::CreateFailed(format!("cannot create {}: {}", dir.display(), e))
    })?;

    let path = paths.lock_path();
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .map_err(|e| {
            WorktreeLockError::CreateFailed(format!("cannot open {}: {}", path.display(), e))
        })?;
    Ok((path, file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_paths(dir: &Path) -> RepoPaths {
        RepoPaths::new(dir.to_path_buf())
    }

    #[test]
    fn acquire_creates_private_dir() {
        let temp = TempDir::new().unwrap();
        let paths = test_paths(temp.path());
        assert!(!paths.private_dir().exists());

        let lock = WorktreeLock::acquire(&paths).expect("acquire");
        assert!(lock.is_held());
        assert_eq!(lock.path(), paths.lock_path());
        assert!(paths.private_dir().exists());
    }

    #[test]
    fn second_try_acquire_is_refused() {
        let temp = TempDir::new().unwrap();
        let paths = test_paths(temp.path());

        let _lock = WorktreeLock::acquire(&paths).expect("acquire");
        assert!(WorktreeLock::try_acquire(&paths).expect("try").is_none());
    }

    #[test]
    fn released_on_drop() {
        let temp = TempDir::new().unwrap();
        let paths = test_paths(temp.path());

        {
            let _lock = WorktreeLock::acquire(&paths).expect("acquire");
        }
        assert!(WorktreeLock::try_acquire(&paths).expect("try").is_some());
    }

    #[test]
    fn explicit_release_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let paths = test_paths(temp.path());

        let mut lock = WorktreeLock::acquire(&paths).expect("acquire");
        lock.release().expect("first release");
        lock.release().expect("second release");
        assert!(!lock.is_held());
        assert!(WorktreeLock::try_acquire(&paths).expect("try").is_some());
    }

    #[test]
    fn blocking_acquire_waits_for_release() {
        let temp = TempDir::new().unwrap();
        let paths = test_paths(temp.path());
        let lock = WorktreeLock::acquire(&paths).expect("acquire");

        let waiter_paths = paths.clone();
        let waiter = std::thread::spawn(move || {
            WorktreeLock::acquire(&waiter_paths)
                .map(|l| l.is_held())
                .unwrap_or(false)
        });

        std::thread::sleep(std::time::Duration::from_millis(50));
        drop(lock);
        assert!(waiter.join().unwrap());
    }
}
