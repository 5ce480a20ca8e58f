//! Advisory lock files.
//!
//! Locks are taken on a sidecar `<file>.lock` rather than on the data file
//! itself, so the data file can be replaced by an atomic rename while the
//! lock is held.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use fs2::FileExt;

use crate::{Error, Result};

/// Path of the sidecar lock file guarding `path`.
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

/// Lock mode requested from [`FileLock::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Many readers may hold the lock at once.
    Shared,
    /// A single writer holds the lock.
    Exclusive,
}

/// A held advisory lock. Released when dropped.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire a lock on the sidecar lock file for `target`.
    ///
    /// Retries with exponential backoff until `timeout` has elapsed, then
    /// gives up with [`Error::LockFailed`].
    pub fn acquire(target: &Path, mode: LockMode, timeout: Duration) -> Result<Self> {
        let path = lock_path_for(target);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(10))
            .with_max_interval(Duration::from_millis(250))
            .with_max_elapsed_time(Some(timeout))
            .build();

        let attempt = || {
            let locked = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };
            locked.map_err(backoff::Error::transient)
        };

        if backoff::retry(policy, attempt).is_err() {
            tracing::warn!(path = %path.display(), ?mode, "timed out waiting for lock");
            return Err(Error::LockFailed {
                path: target.to_path_buf(),
            });
        }

        tracing::trace!(path = %path.display(), ?mode, "lock acquired");
        Ok(Self { file, path })
    }

    /// Path of the lock file itself.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lock_path_appends_suffix() {
        let p = lock_path_for(Path::new("/data/plugins/registry.json"));
        assert_eq!(p, PathBuf::from("/data/plugins/registry.json.lock"));
    }

    #[test]
    fn shared_locks_coexist() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("registry.json");
        let first = FileLock::acquire(&target, LockMode::Shared, Duration::from_millis(200)).unwrap();
        let second =
            FileLock::acquire(&target, LockMode::Shared, Duration::from_millis(200)).unwrap();
        assert_eq!(first.path(), second.path());
    }

    #[test]
    fn exclusive_lock_blocks_second_exclusive() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("registry.json");
        let _held =
            FileLock::acquire(&target, LockMode::Exclusive, Duration::from_millis(200)).unwrap();

        let err = FileLock::acquire(&target, LockMode::Exclusive, Duration::from_millis(100))
            .unwrap_err();
        assert!(matches!(err, Error::LockFailed { .. }));
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("registry.json");
        {
            let _held =
                FileLock::acquire(&target, LockMode::Exclusive, Duration::from_millis(200))
                    .unwrap();
        }
        FileLock::acquire(&target, LockMode::Exclusive, Duration::from_millis(200)).unwrap();
    }
}
