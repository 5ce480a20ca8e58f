//! Atomic I/O operations with file locking

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::lock::{FileLock, LockMode};
use crate::{Error, Result};

/// Tuning knobs for locked I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobustnessConfig {
    /// How long to wait for a contended lock before failing.
    pub lock_timeout: Duration,
    /// Whether to fsync the temp file before renaming it into place.
    pub enable_fsync: bool,
}

impl Default for RobustnessConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            enable_fsync: true,
        }
    }
}

/// Write content atomically to a file with locking.
///
/// Uses write-to-temp-then-rename so readers never observe a partial file,
/// and holds an exclusive lock on `<path>.lock` for the duration so
/// concurrent writers are serialized.
pub fn write_atomic(path: &Path, content: &[u8], config: RobustnessConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let _lock = FileLock::acquire(path, LockMode::Exclusive, config.lock_timeout)?;

    // Temp file in the same directory keeps the rename on one filesystem
    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id()
    );
    let temp_path = path.with_file_name(&temp_name);

    let result = (|| {
        let mut temp_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| Error::io(&temp_path, e))?;

        temp_file
            .write_all(content)
            .map_err(|e| Error::io(&temp_path, e))?;

        if config.enable_fsync {
            temp_file.sync_all().map_err(|e| Error::io(&temp_path, e))?;
        }

        fs::rename(&temp_path, path).map_err(|e| Error::io(path, e))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// Read text content from a file.
pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

/// Read text content while holding a shared lock on `<path>.lock`.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn read_text_locked(path: &Path, config: RobustnessConfig) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let _lock = FileLock::acquire(path, LockMode::Shared, config.lock_timeout)?;
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Write text content to a file atomically with default robustness settings.
pub fn write_text(path: &Path, content: &str) -> Result<()> {
    write_atomic(path, content.as_bytes(), RobustnessConfig::default())
}
