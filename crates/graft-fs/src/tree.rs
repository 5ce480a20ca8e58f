//! Directory tree helpers used by extraction and deployment.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::{Error, Result};

/// List every regular file under `root`, as paths relative to `root`.
///
/// The result is sorted so callers get a deterministic order. Symlinks to
/// files are included; symlinks to directories are not followed.
pub fn walk_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            Error::io(path, e.into())
        })?;
        let path = entry.path();
        let file_type = entry.file_type();

        let is_file = if file_type.is_symlink() {
            match fs::metadata(path) {
                Ok(meta) => meta.is_file(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "dangling symlink: {e}");
                    false
                }
            }
        } else {
            file_type.is_file()
        };
        if !is_file {
            continue;
        }

        if let Ok(relative) = path.strip_prefix(root) {
            files.push(relative.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// Names of the immediate subdirectories of `root`, sorted.
///
/// Hidden entries (leading `.`) are skipped; they are reserved for staging
/// areas. A missing `root` yields an empty list.
pub fn list_subdirectories(root: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(root, e)),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(root, e))?;
        let Ok(name) = entry.file_name().into_string() else {
            tracing::warn!(path = %entry.path().display(), "skipping non UTF-8 directory name");
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if entry.path().is_dir() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Create `relative` (a directory path) under `root`, returning the
/// directories that did not exist before, shallowest first.
pub fn create_dirs_recording(root: &Path, relative: &Path) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();
    let mut current = PathBuf::new();
    for component in relative.components() {
        current.push(component);
        let absolute = root.join(&current);
        if absolute.is_dir() {
            continue;
        }
        match fs::create_dir(&absolute) {
            Ok(()) => created.push(current.clone()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(Error::io(&absolute, e)),
        }
    }
    Ok(created)
}

/// Copy a single file, creating parent directories of `dst` as needed.
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    fs::copy(src, dst).map_err(|e| Error::io(src, e))
}

/// Move a file with `rename`, creating parent directories of `dst`.
pub fn move_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    fs::rename(src, dst).map_err(|e| Error::io(dst, e))
}

/// Remove a directory tree. A missing path is not an error.
pub fn remove_tree(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Remove a file. A missing path is not an error.
pub fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Remove `path` if it is an empty directory. Returns whether it was removed.
pub fn remove_dir_if_empty(path: &Path) -> Result<bool> {
    let mut entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(Error::io(path, e)),
    };
    if entries.next().is_some() {
        return Ok(false);
    }
    fs::remove_dir(path).map_err(|e| Error::io(path, e))?;
    Ok(true)
}
