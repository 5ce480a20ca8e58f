//! Plugin archive validation and staged extraction.
//!
//! A plugin archive is a zip file with exactly one top-level folder, and
//! the manifest directly inside that folder (`<root>/plugin.toml`). The
//! validator inspects the archive read-only; nothing is extracted until it
//! has passed.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};

use zip::ZipArchive;

use crate::MANIFEST_FILENAME;
use crate::error::{Error, Result};
use crate::manifest::validate_name;

const STAGING_PREFIX: &str = ".graft-staging-";
const REPLACED_PREFIX: &str = ".graft-replaced-";

pub(crate) fn open(path: &Path, display_name: &str) -> Result<ZipArchive<BufReader<File>>> {
    let file = File::open(path).map_err(|e| corrupt(display_name, e))?;
    ZipArchive::new(BufReader::new(file)).map_err(|e| corrupt(display_name, e))
}

pub(crate) fn corrupt(display_name: &str, reason: impl std::fmt::Display) -> Error {
    Error::CorruptArchive {
        archive: display_name.to_string(),
        reason: reason.to_string(),
    }
}

/// Canonical form of a raw zip entry name: `/` separated segments with
/// `.` and `..` resolved. A trailing `/` marking a directory entry is
/// kept. Returns `None` for names that leave the archive.
pub(crate) fn normalized_name(raw: &str) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();
    for component in Path::new(raw).components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_str()?),
            Component::CurDir => {}
            Component::ParentDir => {
                segments.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    let mut name = segments.join("/");
    if raw.ends_with('/') && !name.is_empty() {
        name.push('/');
    }
    Some(name)
}

/// Whether a normalized entry name is `<root>/plugin.toml`.
pub(crate) fn is_root_manifest(name: &str) -> bool {
    let mut segments = name.split('/');
    matches!(
        (segments.next(), segments.next(), segments.next()),
        (Some(root), Some(file), None) if !root.is_empty() && file == MANIFEST_FILENAME
    )
}

/// Gate run on every uploaded archive before extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveValidator;

impl ArchiveValidator {
    /// Validate the archive at `archive_path`.
    ///
    /// Checks run in order and stop at the first failure:
    ///
    /// 1. the archive opens and every entry reads back with a valid CRC and
    ///    a name that stays inside the archive ([`Error::CorruptArchive`]);
    /// 2. an entry `<root>/plugin.toml` exists ([`Error::MissingManifest`]);
    /// 3. all entries share a single top-level folder
    ///    ([`Error::MultipleRootsOrFlatLayout`]).
    ///
    /// `display_name` is the name the archive is reported under, usually the
    /// uploaded filename rather than its temporary path.
    pub fn validate(archive_path: &Path, display_name: &str) -> Result<()> {
        let names = Self::entry_names(archive_path, display_name)?;

        if !names.iter().any(|name| is_root_manifest(name)) {
            return Err(Error::MissingManifest {
                archive: display_name.to_string(),
            });
        }

        let roots = top_level_names(&names);
        if roots.len() != 1 {
            return Err(Error::MultipleRootsOrFlatLayout {
                archive: display_name.to_string(),
                roots: roots.into_iter().collect(),
            });
        }

        tracing::debug!(archive = display_name, entries = names.len(), "archive validated");
        Ok(())
    }

    /// Open the archive and read every entry through, returning the
    /// normalized names.
    fn entry_names(archive_path: &Path, display_name: &str) -> Result<Vec<String>> {
        let mut zip = open(archive_path, display_name)?;
        let mut names = Vec::with_capacity(zip.len());

        for index in 0..zip.len() {
            let mut entry = zip
                .by_index(index)
                .map_err(|e| corrupt(display_name, e))?;
            let raw = entry.name().to_string();

            let Some(name) = normalized_name(&raw) else {
                return Err(corrupt(
                    display_name,
                    format!("entry '{raw}' points outside the archive"),
                ));
            };

            // Reading to the end is what triggers the CRC check.
            io::copy(&mut entry, &mut io::sink())
                .map_err(|e| corrupt(display_name, format!("entry '{raw}': {e}")))?;

            if !name.is_empty() {
                names.push(name);
            }
        }

        Ok(names)
    }
}

/// Distinct first path segments across all entry names.
pub fn top_level_names(names: &[String]) -> BTreeSet<String> {
    names
        .iter()
        .filter_map(|name| name.split('/').next())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extract a validated archive into `<plugin_root>/<name>`.
///
/// The archive's single root folder is unpacked into a hidden staging
/// directory under `plugin_root` and then renamed into place, so a failed
/// extraction never leaves a partial plugin tree behind. An existing
/// directory of the same name is moved aside first and restored if the
/// final rename fails; on success it is deleted.
pub fn extract_staged(
    archive_path: &Path,
    display_name: &str,
    plugin_root: &Path,
    name: &str,
) -> Result<PathBuf> {
    validate_name(name)?;
    fs::create_dir_all(plugin_root).map_err(|e| Error::fs(plugin_root, e))?;

    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(plugin_root)
        .map_err(|e| Error::fs(plugin_root, e))?;
    let staged_tree = staging.path().join(name);
    fs::create_dir(&staged_tree).map_err(|e| Error::fs(&staged_tree, e))?;

    unpack_root(archive_path, display_name, &staged_tree)?;

    let destination = plugin_root.join(name);
    let displaced = if destination.exists() {
        let aside = tempfile::Builder::new()
            .prefix(REPLACED_PREFIX)
            .tempdir_in(plugin_root)
            .map_err(|e| Error::fs(plugin_root, e))?;
        fs::rename(&destination, aside.path().join(name))
            .map_err(|e| Error::fs(&destination, e))?;
        tracing::debug!(plugin = name, "moved previous version aside");
        Some(aside)
    } else {
        None
    };

    if let Err(e) = fs::rename(&staged_tree, &destination) {
        if let Some(aside) = &displaced {
            if let Err(restore) = fs::rename(aside.path().join(name), &destination) {
                tracing::error!(plugin = name, "failed to restore previous version: {restore}");
            }
        }
        return Err(Error::fs(&destination, e));
    }

    // Dropping the aside directory deletes the previous version.
    drop(displaced);
    tracing::info!(plugin = name, path = %destination.display(), "archive extracted");
    Ok(destination)
}

/// Unpack every entry below the archive's root folder into `target`.
fn unpack_root(archive_path: &Path, display_name: &str, target: &Path) -> Result<()> {
    let mut zip = open(archive_path, display_name)?;

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| corrupt(display_name, e))?;
        let Some(name) = normalized_name(entry.name()) else {
            return Err(corrupt(
                display_name,
                format!("entry '{}' points outside the archive", entry.name()),
            ));
        };

        let relative: PathBuf = name.split('/').skip(1).filter(|s| !s.is_empty()).collect();
        if relative.as_os_str().is_empty() {
            continue;
        }
        let out_path = target.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| Error::fs(&out_path, e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::fs(parent, e))?;
        }
        let mut out = File::create(&out_path).map_err(|e| Error::fs(&out_path, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| Error::fs(&out_path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let mode = (mode & 0o777) | 0o600;
                fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))
                    .map_err(|e| Error::fs(&out_path, e))?;
            }
        }
    }

    Ok(())
}
