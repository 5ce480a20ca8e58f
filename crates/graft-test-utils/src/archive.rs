//! Plugin manifest and archive builders.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

/// Render a `plugin.toml` for `name` at `version`.
///
/// `host` becomes `[compatibility] host = ...` when given.
pub fn manifest_toml(name: &str, version: &str, dependencies: &[&str], host: Option<&str>) -> String {
    let deps = dependencies
        .iter()
        .map(|d| format!("\"{d}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let mut manifest = format!(
        "[plugin]\nname = \"{name}\"\nversion = \"{version}\"\ndescription = \"The {name} plugin\"\ndependencies = [{deps}]\n"
    );
    if let Some(host) = host {
        manifest.push_str(&format!("\n[compatibility]\nhost = \"{host}\"\n"));
    }
    manifest
}

/// Builds a zip archive entry by entry.
///
/// # Example
///
/// ```rust,no_run
/// use graft_test_utils::{PluginArchive, manifest_toml};
///
/// let path = PluginArchive::new()
///     .entry("blog/plugin.toml", manifest_toml("blog", "1.0.0", &[], None))
///     .entry("blog/static/blog.css", "body {}")
///     .write_to(std::path::Path::new("/tmp/blog.zip"));
/// ```
#[derive(Debug, Default, Clone)]
pub struct PluginArchive {
    entries: Vec<(String, Option<Vec<u8>>)>,
}

impl PluginArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// A well-formed archive: `<name>/plugin.toml` plus `files` below
    /// `<name>/`.
    pub fn plugin(name: &str, version: &str, dependencies: &[&str], files: &[(&str, &str)]) -> Self {
        let mut archive =
            Self::new().entry(&format!("{name}/plugin.toml"), manifest_toml(name, version, dependencies, None));
        for (path, content) in files {
            archive = archive.entry(&format!("{name}/{path}"), *content);
        }
        archive
    }

    /// Add a file entry with the exact archive path `name`.
    pub fn entry(mut self, name: &str, content: impl AsRef<[u8]>) -> Self {
        self.entries.push((name.to_string(), Some(content.as_ref().to_vec())));
        self
    }

    /// Add an explicit directory entry.
    pub fn directory(mut self, name: &str) -> Self {
        self.entries.push((name.to_string(), None));
        self
    }

    /// Write the archive to `path`, creating parent directories.
    ///
    /// # Panics
    /// Panics if any write fails.
    pub fn write_to(&self, path: &Path) -> PathBuf {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let file = File::create(path)
            .unwrap_or_else(|e| panic!("PluginArchive: cannot create {}: {e}", path.display()));
        let mut zip = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, content) in &self.entries {
            match content {
                Some(bytes) => {
                    zip.start_file(name.as_str(), options).unwrap();
                    zip.write_all(bytes).unwrap();
                }
                None => zip.add_directory(name.as_str(), options).unwrap(),
            }
        }
        zip.finish().unwrap();
        path.to_path_buf()
    }
}
