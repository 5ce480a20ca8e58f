//! [`TestHost`]: an isolated host tree and data directory.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::archive::{PluginArchive, manifest_toml};

/// A temporary directory laid out as `host/`, `data/` and `archives/`.
///
/// Paths mirror the defaults of the plugin manager: installed plugins live
/// in `data/plugins/installed`.
pub struct TestHost {
    temp_dir: TempDir,
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHost {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("host")).unwrap();
        fs::create_dir_all(temp_dir.path().join("data")).unwrap();
        Self { temp_dir }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn host_dir(&self) -> PathBuf {
        self.root().join("host")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root().join("data")
    }

    pub fn plugin_root(&self) -> PathBuf {
        self.data_dir().join("plugins").join("installed")
    }

    pub fn registry_file(&self) -> PathBuf {
        self.data_dir().join("plugins").join("registry.json")
    }

    /// Write `archive` as `archives/<file_name>` and return its path.
    pub fn archive(&self, file_name: &str, archive: &PluginArchive) -> PathBuf {
        archive.write_to(&self.root().join("archives").join(file_name))
    }

    /// Lay out an installed plugin directory by hand, bypassing install.
    pub fn install_dir(&self, name: &str, dependencies: &[&str], files: &[(&str, &str)]) -> PathBuf {
        let dir = self.plugin_root().join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("plugin.toml"), manifest_toml(name, "1.0.0", dependencies, None)).unwrap();
        for (path, content) in files {
            let target = dir.join(path);
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            fs::write(target, content).unwrap();
        }
        dir
    }

    /// Write a file into the host tree.
    pub fn write_host_file(&self, rel: &str, content: &str) {
        let path = self.host_dir().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Read a file from the host tree, `None` if absent.
    pub fn host_file(&self, rel: &str) -> Option<String> {
        fs::read_to_string(self.host_dir().join(rel)).ok()
    }

    /// Write `graft.toml` at the root for `host_version`, appending `extra`
    /// verbatim. Returns the config path.
    pub fn write_config(&self, host_version: &str, extra: &str) -> PathBuf {
        let path = self.root().join("graft.toml");
        let content = format!(
            "host_version = \"{host_version}\"\nhost_dir = \"host\"\ndata_dir = \"data\"\nlock_timeout_ms = 500\n{extra}"
        );
        fs::write(&path, content).unwrap();
        path
    }

    /// Assert that `rel` exists in the host tree with `expected` content.
    ///
    /// # Panics
    /// Panics with a descriptive message on mismatch.
    pub fn assert_host_file(&self, rel: &str, expected: &str) {
        match self.host_file(rel) {
            Some(actual) => assert_eq!(actual, expected, "host file {rel} has unexpected content"),
            None => panic!("expected host file {rel} to exist"),
        }
    }
}
