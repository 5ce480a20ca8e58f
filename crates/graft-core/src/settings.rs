//! Host configuration for the plugin manager.
//!
//! Settings are read from a TOML (or JSON) file through
//! [`graft_fs::ConfigStore`]. Relative directories are resolved against the
//! settings file's own directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use graft_fs::{ConfigStore, RobustnessConfig};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable that forces `disable_install` on when truthy.
pub const ENV_DISABLE_INSTALL: &str = "GRAFT_DISABLE_INSTALL";
/// Environment variable that forces `disable_remove` on when truthy.
pub const ENV_DISABLE_REMOVE: &str = "GRAFT_DISABLE_REMOVE";

fn default_lock_timeout_ms() -> u64 {
    5_000
}

fn default_fsync() -> bool {
    true
}

/// Plugin manager configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Version of the running host, used for compatibility checks.
    pub host_version: String,
    /// Root of the host application's runtime tree; deploys write here.
    pub host_dir: PathBuf,
    /// Writable data directory; registry and ledger live under `plugins/`.
    pub data_dir: PathBuf,
    /// Where installed plugins live. Defaults to `<data_dir>/plugins/installed`.
    #[serde(default)]
    pub plugin_dir: Option<PathBuf>,
    /// Refuse to install plugins.
    #[serde(default)]
    pub disable_install: bool,
    /// Refuse to remove plugins.
    #[serde(default)]
    pub disable_remove: bool,
    /// How long to wait for registry and ledger locks.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Fsync persisted files before renaming them into place.
    #[serde(default = "default_fsync")]
    pub fsync: bool,
}

impl Settings {
    /// Settings for a host at `host_dir` with data under `data_dir`.
    pub fn new(
        host_version: impl Into<String>,
        host_dir: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host_version: host_version.into(),
            host_dir: host_dir.into(),
            data_dir: data_dir.into(),
            plugin_dir: None,
            disable_install: false,
            disable_remove: false,
            lock_timeout_ms: default_lock_timeout_ms(),
            fsync: default_fsync(),
        }
    }

    /// Load settings from `path`, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings: Self = ConfigStore::new()
            .load(path)
            .map_err(|e| Error::Settings(e.to_string()))?;

        if let Some(base) = path.parent() {
            settings.resolve_relative_to(base);
        }
        settings.apply_env_overrides();
        settings.host_version()?;

        tracing::debug!(config = %path.display(), "settings loaded");
        Ok(settings)
    }

    /// Default data directory for the current user.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("graft")
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let absolutize = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        absolutize(&mut self.host_dir);
        absolutize(&mut self.data_dir);
        if let Some(plugin_dir) = self.plugin_dir.as_mut() {
            absolutize(plugin_dir);
        }
    }

    /// Force feature flags on from the environment.
    pub fn apply_env_overrides(&mut self) {
        if env_flag(ENV_DISABLE_INSTALL) {
            self.disable_install = true;
        }
        if env_flag(ENV_DISABLE_REMOVE) {
            self.disable_remove = true;
        }
    }

    /// The parsed host version.
    pub fn host_version(&self) -> Result<semver::Version> {
        semver::Version::parse(&self.host_version).map_err(|e| Error::InvalidVersion {
            version: self.host_version.clone(),
            source: e,
        })
    }

    /// Directory holding one subdirectory per installed plugin.
    pub fn plugin_root(&self) -> PathBuf {
        self.plugin_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("plugins").join("installed"))
    }

    /// The backing registry file.
    pub fn registry_file(&self) -> PathBuf {
        self.data_dir.join("plugins").join("registry.json")
    }

    /// The deployment ledger file.
    pub fn ledger_file(&self) -> PathBuf {
        self.data_dir.join("plugins").join("deployed.json")
    }

    /// Where host files shadowed by a deploy are kept.
    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("plugins").join("backup")
    }

    /// I/O tuning derived from these settings.
    pub fn robustness(&self) -> RobustnessConfig {
        RobustnessConfig {
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            enable_fsync: self.fsync,
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
