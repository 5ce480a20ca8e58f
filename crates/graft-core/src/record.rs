//! The persisted state of a single plugin.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::compat::Compatibility;
use crate::manifest::PluginManifest;

fn default_true() -> bool {
    true
}

/// One plugin as known to the [`Registry`](crate::Registry).
///
/// `name`, `enabled`, `order`, `hidden` and the post flags are state owned
/// by the registry. `version`, `description`, `dependencies` and the
/// compatibility fields are derived from the plugin's manifest and
/// refreshed whenever the manifest is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRecord {
    /// Unique name; also the plugin's directory name.
    pub name: String,
    /// Whether the plugin's files are overlaid onto the host.
    #[serde(default)]
    pub enabled: bool,
    /// Activation sequence. Higher orders deploy later and win conflicts.
    #[serde(default)]
    pub order: i64,
    /// Version from the manifest.
    #[serde(default)]
    pub version: Option<String>,
    /// Description from the manifest.
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the plugin may be activated on the running host.
    #[serde(default = "default_true")]
    pub compatible: bool,
    /// Explanation of the compatibility verdict.
    #[serde(default)]
    pub compatibility_description: String,
    /// Excluded from default listings.
    #[serde(default)]
    pub hidden: bool,
    /// Plugins that must be enabled for this one to be enabled.
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    /// Set on enable; consumed by the next controller initialization.
    #[serde(default)]
    pub post_enable: bool,
    /// Set on disable; consumed by the next controller initialization.
    #[serde(default)]
    pub post_disable: bool,
}

impl PluginRecord {
    /// A disabled record with default attributes, as created for an
    /// untracked plugin directory.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: false,
            order: 0,
            version: None,
            description: None,
            compatible: true,
            compatibility_description: String::new(),
            hidden: false,
            dependencies: BTreeSet::new(),
            post_enable: false,
            post_disable: false,
        }
    }

    /// Build a record from a manifest, evaluated against `host`.
    pub fn from_manifest(manifest: &PluginManifest, host: &semver::Version) -> Self {
        let mut record = Self::new(manifest.name());
        record.apply_manifest(manifest, host);
        record.hidden = manifest.plugin.hidden;
        record
    }

    /// Refresh the manifest-derived fields.
    pub fn apply_manifest(&mut self, manifest: &PluginManifest, host: &semver::Version) {
        let verdict = Compatibility::check(manifest, host);
        self.version = Some(manifest.plugin.version.clone());
        self.description = manifest.plugin.description.clone();
        self.dependencies = manifest.plugin.dependencies.iter().cloned().collect();
        self.compatible = verdict.compatible;
        self.compatibility_description = verdict.description;
    }

    /// Builder-style helper setting the dependency set.
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Builder-style helper marking the record enabled at `order`.
    pub fn enabled_at(mut self, order: i64) -> Self {
        self.enabled = true;
        self.order = order;
        self
    }

    /// Whether the plugin's directory exists under `plugin_root`.
    pub fn exists(&self, plugin_root: &Path) -> bool {
        plugin_root.join(&self.name).is_dir()
    }

    /// Directory holding the plugin's files.
    pub fn dir(&self, plugin_root: &Path) -> std::path::PathBuf {
        plugin_root.join(&self.name)
    }
}
