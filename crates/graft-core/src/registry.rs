//! The authoritative collection of plugin records.
//!
//! The registry is reconciled from two sources on [`Registry::load`]: the
//! backing JSON file and the plugin directory. Every structural change ends
//! with [`Registry::save`], which heals dependency violations before
//! writing the full record list back to disk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use graft_fs::{ConfigStore, RobustnessConfig, tree};

use crate::error::{Error, Result};
use crate::hooks::PluginHooks;
use crate::manifest::PluginManifest;
use crate::record::PluginRecord;
use crate::resolver;
use crate::settings::Settings;

/// Owned store of [`PluginRecord`]s.
///
/// Constructed once at startup and passed to every operation. Record order
/// is insertion order, which breaks ties between equal `order` values.
#[derive(Debug, Clone)]
pub struct Registry {
    plugin_root: PathBuf,
    registry_file: PathBuf,
    host_version: semver::Version,
    store: ConfigStore,
    records: Vec<PluginRecord>,
}

impl Registry {
    /// Create an empty registry backed by `registry_file`.
    pub fn new(
        plugin_root: impl Into<PathBuf>,
        registry_file: impl Into<PathBuf>,
        host_version: semver::Version,
    ) -> Self {
        Self {
            plugin_root: plugin_root.into(),
            registry_file: registry_file.into(),
            host_version,
            store: ConfigStore::new(),
            records: Vec::new(),
        }
    }

    /// Create an empty registry from host settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            settings.plugin_root(),
            settings.registry_file(),
            settings.host_version()?,
        )
        .with_robustness(settings.robustness()))
    }

    /// Override lock timeout and fsync behaviour.
    pub fn with_robustness(mut self, robustness: RobustnessConfig) -> Self {
        self.store = ConfigStore::with_robustness(robustness);
        self
    }

    /// Directory holding one subdirectory per plugin.
    pub fn plugin_root(&self) -> &Path {
        &self.plugin_root
    }

    /// The backing registry file.
    pub fn registry_file(&self) -> &Path {
        &self.registry_file
    }

    /// The host version records are checked against.
    pub fn host_version(&self) -> &semver::Version {
        &self.host_version
    }

    /// Populate the registry from the backing file and the plugin directory.
    ///
    /// Persisted entries whose directory no longer exists are dropped.
    /// Every untracked plugin directory gets a default record. A missing or
    /// unparseable backing file counts as empty. Once populated, `hooks`
    /// sees every enabled plugin in enabled order.
    pub fn load(&mut self, hooks: &dyn PluginHooks) -> Result<()> {
        let mut known: HashSet<String> = self.records.iter().map(|r| r.name.clone()).collect();

        for record in self.read_persisted()? {
            if known.contains(&record.name) {
                continue;
            }
            if !record.exists(&self.plugin_root) {
                tracing::info!(plugin = %record.name, "dropping registry entry without a directory");
                continue;
            }
            known.insert(record.name.clone());
            self.records.push(record);
        }

        for name in tree::list_subdirectories(&self.plugin_root)? {
            if known.insert(name.clone()) {
                tracing::info!(plugin = %name, "found untracked plugin directory");
                self.records.push(PluginRecord::new(name));
            }
        }

        self.refresh_metadata();

        for name in self.enabled_names() {
            if let Some(record) = self.get(&name) {
                hooks.on_load(record);
            }
        }

        tracing::debug!(
            plugins = self.records.len(),
            enabled = self.enabled_names().len(),
            "registry loaded"
        );
        Ok(())
    }

    fn read_persisted(&self) -> Result<Vec<PluginRecord>> {
        let raw: Option<serde_json::Value> = match self.store.load_locked(&self.registry_file) {
            Ok(raw) => raw,
            Err(graft_fs::Error::ConfigParse { message, .. }) => {
                tracing::warn!(
                    file = %self.registry_file.display(),
                    "ignoring unparseable registry file: {message}"
                );
                None
            }
            Err(e) => return Err(Error::Persistence(e)),
        };

        let entries = match raw {
            Some(serde_json::Value::Array(entries)) => entries,
            Some(_) => {
                tracing::warn!(
                    file = %self.registry_file.display(),
                    "registry file is not a list; ignoring it"
                );
                return Ok(Vec::new());
            }
            None => return Ok(Vec::new()),
        };

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<PluginRecord>(entry) {
                Ok(record) if crate::manifest::validate_name(&record.name).is_ok() => {
                    records.push(record)
                }
                Ok(record) => {
                    tracing::warn!(plugin = %record.name, "skipping registry entry with invalid name")
                }
                Err(e) => tracing::warn!("skipping malformed registry entry: {e}"),
            }
        }
        Ok(records)
    }

    /// Re-read every plugin's manifest and update derived fields.
    ///
    /// Records whose manifest cannot be read keep their persisted values.
    pub fn refresh_metadata(&mut self) {
        for record in &mut self.records {
            match PluginManifest::from_dir(&record.dir(&self.plugin_root)) {
                Ok(manifest) => record.apply_manifest(&manifest, &self.host_version),
                Err(e) => tracing::warn!(plugin = %record.name, "cannot read manifest: {e}"),
            }
        }
    }

    /// Look up a record by name.
    pub fn get(&self, name: &str) -> Option<&PluginRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Look up a record by name for in-place mutation.
    ///
    /// Callers are responsible for calling [`Registry::save`] afterwards.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut PluginRecord> {
        self.records.iter_mut().find(|r| r.name == name)
    }

    /// All records, optionally without hidden ones.
    pub fn list(&self, include_hidden: bool) -> Vec<&PluginRecord> {
        self.records
            .iter()
            .filter(|r| include_hidden || !r.hidden)
            .collect()
    }

    /// Names of enabled records, ascending by `order`.
    ///
    /// The sort is stable, so equal orders keep insertion order.
    pub fn enabled_names(&self) -> Vec<String> {
        let mut enabled: Vec<&PluginRecord> = self.records.iter().filter(|r| r.enabled).collect();
        enabled.sort_by_key(|r| r.order);
        enabled.into_iter().map(|r| r.name.clone()).collect()
    }

    /// Whether a record named `name` exists and is enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.get(name).is_some_and(|r| r.enabled)
    }

    /// Highest `order` across all records, or 0 when empty.
    pub fn max_order(&self) -> i64 {
        self.records.iter().map(|r| r.order).max().unwrap_or(0)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the registry has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert `record`, replacing any record with the same name in place,
    /// then persist.
    pub fn add(&mut self, record: PluginRecord) -> Result<()> {
        self.insert(record);
        self.save()
    }

    /// Remove the record named `name`, then persist.
    ///
    /// Returns the removed record, or `None` (without saving) if unknown.
    pub fn remove_by_name(&mut self, name: &str) -> Result<Option<PluginRecord>> {
        let Some(position) = self.records.iter().position(|r| r.name == name) else {
            return Ok(None);
        };
        let removed = self.records.remove(position);
        self.save()?;
        Ok(Some(removed))
    }

    pub(crate) fn insert(&mut self, record: PluginRecord) {
        match self.records.iter_mut().find(|r| r.name == record.name) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    /// Heal dependency violations, then write every record to the backing
    /// file, fully replacing it.
    pub fn save(&mut self) -> Result<()> {
        let healed = resolver::heal(&mut self.records);
        if !healed.is_empty() {
            tracing::info!(disabled = ?healed, "self-healing pass disabled plugins");
        }

        self.store
            .save(&self.registry_file, &self.records)
            .map_err(Error::Persistence)?;

        tracing::debug!(file = %self.registry_file.display(), "registry saved");
        Ok(())
    }

    /// Copy of the current records, for rolling back a failed operation.
    pub(crate) fn snapshot(&self) -> Vec<PluginRecord> {
        self.records.clone()
    }

    /// Replace the current records with a snapshot.
    pub(crate) fn restore(&mut self, snapshot: Vec<PluginRecord>) {
        self.records = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::NoopHooks;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> Registry {
        Registry::new(
            dir.path().join("installed"),
            dir.path().join("registry.json"),
            semver::Version::new(2, 0, 0),
        )
    }

    #[test]
    fn enabled_names_sorted_by_order() {
        let dir = TempDir::new().unwrap();
        let mut reg = registry(&dir);
        reg.insert(PluginRecord::new("a").enabled_at(5));
        reg.insert(PluginRecord::new("b").enabled_at(1));
        reg.insert(PluginRecord::new("c").enabled_at(3));
        reg.insert(PluginRecord::new("d"));

        assert_eq!(reg.enabled_names(), vec!["b", "c", "a"]);
    }

    #[test]
    fn enabled_names_ties_keep_insertion_order() {
        let dir = TempDir::new().unwrap();
        let mut reg = registry(&dir);
        reg.insert(PluginRecord::new("second").enabled_at(1));
        reg.insert(PluginRecord::new("first").enabled_at(1));

        assert_eq!(reg.enabled_names(), vec!["second", "first"]);
    }

    #[test]
    fn max_order_of_empty_registry_is_zero() {
        let dir = TempDir::new().unwrap();
        assert_eq!(registry(&dir).max_order(), 0);
    }

    #[test]
    fn insert_replaces_same_name_in_place() {
        let dir = TempDir::new().unwrap();
        let mut reg = registry(&dir);
        reg.insert(PluginRecord::new("a"));
        reg.insert(PluginRecord::new("b"));
        reg.insert(PluginRecord::new("a").enabled_at(7));

        assert_eq!(reg.len(), 2);
        assert_eq!(reg.list(true)[0].order, 7);
    }

    #[test]
    fn list_filters_hidden() {
        let dir = TempDir::new().unwrap();
        let mut reg = registry(&dir);
        let mut hidden = PluginRecord::new("internal");
        hidden.hidden = true;
        reg.insert(hidden);
        reg.insert(PluginRecord::new("blog"));

        assert_eq!(reg.list(false).len(), 1);
        assert_eq!(reg.list(true).len(), 2);
    }

    #[test]
    fn save_writes_pretty_json_array() {
        let dir = TempDir::new().unwrap();
        let mut reg = registry(&dir);
        reg.add(PluginRecord::new("blog").enabled_at(1)).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("registry.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed[0]["name"], "blog");
        assert_eq!(parsed[0]["enabled"], true);
        assert!(raw.contains('\n'), "registry should be pretty-printed");
    }

    #[test]
    fn unparseable_file_loads_as_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("registry.json"), "{{{").unwrap();
        std::fs::create_dir_all(dir.path().join("installed")).unwrap();

        let mut reg = registry(&dir);
        reg.load(&NoopHooks).unwrap();
        assert!(reg.is_empty());
    }

    #[test]
    fn malformed_entries_are_skipped_individually() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("installed/blog")).unwrap();
        std::fs::write(
            dir.path().join("registry.json"),
            r#"[{"enabled": true}, {"name": "blog", "enabled": true, "order": 2}]"#,
        )
        .unwrap();

        let mut reg = registry(&dir);
        reg.load(&NoopHooks).unwrap();

        assert_eq!(reg.enabled_names(), vec!["blog"]);
    }

    #[test]
    fn load_calls_on_load_in_enabled_order() {
        struct Recorder(RefCell<Vec<String>>);
        impl PluginHooks for Recorder {
            fn on_load(&self, record: &PluginRecord) {
                self.0.borrow_mut().push(record.name.clone());
            }
        }

        let dir = TempDir::new().unwrap();
        for name in ["a", "b", "c"] {
            std::fs::create_dir_all(dir.path().join("installed").join(name)).unwrap();
        }
        std::fs::write(
            dir.path().join("registry.json"),
            r#"[
                {"name": "a", "enabled": true, "order": 9},
                {"name": "b", "enabled": false, "order": 1},
                {"name": "c", "enabled": true, "order": 2}
            ]"#,
        )
        .unwrap();

        let recorder = Recorder(RefCell::new(Vec::new()));
        let mut reg = registry(&dir);
        reg.load(&recorder).unwrap();

        assert_eq!(*recorder.0.borrow(), vec!["c", "a"]);
    }

    #[test]
    fn remove_unknown_returns_none() {
        let dir = TempDir::new().unwrap();
        let mut reg = registry(&dir);
        assert!(reg.remove_by_name("ghost").unwrap().is_none());
        assert!(!dir.path().join("registry.json").exists());
    }
}
