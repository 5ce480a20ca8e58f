//! Lifecycle operations: install, enable, disable, remove and deploy.
//!
//! Every operation is synchronous. Failures are logged at this boundary
//! and returned to the caller; none of them abort the process. Mutations
//! of the registry are rolled back in memory when they cannot be
//! persisted.

use std::fs;
use std::path::{Path, PathBuf};

use graft_fs::tree;

use crate::archive::{self, ArchiveValidator};
use crate::compat::Compatibility;
use crate::deploy::{DeployLedger, DeployReport, Deployer, OverlayLayer};
use crate::error::{Error, Result};
use crate::hooks::{NoopHooks, PluginHooks};
use crate::manifest::PluginManifest;
use crate::record::PluginRecord;
use crate::registry::Registry;
use crate::resolver;
use crate::settings::Settings;

const REMOVED_PREFIX: &str = ".graft-removed-";

/// Owns the registry and the deployer for one host.
#[derive(Debug)]
pub struct PluginManager<H: PluginHooks = NoopHooks> {
    settings: Settings,
    registry: Registry,
    deployer: Deployer,
    hooks: H,
}

impl PluginManager<NoopHooks> {
    /// Open the manager for `settings` without host hooks.
    pub fn open(settings: Settings) -> Result<Self> {
        Self::with_hooks(settings, NoopHooks)
    }
}

impl<H: PluginHooks> PluginManager<H> {
    /// Open the manager and load the registry, calling `hooks.on_load` for
    /// every enabled plugin.
    pub fn with_hooks(settings: Settings, hooks: H) -> Result<Self> {
        let mut registry = Registry::from_settings(&settings)?;
        registry.load(&hooks)?;
        let deployer = Deployer::from_settings(&settings);
        Ok(Self {
            settings,
            registry,
            deployer,
            hooks,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Direct access to the registry for callers that manage persistence
    /// themselves.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn deployer(&self) -> &Deployer {
        &self.deployer
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// What the last deploys wrote into the host tree.
    pub fn deployed(&self) -> Result<DeployLedger> {
        self.deployer.ledger()
    }

    /// Validate an archive and return its manifest. Nothing is written.
    pub fn validate(&self, archive_path: &Path, display_name: &str) -> Result<PluginManifest> {
        logged("validate", display_name, validate_archive(archive_path, display_name))
    }

    /// Install a plugin archive, returning the installed plugin's name.
    ///
    /// An installed plugin of the same name is replaced and keeps its
    /// enabled state, order and visibility. Replacing an enabled plugin
    /// triggers a clean redeploy with controller initialization.
    pub fn install(&mut self, archive_path: &Path, display_name: &str) -> Result<String> {
        let result = self.try_install(archive_path, display_name);
        logged("install", display_name, result)
    }

    fn try_install(&mut self, archive_path: &Path, display_name: &str) -> Result<String> {
        if self.settings.disable_install {
            return Err(Error::ConfigurationBlocked {
                operation: "install",
            });
        }

        let manifest = validate_archive(archive_path, display_name)?;
        let host = self.registry.host_version().clone();
        if !Compatibility::check(&manifest, &host).compatible {
            return Err(Error::IncompatiblePlugin {
                name: manifest.name().to_owned(),
                requirement: manifest.host_requirement().unwrap_or_default().to_owned(),
                host: host.to_string(),
            });
        }

        let name = manifest.name().to_owned();
        archive::extract_staged(archive_path, display_name, self.registry.plugin_root(), &name)?;

        let mut record = PluginRecord::from_manifest(&manifest, &host);
        let was_enabled = match self.registry.get(&name) {
            Some(previous) => {
                record.enabled = previous.enabled;
                record.order = previous.order;
                record.hidden = previous.hidden;
                record.post_enable = previous.enabled;
                record.post_disable = previous.post_disable;
                previous.enabled
            }
            None => false,
        };

        let snapshot = self.registry.snapshot();
        self.registry.insert(record);
        self.persist(snapshot)?;
        tracing::info!(plugin = %name, version = %manifest.plugin.version, "plugin installed");

        if was_enabled {
            self.try_deploy(true, true)?;
        }
        Ok(name)
    }

    /// Enable a plugin and deploy it on top of the enabled set.
    ///
    /// Unknown and already enabled plugins are left alone.
    pub fn enable(&mut self, name: &str) -> Result<()> {
        let result = self.try_enable(name);
        logged("enable", name, result)
    }

    fn try_enable(&mut self, name: &str) -> Result<()> {
        let Some(record) = self.registry.get(name) else {
            tracing::debug!(plugin = name, "enable of unknown plugin ignored");
            return Ok(());
        };
        if record.enabled {
            return Ok(());
        }
        if !record.compatible {
            return Err(self.incompatible(record));
        }

        let enabled = self.registry.enabled_names();
        let missing = resolver::missing_dependencies(record, &enabled, true);
        if !missing.is_empty() {
            return Err(Error::DependencyUnsatisfied {
                name: name.to_owned(),
                missing,
            });
        }

        let order = self.registry.max_order() + 1;
        let snapshot = self.registry.snapshot();
        if let Some(record) = self.registry.get_mut(name) {
            record.enabled = true;
            record.order = order;
            record.post_enable = true;
        }
        self.persist(snapshot)?;
        tracing::info!(plugin = name, order, "plugin enabled");

        self.try_deploy(false, true)?;
        Ok(())
    }

    /// Disable a plugin and redeploy the remaining enabled set from clean.
    ///
    /// Plugins depending on it are disabled as well when the registry is
    /// saved. Unknown and already disabled plugins are left alone.
    pub fn disable(&mut self, name: &str) -> Result<()> {
        let result = self.try_disable(name);
        logged("disable", name, result)
    }

    fn try_disable(&mut self, name: &str) -> Result<()> {
        if !self.registry.is_enabled(name) {
            tracing::debug!(plugin = name, "plugin is not enabled");
            return Ok(());
        }

        let snapshot = self.registry.snapshot();
        if let Some(record) = self.registry.get_mut(name) {
            record.enabled = false;
            record.post_disable = true;
        }
        self.persist(snapshot)?;
        tracing::info!(plugin = name, "plugin disabled");

        self.try_deploy(true, true)?;
        Ok(())
    }

    /// Delete a disabled plugin's directory and forget it.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let result = self.try_remove(name);
        logged("remove", name, result)
    }

    fn try_remove(&mut self, name: &str) -> Result<()> {
        if self.settings.disable_remove {
            return Err(Error::ConfigurationBlocked {
                operation: "remove",
            });
        }
        let record = self
            .registry
            .get(name)
            .ok_or_else(|| Error::UnknownPlugin(name.to_owned()))?;
        if record.enabled {
            return Err(Error::PluginEnabled(name.to_owned()));
        }

        let dir = record.dir(self.registry.plugin_root());

        // The directory is only deleted once the registry no longer lists
        // the plugin; until then it waits in a hidden sibling.
        let aside = match fs::symlink_metadata(&dir) {
            Ok(_) => Some(set_aside(&dir, self.registry.plugin_root())?),
            Err(_) => None,
        };

        let snapshot = self.registry.snapshot();
        if let Err(e) = self.registry.remove_by_name(name) {
            self.registry.restore(snapshot);
            if let Some((_, moved)) = &aside {
                if let Err(undo) = fs::rename(moved, &dir) {
                    tracing::error!(plugin = name, "could not restore plugin directory: {undo}");
                }
            }
            return Err(e);
        }

        if let Some((holder, _)) = aside {
            if let Err(e) = tree::remove_tree(holder.path()) {
                tracing::warn!(plugin = name, "could not delete plugin directory: {e}");
            }
        }
        tracing::info!(plugin = name, "plugin removed");
        Ok(())
    }

    /// Overlay every enabled plugin onto the host tree.
    ///
    /// With `clean`, files from earlier deploys are removed first. With
    /// `init_controllers`, each deployed plugin's controller is initialized
    /// and pending post-enable and post-disable hooks are run.
    pub fn deploy(&mut self, clean: bool, init_controllers: bool) -> Result<DeployReport> {
        let result = self.try_deploy(clean, init_controllers);
        logged("deploy", "enabled plugins", result)
    }

    fn try_deploy(&mut self, clean: bool, init_controllers: bool) -> Result<DeployReport> {
        let plugin_root = self.registry.plugin_root();
        let layers: Vec<OverlayLayer> = self
            .registry
            .enabled_names()
            .into_iter()
            .rev()
            .filter_map(|name| self.registry.get(&name))
            .map(|record| OverlayLayer::new(&record.name, record.dir(plugin_root), record.order))
            .collect();

        let report = self.deployer.deploy(&layers, clean)?;
        if init_controllers {
            self.init_controllers(&report)?;
        }
        Ok(report)
    }

    fn init_controllers(&mut self, report: &DeployReport) -> Result<()> {
        for name in &report.plugins {
            if let Some(record) = self.registry.get(name) {
                self.hooks.init_controller(record);
            }
        }

        let pending: Vec<String> = self
            .registry
            .list(true)
            .into_iter()
            .filter(|r| r.post_enable || r.post_disable)
            .map(|r| r.name.clone())
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        let snapshot = self.registry.snapshot();
        for name in &pending {
            let Some(record) = self.registry.get_mut(name) else {
                continue;
            };
            let (post_enable, post_disable) = (record.post_enable, record.post_disable);
            record.post_enable = false;
            record.post_disable = false;

            if post_enable && record.enabled {
                self.hooks.post_enable(record);
            }
            if post_disable {
                self.hooks.post_disable(record);
            }
        }
        self.persist(snapshot)
    }

    fn persist(&mut self, snapshot: Vec<PluginRecord>) -> Result<()> {
        match self.registry.save() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.registry.restore(snapshot);
                Err(e)
            }
        }
    }

    fn incompatible(&self, record: &PluginRecord) -> Error {
        let requirement = PluginManifest::from_dir(&record.dir(self.registry.plugin_root()))
            .ok()
            .and_then(|m| m.host_requirement().map(str::to_owned))
            .unwrap_or_else(|| record.compatibility_description.clone());
        Error::IncompatiblePlugin {
            name: record.name.clone(),
            requirement,
            host: self.registry.host_version().to_string(),
        }
    }
}

fn validate_archive(archive_path: &Path, display_name: &str) -> Result<PluginManifest> {
    ArchiveValidator::validate(archive_path, display_name)?;
    PluginManifest::from_archive(archive_path)
}

/// Move `dir` into a fresh hidden directory under `plugin_root`. Returns
/// the holder and the directory's new path.
fn set_aside(dir: &Path, plugin_root: &Path) -> Result<(tempfile::TempDir, PathBuf)> {
    let holder = tempfile::Builder::new()
        .prefix(REMOVED_PREFIX)
        .tempdir_in(plugin_root)
        .map_err(|e| Error::fs(plugin_root, e))?;
    let moved = holder.path().join("plugin");
    fs::rename(dir, &moved).map_err(|e| Error::fs(dir, e))?;
    Ok((holder, moved))
}

fn logged<T>(operation: &'static str, subject: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        tracing::warn!(operation, subject, "{e}");
    }
    result
}
