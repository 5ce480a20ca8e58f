//! Overlaying enabled plugins onto the host tree.
//!
//! A deploy merges an ordered list of [`OverlayLayer`]s into an
//! [`OverlayPlan`], where later (higher priority) layers win path
//! conflicts. The plan is copied into a hidden staging directory inside
//! the host tree first; only when every file is staged does the
//! [`Deployer`] touch the host files themselves. Everything it writes is
//! recorded in a [`DeployLedger`] so that a later clean can remove exactly
//! those files and put back any host originals they shadowed.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use graft_fs::{ConfigStore, RobustnessConfig, checksum, tree};
use serde::{Deserialize, Serialize};

use crate::MANIFEST_FILENAME;
use crate::error::{Error, Result};
use crate::settings::Settings;

const STAGING_PREFIX: &str = ".graft-deploy-";
const STAGED_DIR: &str = "staged";
const DISPLACED_DIR: &str = "displaced";
const RETRACTED_DIR: &str = "retracted";

/// One plugin tree to overlay onto the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayLayer {
    /// Plugin that owns the files.
    pub plugin: String,
    /// Root of the plugin's directory tree.
    pub source: PathBuf,
    /// Higher priorities are applied later and win conflicts.
    pub priority: i64,
}

impl OverlayLayer {
    pub fn new(plugin: impl Into<String>, source: impl Into<PathBuf>, priority: i64) -> Self {
        Self {
            plugin: plugin.into(),
            source: source.into(),
            priority,
        }
    }
}

/// Where a planned file comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub plugin: String,
    pub source: PathBuf,
}

/// The merged result of a set of layers: one source per host path.
#[derive(Debug, Clone, Default)]
pub struct OverlayPlan {
    plugins: Vec<String>,
    files: BTreeMap<PathBuf, PlannedFile>,
}

impl OverlayPlan {
    /// Merge `layers` by ascending priority.
    ///
    /// Layers with equal priority keep their relative order. Each layer's
    /// top-level manifest is never overlaid.
    pub fn merge(layers: &[OverlayLayer]) -> Result<Self> {
        let mut ordered: Vec<&OverlayLayer> = layers.iter().collect();
        ordered.sort_by_key(|layer| layer.priority);

        let mut plan = Self::default();
        for layer in ordered {
            for relative in tree::walk_files(&layer.source)? {
                if relative == Path::new(MANIFEST_FILENAME) {
                    continue;
                }
                let planned = PlannedFile {
                    plugin: layer.plugin.clone(),
                    source: layer.source.join(&relative),
                };
                if let Some(previous) = plan.files.insert(relative.clone(), planned) {
                    tracing::debug!(
                        path = %relative.display(),
                        winner = %layer.plugin,
                        shadowed = %previous.plugin,
                        "overlay conflict"
                    );
                }
            }
            plan.plugins.push(layer.plugin.clone());
        }
        Ok(plan)
    }

    /// Plugins in the order their layers were applied.
    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    /// Planned files, sorted by host-relative path.
    pub fn files(&self) -> impl Iterator<Item = (&Path, &PlannedFile)> {
        self.files.iter().map(|(path, file)| (path.as_path(), file))
    }

    /// The plugin whose file ends up at `path`.
    pub fn owner(&self, path: &Path) -> Option<&str> {
        self.files.get(path).map(|file| file.plugin.as_str())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// A file written into the host tree by a deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedFile {
    /// Path relative to the host directory.
    pub path: PathBuf,
    pub plugin: String,
    /// `sha256:<hex>` of the content as deployed.
    pub checksum: String,
    /// Whether a host original was moved to the backup directory.
    #[serde(default)]
    pub backed_up: bool,
}

/// Persistent record of what deploys have written into the host tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployLedger {
    #[serde(default)]
    pub files: Vec<DeployedFile>,
    /// Directories created by deploys, relative to the host directory.
    #[serde(default)]
    pub directories: Vec<PathBuf>,
    #[serde(default)]
    pub deployed_at: Option<DateTime<Utc>>,
}

impl DeployLedger {
    pub fn entry(&self, path: &Path) -> Option<&DeployedFile> {
        self.files.iter().find(|file| file.path == path)
    }

    /// Plugins with at least one deployed file.
    pub fn plugins(&self) -> BTreeSet<&str> {
        self.files.iter().map(|file| file.plugin.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }
}

/// Summary of a deploy or clean.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployReport {
    /// Plugins overlaid, lowest priority first.
    pub plugins: Vec<String>,
    /// Files written into the host tree.
    pub written: usize,
    /// Previously deployed files removed by cleaning.
    pub removed: usize,
    /// Host originals restored from backup by cleaning.
    pub restored: usize,
}

struct StagedFile {
    relative: PathBuf,
    plugin: String,
    checksum: String,
}

/// A previously deployed file taken out of the host tree by a clean deploy.
struct RetractStep {
    relative: PathBuf,
    /// Where the deployed file was moved inside the staging area.
    aside: Option<PathBuf>,
    /// Whether the host original was copied back from the backup.
    restored: bool,
}

/// A file written into the host tree by this run.
struct CommitStep {
    relative: PathBuf,
    displaced: Option<PathBuf>,
    backed_up: bool,
}

/// Everything a deploy changed in the host tree, in order, so it can be
/// undone.
#[derive(Default)]
struct Commit {
    retracted: Vec<RetractStep>,
    steps: Vec<CommitStep>,
    created_dirs: Vec<PathBuf>,
}

/// Applies overlay layers to the host directory.
#[derive(Debug, Clone)]
pub struct Deployer {
    host_dir: PathBuf,
    ledger_file: PathBuf,
    backup_dir: PathBuf,
    store: ConfigStore,
}

impl Deployer {
    pub fn new(
        host_dir: impl Into<PathBuf>,
        ledger_file: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host_dir: host_dir.into(),
            ledger_file: ledger_file.into(),
            backup_dir: backup_dir.into(),
            store: ConfigStore::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.host_dir.clone(),
            settings.ledger_file(),
            settings.backup_dir(),
        )
        .with_robustness(settings.robustness())
    }

    pub fn with_robustness(mut self, robustness: RobustnessConfig) -> Self {
        self.store = ConfigStore::with_robustness(robustness);
        self
    }

    pub fn host_dir(&self) -> &Path {
        &self.host_dir
    }

    /// Read the ledger. A missing or unparseable ledger is empty.
    pub fn ledger(&self) -> Result<DeployLedger> {
        match self.store.load_locked::<DeployLedger>(&self.ledger_file) {
            Ok(Some(ledger)) => Ok(ledger),
            Ok(None) => Ok(DeployLedger::default()),
            Err(graft_fs::Error::ConfigParse { message, .. }) => {
                tracing::warn!(
                    file = %self.ledger_file.display(),
                    "ignoring unparseable deployment ledger: {message}"
                );
                Ok(DeployLedger::default())
            }
            Err(e) => Err(Error::Persistence(e)),
        }
    }

    fn save_ledger(&self, ledger: &DeployLedger) -> Result<()> {
        self.store
            .save(&self.ledger_file, ledger)
            .map_err(Error::Persistence)
    }

    /// Remove every deployed file and restore the host originals they
    /// shadowed.
    ///
    /// Entries are dropped one at a time as they are undone, so a failure
    /// part way leaves a ledger describing only what is still deployed.
    pub fn clean(&self) -> Result<DeployReport> {
        let mut ledger = self.ledger()?;
        let mut report = DeployReport::default();

        let undone = self.undo_ledger(&mut ledger, &mut report);
        self.save_ledger(&ledger)?;
        undone?;

        tracing::info!(
            removed = report.removed,
            restored = report.restored,
            "cleaned deployed files"
        );
        Ok(report)
    }

    fn undo_ledger(&self, ledger: &mut DeployLedger, report: &mut DeployReport) -> Result<()> {
        while let Some(entry) = ledger.files.last() {
            self.undeploy_file(entry, report)?;
            ledger.files.pop();
        }

        let directories = std::mem::take(&mut ledger.directories);
        ledger.directories = self.prune_directories(directories);
        ledger.deployed_at = None;
        Ok(())
    }

    fn undeploy_file(&self, entry: &DeployedFile, report: &mut DeployReport) -> Result<()> {
        let target = self.host_dir.join(&entry.path);
        self.warn_if_modified(entry, &target);
        tree::remove_file(&target)?;
        report.removed += 1;

        if entry.backed_up {
            let backup = self.backup_dir.join(&entry.path);
            if backup.is_file() {
                tree::copy_file(&backup, &target)?;
                tree::remove_file(&backup)?;
                report.restored += 1;
            } else {
                tracing::warn!(path = %entry.path.display(), "backup of host file is missing");
            }
        }
        Ok(())
    }

    fn warn_if_modified(&self, entry: &DeployedFile, target: &Path) {
        if !target.is_file() {
            return;
        }
        match checksum::compute_file_checksum(target) {
            Ok(current) if current != entry.checksum => tracing::warn!(
                path = %entry.path.display(),
                plugin = %entry.plugin,
                "removing deployed file modified since deploy"
            ),
            Ok(_) => {}
            Err(e) => tracing::debug!(path = %entry.path.display(), "cannot checksum: {e}"),
        }
    }

    /// Remove the empty ones among `directories`, deepest first. Returns
    /// the directories that were kept.
    fn prune_directories(&self, mut directories: Vec<PathBuf>) -> Vec<PathBuf> {
        directories.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));
        directories
            .into_iter()
            .filter(|dir| match tree::remove_dir_if_empty(&self.host_dir.join(dir)) {
                Ok(removed) => !removed && self.host_dir.join(dir).is_dir(),
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), "could not prune directory: {e}");
                    true
                }
            })
            .collect()
    }

    /// Overlay `layers` onto the host directory.
    ///
    /// With `clean`, files from earlier deploys are taken out first;
    /// without it they stay unless a layer overwrites them. Staging
    /// failures leave the host tree untouched. Any later failure puts back
    /// every file this run moved, removed or wrote, and the ledger on disk
    /// is only replaced once the host tree is complete.
    pub fn deploy(&self, layers: &[OverlayLayer], clean: bool) -> Result<DeployReport> {
        let plan = OverlayPlan::merge(layers)?;

        fs::create_dir_all(&self.host_dir).map_err(|e| Error::fs(&self.host_dir, e))?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.host_dir)
            .map_err(|e| Error::fs(&self.host_dir, e))?;
        let staged = stage(&plan, staging.path())?;
        tracing::debug!(files = staged.len(), "staged overlay");

        let previous = self.ledger()?;
        let mut report = DeployReport {
            plugins: plan.plugins().to_vec(),
            ..DeployReport::default()
        };
        let mut commit = Commit::default();

        let base = if clean {
            if let Err(e) = self.retract(&previous, staging.path(), &mut commit, &mut report) {
                tracing::warn!("clean failed, rolling back: {e}");
                self.rollback(&commit);
                return Err(e);
            }
            DeployLedger::default()
        } else {
            previous.clone()
        };

        if let Err(e) = self.commit(&staged, staging.path(), &base, &mut commit) {
            self.rollback(&commit);
            return Err(e);
        }

        let kept_dirs = if clean {
            self.prune_directories(previous.directories.clone())
        } else {
            Vec::new()
        };
        let updated = merge_ledger(base, &staged, &commit, kept_dirs);
        if let Err(e) = self.save_ledger(&updated) {
            self.rollback(&commit);
            return Err(e);
        }
        self.discard_backups(&commit, &updated);

        report.written = staged.len();
        tracing::info!(
            plugins = report.plugins.len(),
            written = report.written,
            removed = report.removed,
            "deployed plugins"
        );
        Ok(report)
    }

    /// Move every file of `ledger` out of the host tree into the staging
    /// area and copy shadowed host originals back into place.
    fn retract(
        &self,
        ledger: &DeployLedger,
        staging_root: &Path,
        commit: &mut Commit,
        report: &mut DeployReport,
    ) -> Result<()> {
        for entry in &ledger.files {
            let target = self.host_dir.join(&entry.path);
            let mut step = RetractStep {
                relative: entry.path.clone(),
                aside: None,
                restored: false,
            };

            if fs::symlink_metadata(&target).is_ok() {
                self.warn_if_modified(entry, &target);
                let aside = staging_root.join(RETRACTED_DIR).join(&entry.path);
                tree::move_file(&target, &aside)?;
                step.aside = Some(aside);
                report.removed += 1;
            }
            commit.retracted.push(step);

            if entry.backed_up {
                let backup = self.backup_dir.join(&entry.path);
                if !backup.is_file() {
                    tracing::warn!(path = %entry.path.display(), "backup of host file is missing");
                    continue;
                }
                tree::copy_file(&backup, &target)?;
                if let Some(step) = commit.retracted.last_mut() {
                    step.restored = true;
                }
                report.restored += 1;
            }
        }
        Ok(())
    }

    fn commit(
        &self,
        staged: &[StagedFile],
        staging_root: &Path,
        ledger: &DeployLedger,
        commit: &mut Commit,
    ) -> Result<()> {
        for file in staged {
            if let Err(e) = self.commit_file(file, staging_root, ledger, commit) {
                tracing::warn!(path = %file.relative.display(), "deploy failed, rolling back: {e}");
                return Err(e);
            }
        }
        Ok(())
    }

    fn commit_file(
        &self,
        file: &StagedFile,
        staging_root: &Path,
        ledger: &DeployLedger,
        commit: &mut Commit,
    ) -> Result<()> {
        let target = self.host_dir.join(&file.relative);
        if let Some(parent) = file.relative.parent() {
            commit
                .created_dirs
                .extend(tree::create_dirs_recording(&self.host_dir, parent)?);
        }

        let mut step = CommitStep {
            relative: file.relative.clone(),
            displaced: None,
            backed_up: false,
        };
        if fs::symlink_metadata(&target).is_ok() {
            if ledger.entry(&file.relative).is_some() {
                let aside = staging_root.join(DISPLACED_DIR).join(&file.relative);
                tree::move_file(&target, &aside)?;
                step.displaced = Some(aside);
            } else {
                tree::copy_file(&target, &self.backup_dir.join(&file.relative))?;
                step.backed_up = true;
            }
        }

        let source = staging_root.join(STAGED_DIR).join(&file.relative);
        let renamed = fs::rename(&source, &target);
        commit.steps.push(step);
        renamed.map_err(|e| Error::fs(&target, e))
    }

    /// Best-effort undo of a partial deploy. Failures are logged.
    fn rollback(&self, commit: &Commit) {
        for step in commit.steps.iter().rev() {
            let target = self.host_dir.join(&step.relative);
            if let Err(e) = tree::remove_file(&target) {
                tracing::error!(path = %step.relative.display(), "rollback failed: {e}");
                continue;
            }
            let restored = match (&step.displaced, step.backed_up) {
                (Some(aside), _) => tree::move_file(aside, &target),
                (None, true) => {
                    let backup = self.backup_dir.join(&step.relative);
                    tree::copy_file(&backup, &target).and_then(|_| tree::remove_file(&backup))
                }
                (None, false) => Ok(()),
            };
            if let Err(e) = restored {
                tracing::error!(path = %step.relative.display(), "rollback failed: {e}");
            }
        }

        for dir in commit.created_dirs.iter().rev() {
            if let Err(e) = tree::remove_dir_if_empty(&self.host_dir.join(dir)) {
                tracing::warn!(dir = %dir.display(), "could not prune directory: {e}");
            }
        }

        // The host original sits at the target again; it goes back to the
        // backup and the retracted file returns on top of it.
        for step in commit.retracted.iter().rev() {
            let target = self.host_dir.join(&step.relative);
            let backup = self.backup_dir.join(&step.relative);
            let mut undone = Ok(());
            if step.restored {
                undone = tree::copy_file(&target, &backup).and_then(|_| tree::remove_file(&target));
            }
            if let Some(aside) = &step.aside {
                undone = undone.and_then(|()| tree::move_file(aside, &target));
            }
            if let Err(e) = undone {
                tracing::error!(path = %step.relative.display(), "rollback failed: {e}");
            }
        }
    }

    /// Delete backups of originals that a clean deploy put back for good.
    fn discard_backups(&self, commit: &Commit, ledger: &DeployLedger) {
        for step in commit.retracted.iter().filter(|step| step.restored) {
            if ledger.entry(&step.relative).is_some_and(|file| file.backed_up) {
                continue;
            }
            if let Err(e) = tree::remove_file(&self.backup_dir.join(&step.relative)) {
                tracing::warn!(path = %step.relative.display(), "could not discard backup: {e}");
            }
        }
    }
}

fn stage(plan: &OverlayPlan, staging_root: &Path) -> Result<Vec<StagedFile>> {
    let root = staging_root.join(STAGED_DIR);
    plan.files()
        .map(|(relative, planned)| -> Result<StagedFile> {
            let staged = root.join(relative);
            tree::copy_file(&planned.source, &staged)?;
            Ok(StagedFile {
                relative: relative.to_path_buf(),
                plugin: planned.plugin.clone(),
                checksum: checksum::compute_file_checksum(&staged)?,
            })
        })
        .collect()
}

fn merge_ledger(
    base: DeployLedger,
    staged: &[StagedFile],
    commit: &Commit,
    kept_dirs: Vec<PathBuf>,
) -> DeployLedger {
    let mut files: BTreeMap<PathBuf, DeployedFile> = base
        .files
        .into_iter()
        .map(|file| (file.path.clone(), file))
        .collect();

    for (file, step) in staged.iter().zip(&commit.steps) {
        let backed_up =
            step.backed_up || files.get(&file.relative).is_some_and(|old| old.backed_up);
        files.insert(
            file.relative.clone(),
            DeployedFile {
                path: file.relative.clone(),
                plugin: file.plugin.clone(),
                checksum: file.checksum.clone(),
                backed_up,
            },
        );
    }

    let mut directories: BTreeSet<PathBuf> = base.directories.into_iter().collect();
    directories.extend(kept_dirs);
    directories.extend(commit.created_dirs.iter().cloned());

    DeployLedger {
        files: files.into_values().collect(),
        directories: directories.into_iter().collect(),
        deployed_at: Some(Utc::now()),
    }
}
