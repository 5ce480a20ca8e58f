//! Command implementations for graft-cli

pub mod lifecycle;
pub mod plugins;

use std::path::Path;

use graft_core::{PluginManager, Settings};

use crate::error::Result;
use crate::hooks::TracingHooks;

pub use lifecycle::{run_deploy, run_disable, run_enable, run_install, run_remove};
pub use plugins::{run_list, run_status, run_validate};

/// Load settings from `config` and open the plugin manager.
pub(crate) fn open_manager(config: &Path) -> Result<PluginManager<TracingHooks>> {
    let settings = Settings::load(config)?;
    Ok(PluginManager::with_hooks(settings, TracingHooks)?)
}

/// The name an archive is reported under: its file name.
pub(crate) fn display_name(archive: &Path) -> String {
    archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| archive.display().to_string())
}
