//! Mutating commands: `install`, `enable`, `disable`, `remove` and `deploy`.

use std::path::Path;

use colored::Colorize;

use super::{display_name, open_manager};
use crate::error::{CliError, Result};

/// Handle `graft install <archive>`
pub fn run_install(config: &Path, archive: &Path) -> Result<()> {
    if !archive.is_file() {
        return Err(CliError::user(format!(
            "Archive '{}' does not exist",
            archive.display()
        )));
    }

    let mut manager = open_manager(config)?;
    let name = manager.install(archive, &display_name(archive))?;
    let enabled = manager.registry().is_enabled(&name);

    println!("{} Installed plugin '{}'", "=>".blue().bold(), name.cyan());
    if !enabled {
        println!(
            "   {} Run {} to activate it",
            "Next:".dimmed(),
            format!("graft enable {name}").bold()
        );
    }
    Ok(())
}

/// Handle `graft enable <name>`
pub fn run_enable(config: &Path, name: &str) -> Result<()> {
    let mut manager = open_manager(config)?;
    if manager.registry().get(name).is_none() {
        println!("{} No plugin named '{}'; nothing to do", "=>".blue().bold(), name);
        return Ok(());
    }

    manager.enable(name)?;
    let order = manager.registry().get(name).map(|r| r.order).unwrap_or_default();
    println!(
        "{} Enabled plugin '{}' (order {})",
        "=>".blue().bold(),
        name.cyan(),
        order
    );
    Ok(())
}

/// Handle `graft disable <name>`
pub fn run_disable(config: &Path, name: &str) -> Result<()> {
    let mut manager = open_manager(config)?;
    let before = manager.registry().enabled_names();

    manager.disable(name)?;

    let after = manager.registry().enabled_names();
    let dropped: Vec<&String> = before.iter().filter(|n| !after.contains(n)).collect();
    if dropped.is_empty() {
        println!("{} Plugin '{}' is not enabled; nothing to do", "=>".blue().bold(), name);
        return Ok(());
    }

    println!("{} Disabled plugin '{}'", "=>".blue().bold(), name.cyan());
    for other in dropped.into_iter().filter(|n| n.as_str() != name) {
        println!(
            "   {} '{}' (depends on a disabled plugin)",
            "Also disabled:".yellow(),
            other
        );
    }
    Ok(())
}

/// Handle `graft remove <name>`
pub fn run_remove(config: &Path, name: &str) -> Result<()> {
    let mut manager = open_manager(config)?;
    manager.remove(name)?;
    println!("{} Removed plugin '{}'", "=>".blue().bold(), name.cyan());
    Ok(())
}

/// Handle `graft deploy [--clean] [--no-init]`
pub fn run_deploy(config: &Path, clean: bool, init_controllers: bool) -> Result<()> {
    let mut manager = open_manager(config)?;
    let report = manager.deploy(clean, init_controllers)?;

    println!(
        "{} Deployed {} plugin(s), {} file(s) written",
        "=>".blue().bold(),
        report.plugins.len(),
        report.written
    );
    if report.removed > 0 {
        println!(
            "   {} {} removed, {} host file(s) restored",
            "Cleaned:".dimmed(),
            report.removed,
            report.restored
        );
    }
    Ok(())
}
