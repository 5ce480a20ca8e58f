//! Read-only commands: `list`, `status` and `validate`.

use std::path::Path;

use colored::Colorize;
use graft_core::{ArchiveValidator, PluginManifest, PluginRecord};

use super::{display_name, open_manager};
use crate::error::Result;

/// Handle `graft list [--all] [--json]`
pub fn run_list(config: &Path, all: bool, json: bool) -> Result<()> {
    let manager = open_manager(config)?;
    let records = manager.registry().list(all);

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("{} No plugins installed", "=>".blue().bold());
        return Ok(());
    }

    println!("{}", "Installed plugins".bold());
    for record in records {
        print_record(record);
    }
    Ok(())
}

fn print_record(record: &PluginRecord) {
    let state = if record.enabled {
        format!("enabled #{}", record.order).green()
    } else {
        "disabled".dimmed()
    };
    println!(
        "  {} {} [{}]",
        record.name.cyan(),
        record.version.as_deref().unwrap_or("?"),
        state
    );
    if let Some(description) = &record.description {
        println!("    {}", description.dimmed());
    }
    if !record.compatible {
        println!(
            "    {} {}",
            "incompatible:".red(),
            record.compatibility_description
        );
    }
    if !record.dependencies.is_empty() {
        let deps: Vec<&str> = record.dependencies.iter().map(String::as_str).collect();
        println!("    {} {}", "requires:".dimmed(), deps.join(", ").yellow());
    }
}

/// Handle `graft status`
pub fn run_status(config: &Path) -> Result<()> {
    let manager = open_manager(config)?;
    let settings = manager.settings();
    let ledger = manager.deployed()?;

    println!("{} Graft status", "=>".blue().bold());
    println!("   {} {}", "Host version:".dimmed(), settings.host_version);
    println!("   {} {}", "Host dir:".dimmed(), settings.host_dir.display());
    println!(
        "   {} {}",
        "Plugin dir:".dimmed(),
        manager.registry().plugin_root().display()
    );

    let enabled = manager.registry().enabled_names();
    if enabled.is_empty() {
        println!("   {} none", "Enabled:".dimmed());
    } else {
        println!("   {} {}", "Enabled:".dimmed(), enabled.join(", ").green());
    }

    match ledger.deployed_at {
        Some(at) => println!(
            "   {} {} files at {}",
            "Deployed:".dimmed(),
            ledger.files.len(),
            at.to_rfc3339()
        ),
        None => println!("   {} nothing", "Deployed:".dimmed()),
    }
    Ok(())
}

/// Handle `graft validate <archive>`
///
/// Needs no settings: the archive is checked and its manifest printed.
pub fn run_validate(archive: &Path) -> Result<()> {
    let name = display_name(archive);
    ArchiveValidator::validate(archive, &name)?;
    let manifest = PluginManifest::from_archive(archive)?;

    println!(
        "{} Archive '{}' is valid: plugin '{}' v{}",
        "=>".blue().bold(),
        name,
        manifest.name().cyan(),
        manifest.plugin.version
    );
    if let Some(host) = manifest.host_requirement() {
        println!("   {} {}", "Host:".dimmed(), host);
    }
    if !manifest.plugin.dependencies.is_empty() {
        println!(
            "   {} {}",
            "Requires:".dimmed(),
            manifest.plugin.dependencies.join(", ").yellow()
        );
    }
    Ok(())
}
