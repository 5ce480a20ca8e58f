//! Graft CLI
//!
//! Command-line front end for installing, enabling and deploying plugins.

mod cli;
mod commands;
mod error;
mod hooks;
mod logging;

use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands};
use error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("{}: {}", "warning".yellow().bold(), e);
    }
    tracing::debug!(config = %cli.config.display(), "starting");

    execute_command(&cli, cli.command.clone())
}

fn execute_command(cli: &Cli, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::List { all, json } => commands::run_list(&cli.config, all, json),
        Commands::Status => commands::run_status(&cli.config),
        Commands::Validate { archive } => commands::run_validate(&archive),
        Commands::Install { archive } => commands::run_install(&cli.config, &archive),
        Commands::Enable { name } => commands::run_enable(&cli.config, &name),
        Commands::Disable { name } => commands::run_disable(&cli.config, &name),
        Commands::Remove { name } => commands::run_remove(&cli.config, &name),
        Commands::Deploy { clean, no_init } => commands::run_deploy(&cli.config, clean, !no_init),
    }
}
