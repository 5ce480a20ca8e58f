//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Graft - install, enable and deploy plugins for a host application
#[derive(Parser, Debug)]
#[command(name = "graft")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file (TOML or JSON)
    #[arg(long, global = true, env = "GRAFT_CONFIG", default_value = "graft.toml")]
    pub config: PathBuf,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List installed plugins
    List {
        /// Include hidden plugins
        #[arg(long)]
        all: bool,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Show enabled plugins and what is deployed
    Status,

    /// Check a plugin archive without installing it
    Validate {
        /// Path to the zip archive
        archive: PathBuf,
    },

    /// Install (or replace) a plugin from a zip archive
    Install {
        /// Path to the zip archive
        archive: PathBuf,
    },

    /// Enable an installed plugin and deploy it
    Enable {
        /// Plugin name
        name: String,
    },

    /// Disable a plugin and redeploy the rest
    ///
    /// Plugins that depend on it are disabled too.
    Disable {
        /// Plugin name
        name: String,
    },

    /// Delete a disabled plugin
    Remove {
        /// Plugin name
        name: String,
    },

    /// Overlay all enabled plugins onto the host tree
    Deploy {
        /// Remove previously deployed files first
        #[arg(long)]
        clean: bool,

        /// Skip controller initialization and post hooks
        #[arg(long)]
        no_init: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_deploy_flags() {
        let cli = Cli::try_parse_from(["graft", "deploy", "--clean", "--no-init"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Deploy {
                clean: true,
                no_init: true
            }
        );
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["graft", "enable", "blog", "--config", "/etc/graft.toml"])
            .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/graft.toml"));
        assert_eq!(
            cli.command,
            Commands::Enable {
                name: "blog".to_string()
            }
        );
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["graft"]).is_err());
    }
}
