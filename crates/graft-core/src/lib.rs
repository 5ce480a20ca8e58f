//! Plugin lifecycle management for Graft
//!
//! Graft installs, enables, disables, removes and deploys plugins: packages
//! of files that extend a host application by overlaying their directory
//! tree onto the host's runtime tree.
//!
//! # Architecture
//!
//! ```text
//!                  PluginManager
//!                        |
//!     +---------+--------+---------+----------+
//!     |         |                  |          |
//!  archive   Registry        resolver     Deployer
//!     |         |                             |
//!  manifest  record                        graft-fs
//! ```
//!
//! The [`Registry`] is the single source of truth. It is an owned value
//! constructed once at startup and handed to every operation, so tests can
//! run against isolated instances.

pub mod archive;
pub mod compat;
pub mod deploy;
pub mod error;
pub mod hooks;
pub mod manager;
pub mod manifest;
pub mod record;
pub mod registry;
pub mod resolver;
pub mod settings;

/// The fixed filename of a plugin manifest.
///
/// Every plugin directory, and the single root folder of every plugin
/// archive, must carry a file with this name at its top level.
pub const MANIFEST_FILENAME: &str = "plugin.toml";

pub use archive::ArchiveValidator;
pub use compat::Compatibility;
pub use deploy::{DeployLedger, DeployReport, Deployer, OverlayLayer, OverlayPlan};
pub use error::{Error, Result};
pub use hooks::{NoopHooks, PluginHooks};
pub use manager::PluginManager;
pub use manifest::PluginManifest;
pub use record::PluginRecord;
pub use registry::Registry;
pub use settings::Settings;
