//! Shared test utilities for the Graft workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`archive`]: builders for plugin manifests and plugin archives
//! - [`host`]: [`TestHost`](host::TestHost), a throwaway host and data directory

pub mod archive;
pub mod host;

pub use archive::{PluginArchive, manifest_toml};
pub use host::TestHost;
