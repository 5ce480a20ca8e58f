//! Error types for graft-core

use std::path::PathBuf;

/// Result type for graft-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in plugin lifecycle operations.
///
/// Every variant is recoverable: operations report it to the caller and
/// leave the process running.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Install or remove attempted while disabled by configuration.
    #[error("plugin {operation} is disabled by configuration")]
    ConfigurationBlocked { operation: &'static str },

    /// The archive cannot be opened or an entry fails its integrity check.
    #[error("archive '{archive}' is corrupt: {reason}")]
    CorruptArchive { archive: String, reason: String },

    /// No `<root>/plugin.toml` entry in the archive.
    #[error("archive '{archive}' has no {manifest} inside its root folder", manifest = crate::MANIFEST_FILENAME)]
    MissingManifest { archive: String },

    /// The archive does not have exactly one top-level folder.
    #[error("archive '{archive}' must contain exactly one top-level folder, found: {roots:?}")]
    MultipleRootsOrFlatLayout { archive: String, roots: Vec<String> },

    /// The plugin's host requirement excludes the running host version.
    #[error("plugin '{name}' requires host {requirement}, running {host}")]
    IncompatiblePlugin {
        name: String,
        requirement: String,
        host: String,
    },

    /// Enable attempted while required plugins are not enabled.
    #[error("plugin '{name}' requires disabled plugins: {}", .missing.join(", "))]
    DependencyUnsatisfied { name: String, missing: Vec<String> },

    /// No plugin with that name is registered.
    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    /// The plugin must be disabled before it can be removed.
    #[error("plugin '{0}' is enabled; disable it before removing")]
    PluginEnabled(String),

    /// Directory deletion, extraction or overlay copy failed.
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing or reading a backing file failed.
    #[error("persistence failed: {0}")]
    Persistence(#[source] graft_fs::Error),

    /// Failed to parse a plugin manifest.
    #[error("failed to parse plugin manifest: {0}")]
    ManifestParse(#[from] toml::de::Error),

    /// Plugin manifest not found where expected.
    #[error("plugin manifest not found: {0}")]
    ManifestNotFound(PathBuf),

    /// Invalid plugin name.
    #[error("invalid plugin name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Invalid semver version string.
    #[error("invalid version '{version}': {source}")]
    InvalidVersion {
        version: String,
        source: semver::Error,
    },

    /// Invalid host version requirement.
    #[error("invalid host requirement '{requirement}': {source}")]
    InvalidRequirement {
        requirement: String,
        source: semver::Error,
    },

    /// Settings could not be loaded or are inconsistent.
    #[error("invalid settings: {0}")]
    Settings(String),
}

impl Error {
    /// Wrap an I/O error with the path it occurred at.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Whether the error is an archive validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::CorruptArchive { .. }
                | Self::MissingManifest { .. }
                | Self::MultipleRootsOrFlatLayout { .. }
        )
    }
}

impl From<graft_fs::Error> for Error {
    fn from(err: graft_fs::Error) -> Self {
        match err {
            graft_fs::Error::Io { path, source } => Self::Filesystem { path, source },
            other => Self::Persistence(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_io_errors_become_filesystem_failures() {
        let err: Error = graft_fs::Error::io(
            "/srv/app/index.html",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        )
        .into();
        assert!(matches!(err, Error::Filesystem { .. }));
        assert!(err.to_string().contains("/srv/app/index.html"));
    }

    #[test]
    fn lock_failures_become_persistence_failures() {
        let err: Error = graft_fs::Error::LockFailed {
            path: PathBuf::from("registry.json"),
        }
        .into();
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[test]
    fn dependency_message_lists_missing_names() {
        let err = Error::DependencyUnsatisfied {
            name: "blog".into(),
            missing: vec!["core-ui".into(), "auth".into()],
        };
        assert_eq!(
            err.to_string(),
            "plugin 'blog' requires disabled plugins: core-ui, auth"
        );
    }
}
