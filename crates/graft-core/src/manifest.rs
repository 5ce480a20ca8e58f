//! Plugin manifest parsing for `plugin.toml` files.
//!
//! The manifest declares a plugin's identity, version, the plugins it needs
//! enabled before it can be enabled, and the host versions it runs on. The
//! canonical filename is [`MANIFEST_FILENAME`](crate::MANIFEST_FILENAME).
//!
//! # Example TOML
//!
//! ```toml
//! [plugin]
//! name = "blog"
//! version = "1.2.0"
//! description = "Adds a blog section to the site"
//! dependencies = ["core-ui"]
//!
//! [compatibility]
//! host = ">=2.0, <3.0"
//! description = "Uses the 2.x template API"
//! ```

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{MANIFEST_FILENAME, archive};

/// Complete plugin manifest loaded from `plugin.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PluginManifest {
    /// Core plugin metadata.
    pub plugin: PluginMeta,
    /// Host compatibility declaration.
    #[serde(default)]
    pub compatibility: Option<CompatibilitySection>,
}

/// Identity and dependency metadata.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PluginMeta {
    /// Plugin name; also the name of its directory under the plugin root.
    pub name: String,
    /// Semver version string.
    pub version: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// Plugins that must be enabled before this one.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Hide from default listings.
    #[serde(default)]
    pub hidden: bool,
}

/// Which host versions the plugin supports.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CompatibilitySection {
    /// Semver requirement on the host version (e.g. `">=2.0, <3.0"`).
    #[serde(default)]
    pub host: Option<String>,
    /// Free-form note shown alongside the compatibility verdict.
    #[serde(default)]
    pub description: Option<String>,
}

impl PluginManifest {
    /// Parse a manifest from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Read and parse a manifest file.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::ManifestNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| Error::fs(path, e))?;
        Self::from_toml(&content)
    }

    /// Read the manifest at the top of a plugin directory.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        Self::from_path(&dir.join(MANIFEST_FILENAME))
    }

    /// Read the manifest straight out of a plugin archive, without extracting
    /// anything to disk.
    ///
    /// Looks for the `<root>/plugin.toml` entry; run
    /// [`ArchiveValidator::validate`](crate::ArchiveValidator::validate) first
    /// to get precise layout errors.
    pub fn from_archive(archive_path: &Path) -> Result<Self> {
        let display = archive_path.display().to_string();
        let mut zip = archive::open(archive_path, &display)?;

        let manifest_name = zip
            .file_names()
            .find(|name| {
                archive::normalized_name(name).is_some_and(|name| archive::is_root_manifest(&name))
            })
            .map(str::to_owned)
            .ok_or_else(|| Error::MissingManifest {
                archive: display.clone(),
            })?;

        let mut entry = zip
            .by_name(&manifest_name)
            .map_err(|e| archive::corrupt(&display, e))?;
        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| archive::corrupt(&display, e))?;

        Self::from_toml(&content)
    }

    /// The plugin name.
    pub fn name(&self) -> &str {
        &self.plugin.name
    }

    /// The parsed plugin version.
    pub fn version(&self) -> semver::Version {
        // validated in from_toml
        semver::Version::parse(&self.plugin.version).unwrap_or_else(|_| semver::Version::new(0, 0, 0))
    }

    /// The host requirement string, if declared.
    pub fn host_requirement(&self) -> Option<&str> {
        self.compatibility.as_ref().and_then(|c| c.host.as_deref())
    }

    /// Serialize the manifest back to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Settings(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        validate_name(&self.plugin.name)?;

        semver::Version::parse(&self.plugin.version).map_err(|e| Error::InvalidVersion {
            version: self.plugin.version.clone(),
            source: e,
        })?;

        for dep in &self.plugin.dependencies {
            validate_name(dep)?;
        }

        if let Some(requirement) = self.host_requirement() {
            semver::VersionReq::parse(requirement).map_err(|e| Error::InvalidRequirement {
                requirement: requirement.to_string(),
                source: e,
            })?;
        }

        Ok(())
    }
}

/// Check a plugin name is usable as a single directory component.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidName {
            name: name.to_string(),
            reason: "plugin name must not be empty".to_string(),
        });
    }
    if name.starts_with('.') {
        return Err(Error::InvalidName {
            name: name.to_string(),
            reason: "plugin name must not start with '.'".to_string(),
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::InvalidName {
            name: name.to_string(),
            reason: "plugin name must contain only alphanumeric characters, hyphens, or underscores"
                .to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BLOG_TOML: &str = r#"
[plugin]
name = "blog"
version = "1.2.0"
description = "Adds a blog section"
dependencies = ["core-ui", "auth"]

[compatibility]
host = ">=2.0, <3.0"
description = "Uses the 2.x template API"
"#;

    #[test]
    fn parse_full_manifest() {
        let manifest = PluginManifest::from_toml(BLOG_TOML).unwrap();

        assert_eq!(manifest.name(), "blog");
        assert_eq!(manifest.version(), semver::Version::new(1, 2, 0));
        assert_eq!(manifest.plugin.description.as_deref(), Some("Adds a blog section"));
        assert_eq!(manifest.plugin.dependencies, vec!["core-ui", "auth"]);
        assert_eq!(manifest.host_requirement(), Some(">=2.0, <3.0"));
        assert!(!manifest.plugin.hidden);
    }

    #[test]
    fn parse_minimal_manifest() {
        let manifest = PluginManifest::from_toml(
            r#"
[plugin]
name = "minimal"
version = "0.1.0"
"#,
        )
        .unwrap();
        assert!(manifest.plugin.dependencies.is_empty());
        assert!(manifest.compatibility.is_none());
        assert!(manifest.host_requirement().is_none());
    }

    #[test]
    fn invalid_version_rejected() {
        let err = PluginManifest::from_toml(
            r#"
[plugin]
name = "bad"
version = "one"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidVersion { .. }));
    }

    #[test]
    fn invalid_host_requirement_rejected() {
        let err = PluginManifest::from_toml(
            r#"
[plugin]
name = "bad"
version = "1.0.0"

[compatibility]
host = "at least two"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidRequirement { .. }));
    }

    #[test]
    fn path_like_names_rejected() {
        for name in ["", "../escape", "a/b", ".hidden", "with space"] {
            assert!(
                matches!(validate_name(name), Err(Error::InvalidName { .. })),
                "name {name:?} should be rejected"
            );
        }
        validate_name("core_ui-2").unwrap();
    }

    #[test]
    fn invalid_dependency_name_rejected() {
        let err = PluginManifest::from_toml(
            r#"
[plugin]
name = "blog"
version = "1.0.0"
dependencies = ["../core"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidName { ref name, .. } if name == "../core"));
    }

    #[test]
    fn unknown_plugin_keys_rejected() {
        let err = PluginManifest::from_toml(
            r#"
[plugin]
name = "blog"
version = "1.0.0"
dependancies = ["core"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ManifestParse(_)));
    }

    #[test]
    fn missing_manifest_file_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = PluginManifest::from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ManifestNotFound(_)));
    }

    #[test]
    fn toml_round_trip_keeps_fields() {
        let manifest = PluginManifest::from_toml(BLOG_TOML).unwrap();
        let reparsed = PluginManifest::from_toml(&manifest.to_toml().unwrap()).unwrap();
        assert_eq!(manifest, reparsed);
    }
}
