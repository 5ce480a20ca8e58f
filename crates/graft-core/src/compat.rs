//! Host compatibility checks.
//!
//! A manifest may declare a semver requirement on the host version. The
//! verdict is stored on the plugin record as `compatible` plus a readable
//! description, and gates both install and enable.

use semver::{Version, VersionReq};

use crate::manifest::PluginManifest;

/// The outcome of checking a manifest against the running host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compatibility {
    /// Whether the plugin may be activated on this host.
    pub compatible: bool,
    /// Human-readable explanation of the verdict.
    pub description: String,
}

impl Compatibility {
    /// Evaluate `manifest` against `host`.
    ///
    /// A manifest without a host requirement is compatible with every host.
    pub fn check(manifest: &PluginManifest, host: &Version) -> Self {
        let note = manifest
            .compatibility
            .as_ref()
            .and_then(|c| c.description.as_deref());

        let Some(raw) = manifest.host_requirement() else {
            return Self::with_note(true, "no host requirement declared".to_string(), note);
        };

        let requirement = match VersionReq::parse(raw) {
            Ok(req) => req,
            Err(e) => {
                return Self::with_note(
                    false,
                    format!("unparseable host requirement '{raw}': {e}"),
                    note,
                );
            }
        };

        if requirement.matches(host) {
            Self::with_note(true, format!("host {host} satisfies {raw}"), note)
        } else {
            Self::with_note(false, format!("requires host {raw}, running {host}"), note)
        }
    }

    fn with_note(compatible: bool, verdict: String, note: Option<&str>) -> Self {
        let description = match note {
            Some(note) if !note.is_empty() => format!("{verdict} ({note})"),
            _ => verdict,
        };
        Self {
            compatible,
            description,
        }
    }
}
