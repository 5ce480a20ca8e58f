//! Format-agnostic configuration loading and saving

use std::path::Path;

use serde::{Serialize, de::DeserializeOwned};

use crate::{Error, Result, io};

/// Supported on-disk document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Json,
}

impl Format {
    /// Detect the format from a path's extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        match extension.as_str() {
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            _ => Err(Error::UnsupportedFormat { extension }),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }
}

/// Format-agnostic configuration store.
///
/// Detects the format from the file extension and serializes through the
/// locked atomic writer.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigStore {
    robustness: io::RobustnessConfig,
}

impl ConfigStore {
    /// Create a new ConfigStore with default robustness settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new ConfigStore with custom robustness settings.
    pub fn with_robustness(robustness: io::RobustnessConfig) -> Self {
        Self { robustness }
    }

    /// Parse a document from a string in the given format.
    pub fn parse<T: DeserializeOwned>(&self, path: &Path, content: &str) -> Result<T> {
        let format = Format::from_path(path)?;
        let parsed = match format {
            Format::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            Format::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| Error::ConfigParse {
            path: path.to_path_buf(),
            format: format.label().into(),
            message,
        })
    }

    /// Load a document from a file.
    ///
    /// - `.toml` -> TOML
    /// - `.json` -> JSON
    pub fn load<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = io::read_text(path)?;
        self.parse(path, &content)
    }

    /// Load a document while holding a shared lock.
    ///
    /// Returns `Ok(None)` if the file does not exist.
    pub fn load_locked<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match io::read_text_locked(path, self.robustness)? {
            Some(content) => self.parse(path, &content).map(Some),
            None => Ok(None),
        }
    }

    /// Save a document, pretty-printed, fully overwriting the file.
    pub fn save<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let format = Format::from_path(path)?;
        let content = match format {
            Format::Toml => toml::to_string_pretty(value).map_err(|e| e.to_string()),
            Format::Json => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
        }
        .map_err(|message| Error::ConfigSerialize {
            path: path.to_path_buf(),
            format: format.label().into(),
            message,
        })?;

        io::write_atomic(path, content.as_bytes(), self.robustness)
    }
}
