//! Render configuration from actbook.toml and metadata sidecars

use crate::metadata::BookMetadata;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Default file name for the render configuration
pub const CONFIG_FILE_NAME: &str = "actbook.toml";

/// Page layout and typography settings forwarded to the render target
///
/// Lengths are millimetres, font sizes points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Paper format name (e.g. `A4`, `A5`, `Letter`)
    pub format: String,

    pub margin_left: f64,
    pub margin_right: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,

    /// Distance between the header and the top of the page
    pub margin_header: f64,

    /// Distance between the footer and the bottom of the page
    pub margin_footer: f64,

    /// Default font family
    pub default_font: String,

    /// Default font size in points
    pub default_font_size: f64,

    /// Reserve a table of contents after the title page
    pub auto_toc: bool,

    /// Enable hyphenation of body text
    pub hyphenate: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            format: "A4".to_string(),
            margin_left: 20.0,
            margin_right: 20.0,
            margin_top: 20.0,
            margin_bottom: 20.0,
            margin_header: 5.0,
            margin_footer: 5.0,
            default_font: "DejaVuSerif".to_string(),
            default_font_size: 11.0,
            auto_toc: true,
            hyphenate: true,
        }
    }
}

impl RenderConfig {
    /// Load configuration from a TOML file
    ///
    /// Missing keys keep their default values.
    ///
    /// # Parameters
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// * `Ok(RenderConfig)` - Successfully loaded configuration
    /// * `Err(ConfigError)` - Error reading or parsing the configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(ConfigError::IoError)?;

        let config: RenderConfig = toml::from_str(&content).map_err(ConfigError::ParseError)?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::SerializeError)?;

        fs::write(&path, content).map_err(ConfigError::IoError)?;

        Ok(())
    }

    /// Layer the render settings of a metadata sidecar over this configuration
    ///
    /// Returns a new configuration; fields absent from the sidecar keep the
    /// value they have here.
    pub fn merged(&self, metadata: &BookMetadata) -> RenderConfig {
        let mut merged = self.clone();

        if let Some(format) = &metadata.format {
            merged.format = format.clone();
        }
        if let Some(font) = &metadata.font {
            merged.default_font = font.clone();
        }
        if let Some(size) = metadata.font_size {
            merged.default_font_size = size;
        }
        if let Some(margin) = metadata.margin_left {
            merged.margin_left = margin;
        }
        if let Some(margin) = metadata.margin_right {
            merged.margin_right = margin;
        }
        if let Some(margin) = metadata.margin_top {
            merged.margin_top = margin;
        }
        if let Some(margin) = metadata.margin_bottom {
            merged.margin_bottom = margin;
        }
        if let Some(hyphenate) = metadata.hyphenate {
            merged.hyphenate = hyphenate;
        }

        merged
    }

    /// Typst paper name for the configured format
    pub fn paper(&self) -> String {
        let normalized = self.format.trim().to_lowercase();
        match normalized.as_str() {
            "letter" | "us-letter" => "us-letter".to_string(),
            "legal" | "us-legal" => "us-legal".to_string(),
            "" => "a4".to_string(),
            _ => normalized,
        }
    }
}

/// Errors that can occur when loading or saving the render configuration
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum ConfigError {
    /// IO error when reading or writing file
    #[error("IO error: {0}")]
    IoError(std::io::Error),

    /// Error parsing TOML
    #[error("TOML parse error: {0}")]
    ParseError(toml::de::Error),

    /// Error serializing to TOML
    #[error("TOML serialize error: {0}")]
    SerializeError(toml::ser::Error),
}
