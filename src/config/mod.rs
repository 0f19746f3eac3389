//! Configuration file support for the export destinations.
//!
//! Settings live in `~/.config/wayscriber/destinations.toml`, one section per
//! plugin. If the file doesn't exist, defaults are used. Edits made through a
//! plugin's settings dialog stay in memory.

pub mod types;

pub use types::{OcrConfig, PrinterConfig, UploadConfig};

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::capture::file::is_valid_filename_template;

/// Root configuration deserialized from the TOML file.
///
/// # Example TOML
/// ```toml
/// [printer]
/// enabled = true
///
/// [ocr]
/// language = "deu+eng"
/// copy_to_clipboard = true
///
/// [upload]
/// endpoint = "https://photos.example.com/api"
/// token = "secret"
/// default_album = "screenshots"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub printer: PrinterConfig,

    #[serde(default)]
    pub ocr: OcrConfig,

    #[serde(default)]
    pub upload: UploadConfig,
}

impl Config {
    /// Clamps timeouts to sane ranges and drops values that cannot work.
    ///
    /// Validated ranges:
    /// - probe timeouts: 100 - 30000 ms
    /// - `ocr.timeout_secs`: 1 - 600
    /// - `upload.timeout_secs`: 1 - 300
    pub fn validate_and_clamp(&mut self) {
        if !(100..=30_000).contains(&self.printer.probe_timeout_ms) {
            log::warn!(
                "Invalid printer probe_timeout_ms {}, clamping to 100-30000 range",
                self.printer.probe_timeout_ms
            );
            self.printer.probe_timeout_ms = self.printer.probe_timeout_ms.clamp(100, 30_000);
        }

        if !(100..=30_000).contains(&self.ocr.probe_timeout_ms) {
            log::warn!(
                "Invalid ocr probe_timeout_ms {}, clamping to 100-30000 range",
                self.ocr.probe_timeout_ms
            );
            self.ocr.probe_timeout_ms = self.ocr.probe_timeout_ms.clamp(100, 30_000);
        }

        if !(1..=600).contains(&self.ocr.timeout_secs) {
            log::warn!(
                "Invalid ocr timeout_secs {}, clamping to 1-600 range",
                self.ocr.timeout_secs
            );
            self.ocr.timeout_secs = self.ocr.timeout_secs.clamp(1, 600);
        }

        if !(1..=300).contains(&self.upload.timeout_secs) {
            log::warn!(
                "Invalid upload timeout_secs {}, clamping to 1-300 range",
                self.upload.timeout_secs
            );
            self.upload.timeout_secs = self.upload.timeout_secs.clamp(1, 300);
        }

        if self.ocr.language.trim().is_empty() {
            log::warn!("Empty ocr language, falling back to 'eng'");
            self.ocr.language = "eng".to_string();
        }

        if self.upload.filename_template.trim().is_empty() {
            log::warn!("Empty upload filename_template, using default");
            self.upload.filename_template = types::default_filename_template();
        } else if !is_valid_filename_template(&self.upload.filename_template) {
            log::warn!(
                "Invalid upload filename_template '{}', using default",
                self.upload.filename_template
            );
            self.upload.filename_template = types::default_filename_template();
        }

        let endpoint = self.upload.endpoint.trim();
        if !endpoint.is_empty() && !is_http_url(endpoint) {
            log::warn!(
                "Invalid upload endpoint '{}', upload destination disabled",
                self.upload.endpoint
            );
            self.upload.endpoint.clear();
        }
    }

    /// Returns the path to the configuration file.
    ///
    /// # Errors
    /// Returns an error if the config directory cannot be determined (e.g., HOME not set).
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("wayscriber");

        Ok(config_dir.join("destinations.toml"))
    }

    /// Loads configuration from the default location, or returns defaults if not found.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Loads and validates configuration from `config_path`.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or contains
    /// invalid TOML.
    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!("Config file not found, using defaults");
            debug!("Expected config at: {}", config_path.display());
            return Ok(Self::default());
        }

        let config_str = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config from {}", config_path.display()))?;

        config.validate_and_clamp();

        info!("Loaded config from {}", config_path.display());
        debug!("Config: {:?}", config.redacted());

        Ok(config)
    }

    /// Copy safe to log: the upload token is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.upload.token.is_empty() {
            copy.upload.token = "***".to_string();
        }
        copy
    }
}

/// True for absolute `http`/`https` URLs with a host.
pub fn is_http_url(candidate: &str) -> bool {
    url::Url::parse(candidate)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false)
}
