//! Configuration type definitions.

use serde::{Deserialize, Serialize};

/// CUPS printing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterConfig {
    /// Register the printer destination at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Command used to query the scheduler and list printers
    #[serde(default = "default_lpstat_command")]
    pub lpstat_command: String,

    /// Command used to spool jobs
    #[serde(default = "default_lp_command")]
    pub lp_command: String,

    /// How long the availability probe may take in milliseconds (valid range: 100 - 30000)
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            lpstat_command: default_lpstat_command(),
            lp_command: default_lp_command(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

/// Text recognition settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// OCR helper executable; must accept `stdin stdout -l <language>`
    #[serde(default = "default_ocr_command")]
    pub command: String,

    /// Recognition language passed to the helper (e.g. "eng", "deu+eng")
    #[serde(default = "default_ocr_language")]
    pub language: String,

    /// Put recognized text on the clipboard
    #[serde(default = "default_true")]
    pub copy_to_clipboard: bool,

    /// Availability probe timeout in milliseconds (valid range: 100 - 30000)
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Maximum time a recognition run may take in seconds (valid range: 1 - 600)
    #[serde(default = "default_ocr_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            command: default_ocr_command(),
            language: default_ocr_language(),
            copy_to_clipboard: default_true(),
            probe_timeout_ms: default_probe_timeout_ms(),
            timeout_secs: default_ocr_timeout_secs(),
        }
    }
}

/// Photo upload service settings.
///
/// The upload destination is only registered when `endpoint` holds a valid
/// http(s) URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL of the service API, e.g. `https://photos.example.com/api`
    #[serde(default)]
    pub endpoint: String,

    /// Bearer token sent with every request
    #[serde(default)]
    pub token: String,

    /// Album id used by the top-level "Upload" entry
    #[serde(default)]
    pub default_album: Option<String>,

    /// chrono format string for uploaded file names
    #[serde(default = "default_filename_template")]
    pub filename_template: String,

    /// Put the returned link on the clipboard
    #[serde(default = "default_true")]
    pub copy_url: bool,

    /// HTTP request timeout in seconds (valid range: 1 - 300)
    #[serde(default = "default_upload_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            endpoint: String::new(),
            token: String::new(),
            default_album: None,
            filename_template: default_filename_template(),
            copy_url: default_true(),
            timeout_secs: default_upload_timeout_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_lpstat_command() -> String {
    "lpstat".to_string()
}

fn default_lp_command() -> String {
    "lp".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_ocr_command() -> String {
    "tesseract".to_string()
}

fn default_ocr_language() -> String {
    "eng".to_string()
}

fn default_ocr_timeout_secs() -> u64 {
    60
}

pub(crate) fn default_filename_template() -> String {
    "wayscriber_%Y-%m-%d_%H%M%S".to_string()
}

fn default_upload_timeout_secs() -> u64 {
    30
}
