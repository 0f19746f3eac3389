//! Data types describing a finished capture.

use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::Arc;

/// Metadata recorded alongside the captured image.
#[derive(Debug, Clone)]
pub struct CaptureDetails {
    /// Window or document title, used as print job and upload title.
    pub title: String,
    /// Moment the capture was taken.
    pub taken_at: DateTime<Local>,
    /// File the image was loaded from, if any.
    pub source_path: Option<PathBuf>,
    /// MIME type of `Capture::image_data`.
    pub mime_type: String,
}

impl Default for CaptureDetails {
    fn default() -> Self {
        Self {
            title: "Screenshot".to_string(),
            taken_at: Local::now(),
            source_path: None,
            mime_type: "image/png".to_string(),
        }
    }
}

/// Image plus metadata. Cloning shares the underlying bytes.
#[derive(Debug, Clone)]
pub struct Capture {
    image_data: Arc<[u8]>,
    details: CaptureDetails,
}

impl Capture {
    pub fn new(image_data: impl Into<Arc<[u8]>>, details: CaptureDetails) -> Self {
        Self {
            image_data: image_data.into(),
            details,
        }
    }

    /// Encoded image bytes (format given by `details().mime_type`).
    pub fn image_data(&self) -> &[u8] {
        &self.image_data
    }

    /// Shared handle to the image bytes, for moving into blocking tasks.
    pub fn shared_image(&self) -> Arc<[u8]> {
        Arc::clone(&self.image_data)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.details.title = title.into();
        self
    }

    pub fn details(&self) -> &CaptureDetails {
        &self.details
    }

    /// File extension matching the image MIME type.
    pub fn extension(&self) -> &str {
        match self.details.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/bmp" => "bmp",
            "image/gif" => "gif",
            "image/tiff" => "tiff",
            _ => "png",
        }
    }
}
