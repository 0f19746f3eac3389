//! Loading captures from disk and naming exported files.

use super::types::{Capture, CaptureDetails};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use std::fmt::{self, Write as _};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Generate a filename from a chrono template and the capture time.
///
/// # Arguments
/// * `template` - Template string with chrono format specifiers
/// * `taken_at` - Timestamp substituted into the template
/// * `extension` - File extension (e.g., "png")
///
/// # Errors
/// Fails when the template contains an unknown format specifier.
pub fn generate_filename(
    template: &str,
    taken_at: &DateTime<Local>,
    extension: &str,
) -> Result<String, fmt::Error> {
    let mut filename = String::new();
    write!(filename, "{}.{}", taken_at.format(template), extension)?;
    Ok(filename)
}

/// True when every specifier in `template` is understood by chrono.
pub fn is_valid_filename_template(template: &str) -> bool {
    !StrftimeItems::new(template).any(|item| matches!(item, Item::Error))
}

/// Expand tilde (~) in path strings.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    PathBuf::from(path)
}

fn mime_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("bmp") => "image/bmp",
        Some("gif") => "image/gif",
        Some("tif") | Some("tiff") => "image/tiff",
        _ => "image/png",
    }
}

/// Load an image file as a capture, using the file name as title and its
/// modification time as capture time.
pub fn load_capture(path: &Path) -> io::Result<Capture> {
    let image_data = fs::read(path)?;
    if image_data.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} is empty", path.display()),
        ));
    }

    let taken_at = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map(DateTime::<Local>::from)
        .unwrap_or_else(|_| Local::now());

    let title = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Screenshot".to_string());

    log::debug!(
        "Loaded capture '{}' from {} ({} bytes)",
        title,
        path.display(),
        image_data.len()
    );

    Ok(Capture::new(
        image_data,
        CaptureDetails {
            title,
            taken_at,
            source_path: Some(path.to_path_buf()),
            mime_type: mime_type_for(path).to_string(),
        },
    ))
}
