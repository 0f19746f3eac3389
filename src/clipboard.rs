//! Clipboard integration for recognized text and upload links.

use crate::destination::DestinationError;
use std::process::{Command, Stdio};
use std::sync::Arc;
use wl_clipboard_rs::copy::{MimeType, Options, Source};

const TEXT_MIME: &str = "text/plain;charset=utf-8";

/// Copy `text` to the Wayland clipboard.
///
/// Prefers the `wl-copy` command and falls back to wl-clipboard-rs when the
/// command is missing or fails. Blocking; call from `spawn_blocking`.
pub fn copy_text(text: &str) -> Result<(), DestinationError> {
    log::debug!("Copying {} bytes of text to clipboard", text.len());

    match copy_via_command(text) {
        Ok(()) => {
            log::info!("Copied text to clipboard via wl-copy");
            Ok(())
        }
        Err(cmd_err) => {
            log::warn!(
                "wl-copy failed ({}). Falling back to wl-clipboard-rs",
                cmd_err
            );
            copy_via_library(text).map_err(|lib_err| {
                DestinationError::Clipboard(format!(
                    "wl-copy failed: {} ; wl-clipboard-rs failed: {}",
                    cmd_err, lib_err
                ))
            })?;
            log::info!("Copied text to clipboard via wl-clipboard-rs fallback");
            Ok(())
        }
    }
}

/// Abstraction over the clipboard so plugins can be tested without Wayland.
pub trait TextClipboard: Send + Sync {
    fn copy_text(&self, text: &str) -> Result<(), DestinationError>;
}

/// Clipboard backed by the running Wayland compositor.
pub struct WaylandClipboard;

impl TextClipboard for WaylandClipboard {
    fn copy_text(&self, text: &str) -> Result<(), DestinationError> {
        copy_text(text)
    }
}

/// Run a blocking clipboard copy off the runtime workers.
pub async fn copy_text_async(
    clipboard: Arc<dyn TextClipboard>,
    text: String,
) -> Result<(), DestinationError> {
    tokio::task::spawn_blocking(move || clipboard.copy_text(&text))
        .await
        .map_err(|e| DestinationError::Clipboard(format!("clipboard task failed: {}", e)))?
}

fn copy_via_library(text: &str) -> Result<(), String> {
    use wl_clipboard_rs::copy::ServeRequests;

    let mut opts = Options::new();
    opts.serve_requests(ServeRequests::Only(1));
    opts.copy(
        Source::Bytes(text.as_bytes().into()),
        MimeType::Specific(TEXT_MIME.to_string()),
    )
    .map_err(|e| format!("wl-clipboard-rs error: {}", e))
}

fn copy_via_command(text: &str) -> Result<(), String> {
    use std::io::Write;

    let mut child = Command::new("wl-copy")
        .arg("--type")
        .arg(TEXT_MIME)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("Failed to spawn wl-copy (is it installed?): {}", e))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(text.as_bytes())
            .map_err(|e| format!("Failed to write to wl-copy stdin: {}", e))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| format!("Failed to wait for wl-copy: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("wl-copy exited with {}: {}", output.status, stderr.trim()));
    }
    Ok(())
}
