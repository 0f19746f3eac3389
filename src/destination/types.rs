//! Shared types for export destinations.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::ui::{DispatchError, UiDispatch};

/// Errors raised by export operations and child discovery.
///
/// Everything except [`DestinationError::Cancelled`] is turned into a failed
/// notification at the export boundary.
#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("{0} is not available")]
    Unavailable(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Printing failed: {0}")]
    Print(String),

    #[error("Text recognition failed: {0}")]
    Ocr(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Clipboard operation failed: {0}")]
    Clipboard(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("UI dispatch failed: {0}")]
    Dispatch(DispatchError),
}

impl From<DispatchError> for DestinationError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Cancelled => DestinationError::Cancelled,
            other => DestinationError::Dispatch(other),
        }
    }
}

/// Returned instead of a notification when an export or refresh was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cancelled")]
pub struct Cancelled;

/// Caller-side context passed into every export and refresh.
#[derive(Clone)]
pub struct ExportContext {
    ui: UiDispatch,
    caller: String,
}

impl ExportContext {
    pub fn new(ui: UiDispatch, caller: impl Into<String>) -> Self {
        Self {
            ui,
            caller: caller.into(),
        }
    }

    /// Dispatcher for work that must run on the UI thread.
    pub fn ui(&self) -> &UiDispatch {
        &self.ui
    }

    /// Name of the surface that triggered the export (editor, tray menu, CLI).
    pub fn caller(&self) -> &str {
        &self.caller
    }
}

impl fmt::Debug for ExportContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportContext")
            .field("caller", &self.caller)
            .finish_non_exhaustive()
    }
}

/// Freedesktop icon name shown next to a destination. Immutable once set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon(Arc<str>);

impl Icon {
    pub fn named(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Default for Icon {
    fn default() -> Self {
        Self::named("document-send")
    }
}
