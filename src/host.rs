//! Composition root used by the `wayscriber-export` binary: builds the
//! plugins, drives their lifecycles, and resolves destination paths like
//! `Printer/Office`.

use anyhow::Context;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::capture::Capture;
use crate::clipboard::WaylandClipboard;
use crate::config::Config;
use crate::destination::{Cancelled, Destination, DestinationError, ExportContext};
use crate::i18n::Language;
use crate::notification::Notification;
use crate::plugin::{
    MenuRegistry, Plugin, PluginContext, PluginLifecycle, PluginState, StartOutcome,
};
use crate::plugins::command::SystemCommandRunner;
use crate::plugins::{
    DefaultPrinterDialog, HttpPhotoService, OcrPlugin, PrinterPlugin, UploadPlugin,
};
use crate::ui::UiDispatch;

const CALLER: &str = "wayscriber-export";

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Unknown destination '{0}'")]
    UnknownDestination(String),

    #[error("Destination '{0}' cannot export directly; pick one of its children")]
    NotExportable(String),

    #[error("Could not list children of '{designation}': {source}")]
    Refresh {
        designation: String,
        #[source]
        source: DestinationError,
    },
}

/// One row of `wayscriber-export list`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DestinationEntry {
    pub path: String,
    pub label: String,
    pub icon: String,
    pub exportable: bool,
}

/// Summary of one plugin start, for reporting.
#[derive(Debug)]
pub struct StartReport {
    pub plugin: String,
    pub outcome: Result<StartOutcome, String>,
}

pub struct Host {
    registry: Arc<MenuRegistry>,
    lifecycles: Vec<PluginLifecycle>,
    context: ExportContext,
}

impl Host {
    /// Host wired to the real tools: CUPS, the OCR helper, the upload API.
    pub fn from_config(
        config: &Config,
        ui: UiDispatch,
        language: Arc<Language>,
    ) -> anyhow::Result<Self> {
        let runner = Arc::new(SystemCommandRunner);
        let clipboard = Arc::new(WaylandClipboard);
        let service = HttpPhotoService::new().context("Failed to create HTTP client")?;

        let plugins: Vec<Arc<dyn Plugin>> = vec![
            Arc::new(PrinterPlugin::new(
                config.printer.clone(),
                runner.clone(),
                Arc::new(DefaultPrinterDialog),
            )),
            Arc::new(OcrPlugin::new(
                config.ocr.clone(),
                runner,
                clipboard.clone(),
            )),
            Arc::new(UploadPlugin::new(
                config.upload.clone(),
                Arc::new(service),
                clipboard,
            )),
        ];
        Ok(Self::with_plugins(plugins, ui, language))
    }

    pub fn with_plugins(
        plugins: Vec<Arc<dyn Plugin>>,
        ui: UiDispatch,
        language: Arc<Language>,
    ) -> Self {
        let registry = Arc::new(MenuRegistry::new());
        let context = PluginContext {
            language,
            ui: ui.clone(),
        };
        let lifecycles = plugins
            .into_iter()
            .map(|plugin| PluginLifecycle::new(plugin, registry.clone(), context.clone()))
            .collect();
        Self {
            registry,
            lifecycles,
            context: ExportContext::new(ui, CALLER),
        }
    }

    pub fn registry(&self) -> &MenuRegistry {
        &self.registry
    }

    pub fn plugin_states(&self) -> Vec<(String, PluginState)> {
        self.lifecycles
            .iter()
            .map(|lifecycle| (lifecycle.name().to_string(), lifecycle.state()))
            .collect()
    }

    /// Start every plugin concurrently.
    pub async fn start_all(&self, cancel: &CancellationToken) -> Vec<StartReport> {
        let starts = self.lifecycles.iter().map(|lifecycle| async move {
            StartReport {
                plugin: lifecycle.name().to_string(),
                outcome: lifecycle.start(cancel).await.map_err(|err| err.to_string()),
            }
        });
        futures::future::join_all(starts).await
    }

    pub async fn shutdown_all(&self, cancel: &CancellationToken) {
        for lifecycle in &self.lifecycles {
            if let Err(err) = lifecycle.shutdown(cancel).await {
                log::warn!("Shutting down {} failed: {}", lifecycle.name(), err);
            }
        }
    }

    /// Notifications for plugins that failed to start (not for unavailable ones).
    pub fn start_failures(reports: &[StartReport]) -> Vec<Notification> {
        reports
            .iter()
            .filter_map(|report| match &report.outcome {
                Err(err) => Some(Notification::plugin_failure(&report.plugin, err.clone())),
                Ok(_) => None,
            })
            .collect()
    }

    /// Find `Designation` or `Designation/Child`, refreshing the parent when
    /// a child is requested.
    pub async fn resolve(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Destination, HostError> {
        let (root, child) = match path.split_once('/') {
            Some((root, child)) => (root, Some(child)),
            None => (path, None),
        };
        let destination = self
            .registry
            .find(root)
            .ok_or_else(|| HostError::UnknownDestination(path.to_string()))?;

        let Some(child) = child else {
            return Ok(destination);
        };
        self.refresh(&destination, cancel).await?;
        destination
            .find_child(child)
            .ok_or_else(|| HostError::UnknownDestination(path.to_string()))
    }

    async fn refresh(
        &self,
        destination: &Destination,
        cancel: &CancellationToken,
    ) -> Result<usize, HostError> {
        destination
            .refresh(&self.context, cancel)
            .await
            .map_err(|source| HostError::Refresh {
                designation: destination.designation().to_string(),
                source,
            })
    }

    /// Export `capture` to the destination at `path`.
    pub async fn export(
        &self,
        path: &str,
        capture: &Capture,
        cancel: &CancellationToken,
    ) -> Result<Result<Notification, Cancelled>, HostError> {
        let destination = self.resolve(path, cancel).await?;
        if !destination.has_export() {
            return Err(HostError::NotExportable(path.to_string()));
        }
        Ok(destination.export(&self.context, capture, cancel).await)
    }

    /// Every registered destination, followed by its children when
    /// `with_children` is set. Refresh failures are logged and skipped.
    pub async fn list(
        &self,
        with_children: bool,
        cancel: &CancellationToken,
    ) -> Vec<DestinationEntry> {
        let mut entries = Vec::new();
        for destination in self.registry.destinations() {
            entries.push(entry(destination.designation().to_string(), &destination));
            if !with_children || !destination.can_refresh() {
                continue;
            }
            if let Err(err) = self.refresh(&destination, cancel).await {
                log::warn!("{}", err);
                continue;
            }
            for child in destination.children().iter() {
                entries.push(entry(
                    format!("{}/{}", destination.designation(), child.designation()),
                    child,
                ));
            }
        }
        entries
    }
}

fn entry(path: String, destination: &Destination) -> DestinationEntry {
    DestinationEntry {
        path,
        label: destination.display_text(),
        icon: destination.icon().name().to_string(),
        exportable: destination.has_export(),
    }
}
