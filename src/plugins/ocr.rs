//! Text recognition through an external OCR helper.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::command::{self, CommandRequest, CommandRunner};
use crate::capture::Capture;
use crate::clipboard::{self, TextClipboard};
use crate::config::OcrConfig;
use crate::destination::{Destination, DestinationError, ExportContext, ExportOperation, Icon};
use crate::i18n::{self, Language};
use crate::notification::Notification;
use crate::plugin::{Acquired, Plugin, PluginContext, PluginError, PluginSetup};
use crate::ui::{DialogResult, SettingsDraft, SettingsSurface};

const SOURCE: &str = "OCR";

pub struct OcrPlugin {
    config: Arc<RwLock<OcrConfig>>,
    runner: Arc<dyn CommandRunner>,
    clipboard: Arc<dyn TextClipboard>,
}

impl OcrPlugin {
    pub fn new(
        config: OcrConfig,
        runner: Arc<dyn CommandRunner>,
        clipboard: Arc<dyn TextClipboard>,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            runner,
            clipboard,
        }
    }

    /// Snapshot of the committed settings.
    pub fn config(&self) -> OcrConfig {
        self.config.read().clone()
    }
}

#[async_trait]
impl Plugin for OcrPlugin {
    fn name(&self) -> &str {
        "ocr"
    }

    async fn acquire(
        &self,
        context: &PluginContext,
        cancel: &CancellationToken,
    ) -> Result<Acquired, PluginError> {
        let config = self.config();
        if !config.enabled {
            return Ok(Acquired::Unavailable("text recognition disabled in config".into()));
        }

        let request = CommandRequest::new(
            &config.command,
            ["--version"],
            Duration::from_millis(config.probe_timeout_ms),
        );
        if let Err(reason) = command::probe(self.runner.as_ref(), request, cancel).await {
            return Ok(Acquired::Unavailable(reason));
        }

        let destination = Destination::builder(SOURCE)
            .localized(&context.language, i18n::DESTINATION_OCR, i18n::OCR_ERROR)
            .priority(200)
            .icon(Icon::named("edit-select-text"))
            .export(Recognize {
                config: Arc::clone(&self.config),
                runner: Arc::clone(&self.runner),
                clipboard: Arc::clone(&self.clipboard),
                language: Arc::clone(&context.language),
            })
            .build();

        Ok(Acquired::Available(PluginSetup {
            destinations: vec![destination],
            menu_item: None,
        }))
    }

    fn configure(&self, surface: &dyn SettingsSurface) -> DialogResult {
        let current = self.config();
        let mut draft = SettingsDraft::new()
            .with("language", current.language.clone())
            .with("copy_to_clipboard", current.copy_to_clipboard.to_string());

        let result = surface.show("Text recognition", &mut draft);
        if result == DialogResult::Ok {
            let mut config = self.config.write();
            if let Some(language) = draft.get("language").map(str::trim)
                && !language.is_empty()
            {
                config.language = language.to_string();
            }
            match draft.get("copy_to_clipboard").map(str::parse::<bool>) {
                Some(Ok(copy)) => config.copy_to_clipboard = copy,
                Some(Err(_)) => log::warn!("Ignoring invalid copy_to_clipboard value"),
                None => {}
            }
        }
        result
    }
}

struct Recognize {
    config: Arc<RwLock<OcrConfig>>,
    runner: Arc<dyn CommandRunner>,
    clipboard: Arc<dyn TextClipboard>,
    language: Arc<Language>,
}

#[async_trait]
impl ExportOperation for Recognize {
    async fn export(
        &self,
        _context: &ExportContext,
        capture: &Capture,
        cancel: &CancellationToken,
    ) -> Result<Notification, DestinationError> {
        let config = self.config.read().clone();
        let request = CommandRequest::new(
            &config.command,
            ["stdin", "stdout", "-l", config.language.as_str()],
            Duration::from_secs(config.timeout_secs),
        )
        .with_stdin(capture.shared_image());

        let output = self.runner.run(request, cancel).await?;
        if !output.success {
            return Err(DestinationError::Ocr(if output.stderr.is_empty() {
                format!("{} exited with status {:?}", config.command, output.code)
            } else {
                output.stderr
            }));
        }

        let text = output.stdout_text().trim().to_string();
        if text.is_empty() {
            return Err(DestinationError::Ocr("no text recognized".into()));
        }
        let count = text.chars().count();
        log::info!("Recognized {} characters in '{}'", count, capture.details().title);

        if config.copy_to_clipboard {
            clipboard::copy_text_async(Arc::clone(&self.clipboard), text).await?;
        }

        Ok(Notification::success(
            SOURCE,
            self.language
                .format(i18n::OCR_SUCCESS, &[("count", &count.to_string())]),
        ))
    }
}
