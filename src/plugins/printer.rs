//! CUPS printing through `lpstat` and `lp`.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::command::{self, CommandRequest, CommandRunner};
use crate::capture::Capture;
use crate::config::PrinterConfig;
use crate::destination::{
    ChildDiscovery, Destination, DestinationError, ExportContext, ExportOperation, Icon,
    ordering::order_names,
};
use crate::i18n::{self, Language};
use crate::notification::Notification;
use crate::plugin::{Acquired, Plugin, PluginContext, PluginError, PluginSetup};

const SOURCE: &str = "Printer";
const SPOOL_TIMEOUT: Duration = Duration::from_secs(60);
const LIST_TIMEOUT: Duration = Duration::from_secs(10);

/// Print dialog shown on the UI thread when exporting to the top-level
/// printer entry. Returns `None` when the user dismisses it.
pub trait PrintDialog: Send + Sync {
    fn choose_printer(&self, printers: &[String], default: Option<&str>) -> Option<String>;
}

/// Non-interactive dialog: picks the system default, else the first printer.
pub struct DefaultPrinterDialog;

impl PrintDialog for DefaultPrinterDialog {
    fn choose_printer(&self, printers: &[String], default: Option<&str>) -> Option<String> {
        default
            .filter(|name| printers.iter().any(|printer| printer == name))
            .map(str::to_string)
            .or_else(|| printers.first().cloned())
    }
}

pub struct PrinterPlugin {
    config: PrinterConfig,
    runner: Arc<dyn CommandRunner>,
    dialog: Arc<dyn PrintDialog>,
}

impl PrinterPlugin {
    pub fn new(
        config: PrinterConfig,
        runner: Arc<dyn CommandRunner>,
        dialog: Arc<dyn PrintDialog>,
    ) -> Self {
        Self {
            config,
            runner,
            dialog,
        }
    }
}

#[async_trait]
impl Plugin for PrinterPlugin {
    fn name(&self) -> &str {
        "printer"
    }

    async fn acquire(
        &self,
        context: &PluginContext,
        cancel: &CancellationToken,
    ) -> Result<Acquired, PluginError> {
        if !self.config.enabled {
            return Ok(Acquired::Unavailable("printing disabled in config".into()));
        }

        // `lpstat -r` exits 0 only while the scheduler is running.
        let request = CommandRequest::new(
            &self.config.lpstat_command,
            ["-r"],
            Duration::from_millis(self.config.probe_timeout_ms),
        );
        if let Err(reason) = command::probe(self.runner.as_ref(), request, cancel).await {
            return Ok(Acquired::Unavailable(reason));
        }

        let spooler = Spooler {
            config: self.config.clone(),
            runner: Arc::clone(&self.runner),
            language: Arc::clone(&context.language),
        };
        let root = Destination::builder(SOURCE)
            .localized(
                &context.language,
                i18n::DESTINATION_PRINTER,
                i18n::PRINTER_ERROR,
            )
            .priority(100)
            .icon(Icon::named("printer"))
            .export(DialogPrint {
                spooler: spooler.clone(),
                dialog: Arc::clone(&self.dialog),
            })
            .discovery(PrinterDiscovery { spooler })
            .build();

        Ok(Acquired::Available(PluginSetup {
            destinations: vec![root],
            menu_item: None,
        }))
    }
}

#[derive(Clone)]
struct Spooler {
    config: PrinterConfig,
    runner: Arc<dyn CommandRunner>,
    language: Arc<Language>,
}

impl Spooler {
    async fn lpstat(
        &self,
        flag: &str,
        cancel: &CancellationToken,
    ) -> Result<String, DestinationError> {
        let request = CommandRequest::new(&self.config.lpstat_command, [flag], LIST_TIMEOUT);
        let output = self.runner.run(request, cancel).await?;
        if output.success {
            Ok(output.stdout_text())
        } else if flag == "-d" {
            // No default configured is not an error.
            Ok(String::new())
        } else {
            Err(DestinationError::Print(format!(
                "lpstat {} failed: {}",
                flag, output.stderr
            )))
        }
    }

    /// Printer names in display order with the system default first.
    async fn printers(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(Vec<String>, Option<String>), DestinationError> {
        let names = parse_printer_list(&self.lpstat("-e", cancel).await?);
        let default = parse_default_printer(&self.lpstat("-d", cancel).await?);
        Ok((order_names(names, default.as_deref()), default))
    }

    async fn print(
        &self,
        printer: &str,
        capture: &Capture,
        cancel: &CancellationToken,
    ) -> Result<Notification, DestinationError> {
        let request = CommandRequest::new(
            &self.config.lp_command,
            [
                "-d".to_string(),
                printer.to_string(),
                "-t".to_string(),
                capture.details().title.clone(),
                "-".to_string(),
            ],
            SPOOL_TIMEOUT,
        )
        .with_stdin(capture.shared_image());

        let output = self.runner.run(request, cancel).await?;
        if !output.success {
            return Err(DestinationError::Print(if output.stderr.is_empty() {
                format!("lp exited with status {:?}", output.code)
            } else {
                output.stderr
            }));
        }

        match parse_job_id(&output.stdout_text()) {
            Some(job) => log::info!("Spooled job {} on {}", job, printer),
            None => log::info!("Spooled capture on {}", printer),
        }
        Ok(Notification::success(
            SOURCE,
            self.language
                .format(i18n::PRINTER_SUCCESS, &[("printer", printer)]),
        ))
    }
}

/// Export from the top-level entry: ask the dialog which printer to use.
struct DialogPrint {
    spooler: Spooler,
    dialog: Arc<dyn PrintDialog>,
}

#[async_trait]
impl ExportOperation for DialogPrint {
    async fn export(
        &self,
        context: &ExportContext,
        capture: &Capture,
        cancel: &CancellationToken,
    ) -> Result<Notification, DestinationError> {
        let (printers, default) = self.spooler.printers(cancel).await?;
        if printers.is_empty() {
            return Err(DestinationError::Print("no printers configured".into()));
        }

        let dialog = Arc::clone(&self.dialog);
        let choice = context
            .ui()
            .run(cancel, move || {
                dialog.choose_printer(&printers, default.as_deref())
            })
            .await?;

        match choice {
            Some(printer) => self.spooler.print(&printer, capture, cancel).await,
            None => {
                log::info!("Print dialog dismissed");
                Err(DestinationError::Cancelled)
            }
        }
    }
}

/// Export from a discovered child: print straight to its printer.
struct DirectPrint {
    spooler: Spooler,
    printer: String,
}

#[async_trait]
impl ExportOperation for DirectPrint {
    async fn export(
        &self,
        _context: &ExportContext,
        capture: &Capture,
        cancel: &CancellationToken,
    ) -> Result<Notification, DestinationError> {
        self.spooler.print(&self.printer, capture, cancel).await
    }
}

struct PrinterDiscovery {
    spooler: Spooler,
}

#[async_trait]
impl ChildDiscovery for PrinterDiscovery {
    async fn discover(
        &self,
        _context: &ExportContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<Destination>, DestinationError> {
        let (printers, _) = self.spooler.printers(cancel).await?;
        Ok(printers
            .into_iter()
            .map(|printer| {
                Destination::builder(printer.clone())
                    .text(printer.clone())
                    .localized_failure(&self.spooler.language, i18n::PRINTER_ERROR)
                    .source(SOURCE)
                    .icon(Icon::named("printer"))
                    .export(DirectPrint {
                        spooler: self.spooler.clone(),
                        printer,
                    })
                    .build()
            })
            .collect())
    }
}

/// Names from `lpstat -e`, one destination per line.
pub fn parse_printer_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Default destination from `lpstat -d`
/// (`system default destination: NAME`).
pub fn parse_default_printer(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (_, name) = line.split_once("default destination:")?;
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    })
}

/// Job id from `lp` output (`request id is Office-42 (1 file(s))`).
fn parse_job_id(output: &str) -> Option<&str> {
    output
        .split_once("request id is ")
        .and_then(|(_, rest)| rest.split_whitespace().next())
}
