use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use tokio_util::sync::CancellationToken;

use wayscriber_destinations::capture::file::{expand_tilde, load_capture};
use wayscriber_destinations::config::Config;
use wayscriber_destinations::host::{Host, StartReport};
use wayscriber_destinations::i18n::Language;
use wayscriber_destinations::notification::send_notification;
use wayscriber_destinations::plugin::StartOutcome;
use wayscriber_destinations::ui::{UiDispatch, UiLoop};

const EXIT_FAILED: u8 = 1;
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "wayscriber-export")]
#[command(
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("WAYSCRIBER_EXPORT_GIT_HASH"), ")"),
    about = "Send screenshots to printers, OCR and photo upload services"
)]
struct Cli {
    /// Config file to use instead of ~/.config/wayscriber/destinations.toml
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the destinations of every available plugin
    List {
        /// Also discover children (printers, albums)
        #[arg(long, short = 'c')]
        children: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Export an image file to a destination
    Export {
        /// Destination path, e.g. `OCR`, `Printer/Office` or `Upload/42`
        #[arg(long, short = 't', value_name = "DESTINATION")]
        to: String,

        /// Image to export
        image: PathBuf,

        /// Title used for print jobs (defaults to the file name)
        #[arg(long)]
        title: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Also show the result as a desktop notification
        #[arg(long)]
        notify: bool,
    },

    /// Show which plugins started and why others did not
    Plugins,
}

fn main() -> Result<ExitCode> {
    env_logger::init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    // The main thread becomes the UI thread; background work runs on a Tokio
    // runtime owned by the worker thread.
    let mut ui_loop = UiLoop::new()?;
    let dispatch = ui_loop.dispatch();
    let stop = ui_loop.stop_handle();

    let cancel = CancellationToken::new();
    install_signal_handler(cancel.clone())?;

    let worker = thread::Builder::new()
        .name("export-worker".into())
        .spawn(move || {
            let result = run_worker(cli.command, config, dispatch, cancel);
            stop.stop();
            result
        })
        .context("Failed to spawn worker thread")?;

    ui_loop.run()?;

    let code = worker
        .join()
        .map_err(|_| anyhow!("Worker thread panicked"))??;
    Ok(ExitCode::from(code))
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
}

fn install_signal_handler(cancel: CancellationToken) -> Result<()> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handler")?;

    // Lives until the process exits.
    thread::spawn(move || {
        for sig in signals.forever() {
            log::info!(
                "Received {} - cancelling in-flight work",
                if sig == SIGTERM { "SIGTERM" } else { "SIGINT" }
            );
            cancel.cancel();
        }
    });
    Ok(())
}

fn run_worker(
    command: Commands,
    config: Config,
    dispatch: UiDispatch,
    cancel: CancellationToken,
) -> Result<u8> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    runtime.block_on(async move {
        let host = Host::from_config(&config, dispatch, Arc::new(Language::english()))?;
        let reports = host.start_all(&cancel).await;
        for failure in Host::start_failures(&reports) {
            log::error!("{}", failure);
        }

        let outcome = match command {
            Commands::List { children, json } => list(&host, children, json, &cancel).await,
            Commands::Export {
                to,
                image,
                title,
                json,
                notify,
            } => export(&host, &to, &image, title, json, notify, &cancel).await,
            Commands::Plugins => {
                print_plugins(&host, &reports);
                Ok(0)
            }
        };

        host.shutdown_all(&CancellationToken::new()).await;
        outcome
    })
}

async fn list(host: &Host, children: bool, json: bool, cancel: &CancellationToken) -> Result<u8> {
    let entries = host.list(children, cancel).await;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).context("Failed to serialize destinations")?
        );
        return Ok(0);
    }

    if entries.is_empty() {
        println!("No destinations available");
        return Ok(0);
    }
    for entry in entries {
        let marker = if entry.exportable { "" } else { " (group)" };
        println!("{:<32} {}{}", entry.path, entry.label, marker);
    }
    Ok(0)
}

async fn export(
    host: &Host,
    to: &str,
    image: &Path,
    title: Option<String>,
    json: bool,
    notify: bool,
    cancel: &CancellationToken,
) -> Result<u8> {
    let path = expand_tilde(&image.to_string_lossy());
    let mut capture = load_capture(&path)
        .with_context(|| format!("Failed to load image {}", path.display()))?;
    if let Some(title) = title {
        capture = capture.with_title(title);
    }

    let notification = match host.export(to, &capture, cancel).await? {
        Ok(notification) => notification,
        Err(_) => {
            eprintln!("Export cancelled");
            return Ok(EXIT_CANCELLED);
        }
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&notification).context("Failed to serialize result")?
        );
    } else {
        println!("{}", notification);
    }

    if notify && let Err(e) = send_notification(&notification).await {
        log::warn!("{}", e);
    }

    Ok(if notification.is_success() { 0 } else { EXIT_FAILED })
}

fn print_plugins(host: &Host, reports: &[StartReport]) {
    for (name, state) in host.plugin_states() {
        let detail = reports
            .iter()
            .find(|report| report.plugin == name)
            .and_then(|report| match &report.outcome {
                Ok(StartOutcome::Registered(count)) => Some(format!("{} destination(s)", count)),
                Ok(StartOutcome::Unavailable(reason)) => Some(reason.clone()),
                Ok(StartOutcome::Cancelled) => Some("start cancelled".to_string()),
                Err(err) => Some(err.clone()),
            })
            .unwrap_or_default();
        println!("{}: {} ({})", name, state, detail);
    }
}
