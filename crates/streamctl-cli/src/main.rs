//! streamctl command-line client
//!
//! Drives a local streaming application over its remote-control channel:
//! one-shot status, start, stop, quality and exit requests, plus a `watch`
//! mode that prints session events as they happen.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use streamctl_core::{Config, Remote, RemoteError, StartEvent, StatusInfo, StopEvent};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Remote control for a local streaming application
#[derive(Parser, Debug)]
#[command(name = "streamctl")]
#[command(version, about, long_about = None)]
#[command(after_help = "\
Examples:
  streamctl status                 Show what is on air
  streamctl start \"My Game\"        Go live from a title
  streamctl stop \"My Game\"         End the stream from a title
  streamctl quality high           Change the stream quality
  streamctl watch --json           Stream session events as JSON lines
")]
struct Cli {
    /// Host the streaming application listens on (overrides config)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Remote-control port (overrides config)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Config file (defaults to the user config directory)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    /// Seconds to wait for a response
    #[arg(long, value_name = "SECS", default_value_t = 5, global = true)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Show the current streaming status
    Status,

    /// Start streaming from a title
    Start {
        /// Title of the streaming source
        title: String,
    },

    /// Stop streaming from a title
    Stop {
        /// Title of the streaming source
        title: String,
    },

    /// Change the stream quality
    Quality {
        /// Quality name understood by the application
        quality: String,
    },

    /// Ask the streaming application to exit
    Exit,

    /// Print connection and streaming events until interrupted
    Watch,
}

/// Set up logging to stderr, plus a file when `log_file` is given.
/// Debug builds default to debug level, release builds to info.
fn setup_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let default_level = if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("streamctl={default_level}")));

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(filter)
            .init();
        return Ok(None);
    };

    let file_name = path
        .file_name()
        .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let file_appender = tracing_appender::rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(filter)
        .init();

    Ok(Some(guard))
}

/// Load the config file and apply command-line overrides.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_default().context("Failed to load config")?,
    };

    if let Some(host) = &cli.host {
        config.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = setup_logging(cli.log_file.as_deref())?;

    let config = load_config(&cli)?;
    debug!("Using endpoint {}", config.endpoint());

    let mut remote = Remote::start(&config).context("Failed to start session")?;
    let timeout = Duration::from_secs(cli.timeout);

    let result = match cli.command {
        Commands::Status => run_status(&remote, timeout, cli.json).await,
        Commands::Start { title } => {
            let request = remote.start_streaming(title.as_str());
            let outcome = wait_for("Start request", timeout, request).await;
            report(outcome, cli.json, &format!("Streaming started from '{title}'"))
        }
        Commands::Stop { title } => {
            let request = remote.stop_streaming(title.as_str());
            let outcome = wait_for("Stop request", timeout, request).await;
            report(outcome, cli.json, &format!("Streaming stopped from '{title}'"))
        }
        Commands::Quality { quality } => {
            let request = remote.update_quality(quality.as_str());
            let outcome = wait_for("Quality update", timeout, request).await;
            report(outcome, cli.json, &format!("Quality set to '{quality}'"))
        }
        Commands::Exit => run_exit(&remote, timeout, cli.json).await,
        Commands::Watch => run_watch(&remote, cli.json).await,
    };

    remote.shutdown();
    result
}

/// Await a request, giving up after `timeout`.
async fn wait_for<T>(
    what: &str,
    timeout: Duration,
    request: impl Future<Output = std::result::Result<T, RemoteError>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, request).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(anyhow::Error::new(err).context(format!("{what} failed"))),
        Err(_) => bail!("{what} timed out after {}s", timeout.as_secs()),
    }
}

fn report(outcome: Result<()>, json: bool, success: &str) -> Result<()> {
    outcome?;
    if json {
        println!("{}", json!({ "ok": true }));
    } else {
        println!("{success}");
    }
    Ok(())
}

async fn run_status(remote: &Remote, timeout: Duration, json: bool) -> Result<()> {
    let info = wait_for("Status request", timeout, remote.status()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        print_status(&info);
    }
    Ok(())
}

fn print_status(info: &StatusInfo) {
    println!("Status:  {}", info.status);
    println!("Quality: {}", info.quality);
    if !info.source_title.is_empty() {
        println!("Source:  {}", info.source_title);
    }
    if !info.user_name.is_empty() {
        println!("User:    {}", info.user_name);
    }
}

/// Send an exit request and wait for the application to drop the connection.
async fn run_exit(remote: &Remote, timeout: Duration, json: bool) -> Result<()> {
    let (tx, mut outcome) = mpsc::unbounded_channel::<Option<RemoteError>>();
    let closed_tx = tx.clone();
    remote.register_disconnect_handler(move || {
        let _ = closed_tx.send(None);
    });
    remote.request_exit(move |err| {
        let _ = tx.send(Some(err));
    });

    match tokio::time::timeout(timeout, outcome.recv()).await {
        Ok(Some(Some(err))) => Err(anyhow::Error::new(err).context("Exit request failed")),
        Ok(Some(None)) => report(Ok(()), json, "Streaming application exited"),
        Ok(None) => bail!("Session stopped before the exit request completed"),
        Err(_) => {
            warn!(
                "Streaming application still connected after {}s",
                timeout.as_secs()
            );
            report(Ok(()), json, "Exit requested")
        }
    }
}

#[derive(Debug)]
enum WatchEvent {
    Connected,
    Disconnected,
    Started(StartEvent),
    Stopped(StopEvent),
}

impl WatchEvent {
    fn name(&self) -> &'static str {
        match self {
            WatchEvent::Connected => "connected",
            WatchEvent::Disconnected => "disconnected",
            WatchEvent::Started(_) => "started",
            WatchEvent::Stopped(_) => "stopped",
        }
    }

    fn to_json(&self, time: &str) -> serde_json::Value {
        match self {
            WatchEvent::Started(event) => json!({
                "time": time,
                "event": self.name(),
                "details": event,
            }),
            WatchEvent::Stopped(event) => json!({
                "time": time,
                "event": self.name(),
                "details": event,
            }),
            WatchEvent::Connected | WatchEvent::Disconnected => json!({
                "time": time,
                "event": self.name(),
            }),
        }
    }

    fn describe(&self) -> String {
        match self {
            WatchEvent::Connected => "Connected".to_string(),
            WatchEvent::Disconnected => "Disconnected".to_string(),
            WatchEvent::Started(event) => format!(
                "Started streaming '{}' to {} ({})",
                event.source_title, event.service_provider, event.stream_url
            ),
            WatchEvent::Stopped(event) => {
                format!("Stopped streaming '{}'", event.source_title)
            }
        }
    }
}

/// Print session events until Ctrl-C.
async fn run_watch(remote: &Remote, json: bool) -> Result<()> {
    let (tx, mut events) = mpsc::unbounded_channel();

    let connected = tx.clone();
    remote.register_connect_handler(move || {
        let _ = connected.send(WatchEvent::Connected);
    });
    let disconnected = tx.clone();
    remote.register_disconnect_handler(move || {
        let _ = disconnected.send(WatchEvent::Disconnected);
    });
    let started = tx.clone();
    remote.register_start_event_handler(move |event| {
        let _ = started.send(WatchEvent::Started(event));
    });
    remote.register_stop_event_handler(move |event| {
        let _ = tx.send(WatchEvent::Stopped(event));
    });

    if !json {
        eprintln!("Watching {} (Ctrl-C to stop)", remote.endpoint());
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    bail!("Session stopped");
                };
                let time = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
                if json {
                    println!("{}", event.to_json(&time));
                } else {
                    println!("[{time}] {}", event.describe());
                }
            }

            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                return Ok(());
            }
        }
    }
}
