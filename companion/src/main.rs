//! Cadwatch Companion - CAD work-session monitor.
//!
//! This binary reads document lifecycle events from stdin (one JSON
//! event per line, as emitted by the CAD-side plugin) and reports work
//! sessions to the backend API.
//!
//! # Commands
//!
//! - `cadwatch-companion run`: Start the monitoring loop
//! - `cadwatch-companion resolve <path>`: Show the project identity a
//!   file path resolves to
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cadwatch_companion::config::Config;
use cadwatch_companion::coordinator::MonitoringCoordinator;
use cadwatch_companion::error::MonitorError;
use cadwatch_companion::processor::{DocumentProcessor, LoggingProcessor};
use cadwatch_companion::reporter::{HttpReporter, TelemetryReporter};
use cadwatch_companion::source::{DocumentEventSource, StdinEventSource};
use cadwatch_companion::ProjectPathResolver;

/// Cadwatch Companion - CAD work-session monitor.
///
/// Watches open CAD documents and reports per-file work sessions to
/// the Cadwatch backend.
#[derive(Parser, Debug)]
#[command(name = "cadwatch-companion")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    CADWATCH_API_URL          Backend base URL (required for 'run')
    CADWATCH_ENGINEER         Engineer identity (default: current user)
    CADWATCH_COMPANION_ID     Companion identifier (default: hostname)
    CADWATCH_DEBOUNCE_MS      File-change debounce window (default: 2000)
    CADWATCH_HEARTBEAT_SECS   Heartbeat interval (default: 30)
    CADWATCH_CHANNEL_CAPACITY Internal channel capacity (default: 256)

EXAMPLES:
    # Check which project a file belongs to
    cadwatch-companion resolve '/projects/2025_PROJ_466_Bomba_Hidraulica/montagem/bomba.iam'

    # Start monitoring
    export CADWATCH_API_URL=https://cadwatch.example.com
    cadwatch-companion run
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the monitoring loop.
    ///
    /// Reads host events from stdin and reports work sessions to the
    /// backend. Requires CADWATCH_API_URL.
    Run,

    /// Resolve a file path to its project identity and print it.
    Resolve {
        /// File path to resolve.
        path: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Resolve { path } => run_resolve(&path),
        Command::Run => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            runtime.block_on(run_companion())
        }
    }
}

/// Resolves a path against the default project rules and prints the
/// result.
fn run_resolve(path: &str) -> Result<()> {
    let resolver = ProjectPathResolver::new();
    let project = resolver.resolve(path);

    if project.is_valid_project {
        println!("project id:   {}", project.project_id);
        println!("project name: {}", project.display_name);
        println!("folder:       {}", project.folder_path);
        println!("phase:        {}", project.phase);
    } else {
        println!("no project rule matches this path");
    }

    Ok(())
}

/// Runs the monitoring loop until SIGINT/SIGTERM or stdin closes.
async fn run_companion() -> Result<()> {
    init_logging();

    info!("Starting Cadwatch Companion");

    let config = Config::from_env().context("Failed to load configuration")?;

    info!(
        api_url = %config.api_url,
        engineer = %config.engineer,
        companion_id = %config.companion_id,
        debounce_ms = config.debounce_window.as_millis() as u64,
        "Configuration loaded"
    );

    let reporter = HttpReporter::new(config.api_url.clone())
        .context("Failed to create telemetry reporter")?;
    if !reporter.check_health().await {
        // Monitoring is still useful with a dead backend; telemetry is
        // best-effort and sessions keep being tracked locally.
        warn!("Backend is unreachable, telemetry will be dropped until it recovers");
    }

    let processor: Arc<dyn DocumentProcessor> = Arc::new(LoggingProcessor);
    let reporter: Arc<dyn TelemetryReporter> = Arc::new(reporter);

    let coordinator = Arc::new(MonitoringCoordinator::new(&config, processor, reporter));

    let (event_tx, event_rx) = mpsc::channel(config.channel_capacity);
    let source = StdinEventSource::new();
    if !source.subscribe(event_tx).await {
        return Err(
            MonitorError::EventSource("stdin subscription refused".to_string()).into(),
        );
    }

    // Adopt documents the host already has open before this process
    // attached.
    coordinator.reconcile(&source).await;

    Arc::clone(&coordinator)
        .run(event_rx, config.heartbeat_interval, wait_for_shutdown())
        .await;

    source.unsubscribe().await;

    info!("Cadwatch Companion stopped");
    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
