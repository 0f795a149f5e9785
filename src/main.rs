//! diffwatch - live git diff of a file
//!
//! Entry point for the `diffwatch` command.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use diffwatch::document::TextBuffer;
use diffwatch::git::{DiffTracker, DiffUpdate};
use diffwatch::observability::{init_metrics, init_tracing};
use diffwatch::{Config, Error, Result};
use serde::Serialize;
use tokio::signal;
use tokio::sync::broadcast;

/// diffwatch - live git diff of a file
#[derive(Parser, Debug)]
#[command(name = "diffwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// File to track
    #[arg(env = "DIFFWATCH_FILE")]
    file: std::path::PathBuf,

    /// Debounce delay in milliseconds
    #[arg(
        long,
        env = "DIFFWATCH_REPARSE_DELAY_MS",
        default_value = "500",
        allow_negative_numbers = true
    )]
    reparse_delay_ms: i64,

    /// Upper bound on debounce postponement in milliseconds
    #[arg(long, env = "DIFFWATCH_MAX_DEBOUNCE_MS")]
    max_debounce_ms: Option<i64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DIFFWATCH_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "DIFFWATCH_LOG_JSON")]
    log_json: bool,

    /// Do not watch the repository for changes
    #[arg(long)]
    no_watch: bool,

    /// Do not reload the file when it changes on disk
    #[arg(long)]
    no_follow_disk: bool,

    /// Report cancelled diffs as failures
    #[arg(long)]
    report_cancellations: bool,

    /// Git executable
    #[arg(long, env = "DIFFWATCH_GIT", default_value = "git")]
    git: std::path::PathBuf,
}

/// One line of output.
#[derive(Serialize)]
struct Line<'a> {
    seq: u64,
    version: u64,
    elapsed_ms: u128,
    #[serde(flatten)]
    diff: &'a diffwatch::git::DiffResult,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with configuration
    init_tracing(&cli.log_level, cli.log_json);

    tracing::info!("diffwatch v{} starting...", env!("CARGO_PKG_VERSION"));

    // Build config from CLI
    let config = Config {
        document: cli.file,
        reparse_delay_ms: cli.reparse_delay_ms,
        max_debounce_ms: cli.max_debounce_ms,
        log_level: cli.log_level,
        log_json: cli.log_json,
        watch: !cli.no_watch,
        follow_disk: !cli.no_follow_disk,
        report_cancellations: cli.report_cancellations,
        git: cli.git,
    };

    tracing::debug!(?config, "Configuration loaded");

    // Validate config
    config.validate()?;

    init_metrics();

    let buffer = Arc::new(TextBuffer::open(&config.document).await?);
    let tracker = DiffTracker::start(buffer, &config).await?;

    let mut results = tracker.subscribe_results()?;
    let mut failures = tracker.subscribe_failures()?;
    let mut dirty = tracker.subscribe_dirty()?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            update = results.recv() => match update {
                Ok(update) => print_update(&update)?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Output fell behind; skipped diffs");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            failure = failures.recv() => match failure {
                Ok(failure) => {
                    tracing::error!(
                        seq = failure.seq,
                        version = failure.version,
                        error = %failure.error,
                        "Diff failed"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = dirty.changed() => {
                if changed.is_err() {
                    break;
                }
                let is_dirty = *dirty.borrow_and_update();
                tracing::debug!(dirty = is_dirty, "Dirty state changed");
            }
        }
    }

    tracker.dispose();
    tracing::info!("diffwatch stopped");
    Ok(())
}

fn print_update(update: &DiffUpdate) -> Result<()> {
    let line = Line {
        seq: update.seq,
        version: update.version(),
        elapsed_ms: update.elapsed.as_millis(),
        diff: &update.value,
    };
    let json = serde_json::to_string(&line)
        .map_err(|e| Error::internal(format!("failed to encode diff: {e}")))?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{json}")?;
    stdout.flush()?;
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn env_of(id: &str) -> Option<String> {
        Cli::command()
            .get_arguments()
            .find(|arg| arg.get_id() == id)
            .and_then(|arg| arg.get_env())
            .map(|env| env.to_string_lossy().into_owned())
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_logging_options_read_environment() {
        assert_eq!(env_of("log_level").as_deref(), Some("DIFFWATCH_LOG_LEVEL"));
        assert_eq!(env_of("log_json").as_deref(), Some("DIFFWATCH_LOG_JSON"));
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["diffwatch", "file.txt"]).unwrap();
        assert_eq!(cli.reparse_delay_ms, 500);
        assert_eq!(cli.log_level, "info");
        assert!(!cli.no_watch);
        assert_eq!(cli.git, std::path::PathBuf::from("git"));
    }
}
