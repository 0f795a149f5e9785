//! Structured logging, tracing spans and metrics.
//!
//! Provides setup for observability using the `tracing` crate with:
//! - Structured logging with JSON output option
//! - Configurable log levels
//! - Spans around every background parse

mod metrics;

pub use metrics::{
    init_metrics, PARSES_TOTAL, PARSE_DURATION, SUPERSEDED_TOTAL, TRIGGERS_TOTAL,
};

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Initialize tracing with the given level and output format.
///
/// `RUST_LOG` takes precedence over `level` when set. Logs go to stderr so
/// stdout stays reserved for diff output.
///
/// # Panics
///
/// Panics if a tracing subscriber has already been initialized in this process.
pub fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        let json_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default().with(env_filter).with(json_layer).init();
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default().with(env_filter).with(fmt_layer).init();
    }

    tracing::debug!("Tracing initialized: level={}, json={}", level, json);
}

/// Span constructors shared across the crate.
pub mod spans {
    use tracing::{info_span, Span};

    /// Span wrapping a single worker invocation.
    #[must_use]
    pub fn parse_span(parser: &str, seq: u64, version: u64, origin: &str) -> Span {
        info_span!("parse", parser = %parser, seq, version, origin = %origin)
    }

    /// Span for a git subprocess.
    #[must_use]
    pub fn git_span(command: &str) -> Span {
        info_span!("git", command = %command)
    }
}
