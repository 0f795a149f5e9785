//! Prometheus metrics definitions.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};

/// Triggers accepted by parsers, by origin.
pub static TRIGGERS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "diffwatch_triggers_total",
        "Total number of triggers accepted",
        &["origin"]
    )
    .unwrap()
});

/// Admitted requests discarded before a worker started.
pub static SUPERSEDED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "diffwatch_superseded_total",
        "Admitted parse requests superseded before starting"
    )
    .unwrap()
});

/// Settled parses, by outcome.
pub static PARSES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "diffwatch_parses_total",
        "Total number of settled parses",
        &["outcome"]
    )
    .unwrap()
});

/// Worker wall time.
pub static PARSE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "diffwatch_parse_duration_seconds",
        "Background parse duration in seconds",
        &["parser"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .unwrap()
});

/// Initialize all metrics (call once at startup).
pub fn init_metrics() {
    // Access lazy statics to register them
    let _ = &*TRIGGERS_TOTAL;
    let _ = &*SUPERSEDED_TOTAL;
    let _ = &*PARSES_TOTAL;
    let _ = &*PARSE_DURATION;

    tracing::debug!("Prometheus metrics initialized");
}
