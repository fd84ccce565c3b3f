//! Prometheus metrics for signal processing and venue execution.
//!
//! The exporter serves `/metrics` on its own listener; recording helpers
//! are free functions so call sites stay one line.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Error type for metrics initialization.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to configure the exporter.
    #[error("metrics configuration error: {0}")]
    Configuration(String),
    /// Failed to install the exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Start the Prometheus exporter on `listen_addr`.
///
/// # Errors
///
/// Returns [`MetricsError`] when the listener cannot be configured or
/// installed (e.g. port already in use).
pub fn init_metrics(listen_addr: SocketAddr) -> Result<(), MetricsError> {
    // Latency buckets from 1ms to 30s: venue round-trips dominate.
    let latency_buckets = [
        0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
    ];

    PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .set_buckets(&latency_buckets)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(addr = %listen_addr, "Prometheus metrics exporter started");
    Ok(())
}

/// Record a completed order attempt against one venue.
///
/// `outcome` is `success` or `failed`.
pub fn record_order_outcome(venue: &str, outcome: &str) {
    counter!(
        "orders_total",
        "exchange" => venue.to_string(),
        "status" => outcome.to_string()
    )
    .increment(1);
}

/// Record a suppressed duplicate claim for one venue.
pub fn record_duplicate(venue: &str) {
    counter!("duplicate_signals_total", "exchange" => venue.to_string()).increment(1);
}

/// Record end-to-end processing latency for one stream entry.
pub fn record_signal_latency(seconds: f64) {
    histogram!("signal_processing_seconds").record(seconds);
}

/// Record a signal dropped by the risk pre-check.
pub fn record_risk_rejection() {
    counter!("risk_rejections_total").increment(1);
}

/// Record an entry moved to the dead-letter stream.
pub fn record_dead_letter() {
    counter!("dead_letters_total").increment(1);
}

/// Record a stream read/ack error outside the blocking timeout.
pub fn record_stream_error(operation: &str) {
    counter!("stream_errors_total", "operation" => operation.to_string()).increment(1);
}

/// Record a circuit breaker state transition.
pub fn record_circuit_transition(venue: &str, state: &str) {
    counter!(
        "circuit_transitions_total",
        "exchange" => venue.to_string(),
        "state" => state.to_string()
    )
    .increment(1);
}
