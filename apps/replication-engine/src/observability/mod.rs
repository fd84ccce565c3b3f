//! Metrics for the replication pipeline.

mod metrics;

pub use metrics::{
    MetricsError, init_metrics, record_circuit_transition, record_dead_letter, record_duplicate,
    record_order_outcome, record_risk_rejection, record_signal_latency, record_stream_error,
};
