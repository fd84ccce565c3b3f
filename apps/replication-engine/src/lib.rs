// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Replication Engine - Trade-Replication Bus
//!
//! Mirrors fills from one upstream venue onto N downstream venues with
//! at-least-once delivery and per-target idempotency.
//!
//! # Pipeline
//!
//! ```text
//! source listener → durable stream → consumer → ┬ risk pre-check
//!                                               ├ idempotency claims
//!                                               ├ N-way executor fan-out
//!                                               └ order record store
//! ```
//!
//! The reconciler reads the order store out-of-band and converges local
//! status with venue-reported status.
//!
//! # Guarantees
//!
//! - At-least-once per stream entry; three deliveries, then dead letter.
//! - At most one successful placement per `(target, signal, quantity,
//!   price)` within the 24 h claim window.
//! - Per-target circuit breaking on transient venue failures only.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Boot configuration and shared runtime settings.
pub mod config;

/// Venue executor contract, resilience wrapper, and the paper venue.
pub mod executor;

/// Upstream fill ingestion.
pub mod feed;

/// Per-(signal, target) idempotency claims.
pub mod idempotency;

/// Core data model.
pub mod models;

/// Metrics.
pub mod observability;

/// Durable order records.
pub mod persistence;

/// Background status reconciliation.
pub mod reconcile;

/// Resilience patterns.
pub mod resilience;

/// Pre-order risk checks.
pub mod risk;

/// Durable signal stream, producer, and consumer.
pub mod stream;

pub use config::{AppConfig, SharedSettings, SyncSettings};
pub use executor::{ExchangeExecutor, ExecutorError, PaperExecutor, ResilientExecutor};
pub use models::{OrderKind, OrderRecord, OrderResult, Side, TradingSignal};
pub use stream::{SignalConsumer, SignalProducer, SignalStream};
