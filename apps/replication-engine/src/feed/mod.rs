//! Upstream fill ingestion.
//!
//! A single long-lived subscription to the source venue's user-data
//! stream, normalizing fills into signals for the producer.

mod binance;
mod messages;

pub use binance::{BinanceListener, FeedError};
pub use messages::{EventParseError, OrderUpdate, UserStreamEvent};
