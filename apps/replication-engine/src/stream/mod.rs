//! Durable signal stream.
//!
//! The stream owns in-flight signals: a consumer-group member reads one
//! entry at a time, and an entry stays on the pending list until it is
//! acked or copied to the dead-letter stream. Redis streams are the
//! reference backend; an in-memory backend with the same delivery
//! semantics backs the tests.

mod consumer;
mod memory;
mod redis;

pub use consumer::SignalConsumer;
pub use memory::InMemorySignalStream;
pub use redis::RedisSignalStream;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::TradingSignal;

/// Primary stream name.
pub const SIGNALS_STREAM: &str = "signals:trading";
/// Dead-letter stream name.
pub const DLQ_STREAM: &str = "signals:dlq";
/// Consumer group name.
pub const CONSUMER_GROUP: &str = "trading-group";
/// This process's consumer name within the group.
pub const CONSUMER_NAME: &str = "processor-1";

/// Field under which the serialized signal travels.
pub const PAYLOAD_FIELD: &str = "payload";

/// Errors from the stream backend.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The stream backend is unreachable or misbehaving.
    #[error("stream backend error: {0}")]
    Backend(#[from] ::redis::RedisError),

    /// A signal could not be serialized for the wire.
    #[error("failed to serialize signal: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One record read from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Stream-assigned monotonic id, used for ack/pending bookkeeping.
    pub id: String,
    /// Opaque field pairs as they sit on the stream.
    pub fields: Vec<(String, String)>,
}

impl StreamEntry {
    /// The serialized signal, when present.
    #[must_use]
    pub fn payload(&self) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == PAYLOAD_FIELD)
            .map(|(_, value)| value.as_str())
    }
}

/// Log-structured stream operations the pipeline relies on.
#[async_trait]
pub trait SignalStream: Send + Sync {
    /// Append a record; the stream assigns the id.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError`] when the append fails.
    async fn append(&self, fields: &[(String, String)]) -> Result<String, StreamError>;

    /// Block for the next entry for this consumer, up to the backend's
    /// configured timeout. `Ok(None)` means the wait timed out.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError`] on read errors other than the timeout.
    async fn read_next(&self) -> Result<Option<StreamEntry>, StreamError>;

    /// How many times the stream has handed out the entry.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError`] when the pending-entries query fails.
    async fn delivery_count(&self, entry_id: &str) -> Result<u64, StreamError>;

    /// Acknowledge an entry, removing it from the pending list.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError`] when the ack fails.
    async fn ack(&self, entry_id: &str) -> Result<(), StreamError>;

    /// Copy an entry's values to the dead-letter stream.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError`] when the dead-letter append fails.
    async fn dead_letter(&self, entry: &StreamEntry) -> Result<(), StreamError>;
}

/// Capability to put signals on the stream.
///
/// The source listener and the admin webhook both depend on this alone.
#[async_trait]
pub trait SignalProducer: Send + Sync {
    /// Serialize `signal` and append it; returns the stream-assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError`] when serialization or the append fails.
    async fn produce(&self, signal: &TradingSignal) -> Result<String, StreamError>;
}

#[async_trait]
impl<S: SignalStream> SignalProducer for S {
    async fn produce(&self, signal: &TradingSignal) -> Result<String, StreamError> {
        let payload = serde_json::to_string(signal)?;
        let fields = vec![
            (PAYLOAD_FIELD.to_string(), payload),
            ("retry_count".to_string(), "0".to_string()),
        ];
        let id = self.append(&fields).await?;
        tracing::debug!(
            signal_id = %signal.signal_id,
            entry_id = %id,
            "Signal produced"
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_field_lookup() {
        let entry = StreamEntry {
            id: "1-0".to_string(),
            fields: vec![
                ("retry_count".to_string(), "0".to_string()),
                (PAYLOAD_FIELD.to_string(), "{}".to_string()),
            ],
        };
        assert_eq!(entry.payload(), Some("{}"));

        let bare = StreamEntry {
            id: "2-0".to_string(),
            fields: vec![("other".to_string(), "x".to_string())],
        };
        assert_eq!(bare.payload(), None);
    }
}
