//! In-memory stream with consumer-group delivery semantics.
//!
//! Mirrors the backend contract the consumer relies on: entries are
//! delivered in append order, an unacked entry stays pending and is
//! redelivered on a later read (the claim-on-idle responsibility the
//! real stream carries), and delivery counts are tracked per entry.
//! Backs the integration tests and credential-less local runs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{SignalStream, StreamEntry, StreamError};

#[derive(Debug, Default)]
struct Inner {
    /// Append log, in arrival order.
    entries: Vec<StreamEntry>,
    /// Next undelivered index (the `>` cursor).
    cursor: usize,
    /// Pending-entries list: id → delivery count.
    pending: HashMap<String, u64>,
    /// Delivery order of pending ids, oldest first.
    pending_order: Vec<String>,
    next_seq: u64,
    dead_letters: Vec<StreamEntry>,
}

/// In-memory [`SignalStream`].
pub struct InMemorySignalStream {
    inner: Mutex<Inner>,
    block: Duration,
}

impl Default for InMemorySignalStream {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySignalStream {
    /// Stream with a short blocking read suited to tests.
    #[must_use]
    pub fn new() -> Self {
        Self::with_block(Duration::from_millis(10))
    }

    /// Stream with a custom blocking read timeout.
    #[must_use]
    pub fn with_block(block: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            block,
        }
    }

    /// Entries copied to the dead-letter stream so far.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<StreamEntry> {
        self.lock().dead_letters.clone()
    }

    /// Ids still on the pending list.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<String> {
        self.lock().pending_order.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn take_next(&self) -> Option<StreamEntry> {
        let mut inner = self.lock();

        // Unacked deliveries are eligible for redelivery first.
        if let Some(id) = inner.pending_order.first().cloned() {
            if let Some(count) = inner.pending.get_mut(&id) {
                *count += 1;
            }
            let entry = inner.entries.iter().find(|e| e.id == id).cloned();
            return entry;
        }

        if inner.cursor < inner.entries.len() {
            let entry = inner.entries[inner.cursor].clone();
            inner.cursor += 1;
            inner.pending.insert(entry.id.clone(), 1);
            inner.pending_order.push(entry.id.clone());
            return Some(entry);
        }

        None
    }
}

#[async_trait]
impl SignalStream for InMemorySignalStream {
    async fn append(&self, fields: &[(String, String)]) -> Result<String, StreamError> {
        let mut inner = self.lock();
        inner.next_seq += 1;
        let id = format!("{}-0", inner.next_seq);
        inner.entries.push(StreamEntry {
            id: id.clone(),
            fields: fields.to_vec(),
        });
        Ok(id)
    }

    async fn read_next(&self) -> Result<Option<StreamEntry>, StreamError> {
        if let Some(entry) = self.take_next() {
            return Ok(Some(entry));
        }
        tokio::time::sleep(self.block).await;
        Ok(self.take_next())
    }

    async fn delivery_count(&self, entry_id: &str) -> Result<u64, StreamError> {
        Ok(self.lock().pending.get(entry_id).copied().unwrap_or(0))
    }

    async fn ack(&self, entry_id: &str) -> Result<(), StreamError> {
        let mut inner = self.lock();
        inner.pending.remove(entry_id);
        inner.pending_order.retain(|id| id != entry_id);
        Ok(())
    }

    async fn dead_letter(&self, entry: &StreamEntry) -> Result<(), StreamError> {
        self.lock().dead_letters.push(entry.clone());
        Ok(())
    }
}
