//! Consumer-group loop: read, guard, fan out, settle.
//!
//! One entry is in flight at a time; within an entry the fan-out
//! branches run concurrently and are joined before the outcome is
//! decided. Poison messages and risk violations are acked and dropped so
//! they cannot stall the stream; execution failures lean on redelivery,
//! and the delivery budget routes hopeless entries to the dead letter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{SignalStream, StreamEntry};
use crate::config::SharedSettings;
use crate::executor::{ExchangeExecutor, ExecutorError};
use crate::idempotency::IdempotencyStore;
use crate::models::{OrderRecord, OrderResult, TradingSignal};
use crate::observability;
use crate::persistence::OrderRecordStore;
use crate::risk;

/// Backoff after a read error other than the blocking timeout.
const READ_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Consumer-group member driving the fan-out pipeline.
pub struct SignalConsumer {
    stream: Arc<dyn SignalStream>,
    idempotency: Arc<dyn IdempotencyStore>,
    orders: Arc<dyn OrderRecordStore>,
    targets: Vec<Arc<dyn ExchangeExecutor>>,
    settings: SharedSettings,
    shutdown: CancellationToken,
}

impl SignalConsumer {
    /// Wire a consumer over its collaborators.
    #[must_use]
    pub fn new(
        stream: Arc<dyn SignalStream>,
        idempotency: Arc<dyn IdempotencyStore>,
        orders: Arc<dyn OrderRecordStore>,
        targets: Vec<Arc<dyn ExchangeExecutor>>,
        settings: SharedSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            stream,
            idempotency,
            orders,
            targets,
            settings,
            shutdown,
        }
    }

    /// Run until the stop token fires.
    ///
    /// In-flight entry processing is never cancelled mid-way; the token
    /// is only observed between entries.
    pub async fn run(&self) {
        tracing::info!(targets = self.targets.len(), "Signal consumer started");

        loop {
            let read = tokio::select! {
                () = self.shutdown.cancelled() => break,
                read = self.stream.read_next() => read,
            };

            match read {
                Ok(Some(entry)) => self.handle_entry(entry).await,
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "Stream read failed, backing off");
                    observability::record_stream_error("read");
                    tokio::select! {
                        () = self.shutdown.cancelled() => break,
                        () = tokio::time::sleep(READ_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        tracing::info!("Signal consumer stopped");
    }

    /// Process one delivery end to end and settle it against the stream.
    pub async fn handle_entry(&self, entry: StreamEntry) {
        let started = Instant::now();
        self.process_entry(&entry).await;
        observability::record_signal_latency(started.elapsed().as_secs_f64());
    }

    async fn process_entry(&self, entry: &StreamEntry) {
        let Some(payload) = entry.payload() else {
            tracing::warn!(entry_id = %entry.id, "Entry has no payload field, dropping");
            self.ack_entry(&entry.id).await;
            return;
        };

        let signal: TradingSignal = match serde_json::from_str(payload) {
            Ok(signal) => signal,
            Err(err) => {
                tracing::warn!(entry_id = %entry.id, error = %err, "Malformed payload, dropping");
                self.ack_entry(&entry.id).await;
                return;
            }
        };

        tracing::info!(
            entry_id = %entry.id,
            signal_id = %signal.signal_id,
            side = %signal.side,
            symbol = %signal.symbol,
            "Processing signal"
        );

        let settings = self.settings.snapshot();

        // Idempotency keys are derived from the quantity as produced,
        // before any scaling.
        let original_quantity = signal.quantity;

        if let Err(err) = risk::pre_order_check(&signal, &settings) {
            tracing::warn!(signal_id = %signal.signal_id, error = %err, "Risk check failed");
            observability::record_risk_rejection();
            self.ack_entry(&entry.id).await;
            return;
        }

        let scaled = signal.scaled(settings.position_ratio);

        let branches = self
            .targets
            .iter()
            .map(|target| self.execute_on_target(Arc::clone(target), &scaled, original_quantity));
        let outcomes = future::join_all(branches).await;

        if outcomes.iter().all(Result::is_ok) {
            self.ack_entry(&entry.id).await;
            tracing::info!(entry_id = %entry.id, "Signal replicated to all targets");
        } else {
            self.handle_failure(entry, settings.max_retries).await;
        }
    }

    /// One fan-out branch: claim, place, persist, classify.
    async fn execute_on_target(
        &self,
        target: Arc<dyn ExchangeExecutor>,
        signal: &TradingSignal,
        original_quantity: Decimal,
    ) -> Result<(), ExecutorError> {
        let venue = target.name().to_string();

        match self
            .idempotency
            .claim(&venue, &signal.signal_id, original_quantity, signal.price)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(venue = %venue, signal_id = %signal.signal_id, "Duplicate signal, skipping");
                observability::record_duplicate(&venue);
                return Ok(());
            }
            Err(err) => {
                // Unreachable claim store is treated as non-duplicate.
                tracing::warn!(venue = %venue, error = %err, "Idempotency store unreachable, proceeding");
            }
        }

        let client_order_id = Uuid::new_v4().to_string();
        let outcome = target.place_order(signal).await;

        match outcome {
            Ok(result) => {
                let succeeded = result.is_success();
                self.persist_result(&result, signal, &client_order_id).await;
                observability::record_order_outcome(&venue, &result.status);

                if succeeded {
                    Ok(())
                } else {
                    // Adapters may report failure inside the result; the
                    // claim must not outlive a failed placement.
                    self.release_claim(&venue, signal, original_quantity).await;
                    Err(ExecutorError::Rejected {
                        venue,
                        reason: result.error_message,
                    })
                }
            }
            Err(err) => {
                tracing::warn!(venue = %venue, signal_id = %signal.signal_id, error = %err, "Order placement failed");
                let failed = OrderResult::failure(&venue, &signal.symbol, err.to_string());
                self.persist_result(&failed, signal, &client_order_id).await;
                observability::record_order_outcome(&venue, &failed.status);
                self.release_claim(&venue, signal, original_quantity).await;
                Err(err)
            }
        }
    }

    /// Drop the claim so a redelivery may retry this target.
    async fn release_claim(&self, venue: &str, signal: &TradingSignal, original_quantity: Decimal) {
        if let Err(err) = self
            .idempotency
            .release(venue, &signal.signal_id, original_quantity, signal.price)
            .await
        {
            tracing::warn!(venue = %venue, error = %err, "Failed to release idempotency claim");
        }
    }

    async fn persist_result(
        &self,
        result: &OrderResult,
        signal: &TradingSignal,
        client_order_id: &str,
    ) {
        let record = OrderRecord {
            exchange: result.exchange.clone(),
            symbol: result.symbol.clone(),
            order_id: result.order_id.clone(),
            client_order_id: client_order_id.to_string(),
            side: signal.side.to_string(),
            order_type: signal.order_type.to_string(),
            price: signal.price,
            quantity: signal.quantity,
            status: result.status.clone(),
            error_message: result.error_message.clone(),
        };

        // The order store may lag the stream; a lost record does not
        // fail the branch.
        if let Err(err) = self.orders.save(&record).await {
            tracing::warn!(
                exchange = %record.exchange,
                order_id = %record.order_id,
                error = %err,
                "Failed to persist order record"
            );
        }
    }

    /// Retry-or-dead-letter decision for a partially failed entry.
    async fn handle_failure(&self, entry: &StreamEntry, max_deliveries: u32) {
        let deliveries = match self.stream.delivery_count(&entry.id).await {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(entry_id = %entry.id, error = %err, "Pending-entries query failed");
                observability::record_stream_error("pending");
                0
            }
        };

        if deliveries >= u64::from(max_deliveries) {
            tracing::warn!(
                entry_id = %entry.id,
                deliveries,
                "Delivery budget exhausted, moving to dead letter"
            );
            match self.stream.dead_letter(entry).await {
                Ok(()) => {
                    observability::record_dead_letter();
                    self.ack_entry(&entry.id).await;
                }
                Err(err) => {
                    // Leave the entry pending rather than lose it.
                    tracing::warn!(entry_id = %entry.id, error = %err, "Dead-letter append failed");
                    observability::record_stream_error("dead_letter");
                }
            }
        } else {
            tracing::warn!(
                entry_id = %entry.id,
                deliveries,
                "Entry left pending for redelivery"
            );
        }
    }

    async fn ack_entry(&self, entry_id: &str) {
        if let Err(err) = self.stream.ack(entry_id).await {
            tracing::warn!(entry_id = %entry_id, error = %err, "Ack failed");
            observability::record_stream_error("ack");
        }
    }
}
