//! End-to-end pipeline tests: produce → consume → fan-out → settle.
//!
//! Runs the real consumer against the in-memory stream, the in-memory
//! idempotency store, and an in-memory order database; only the venue
//! executors are scripted.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

use replication_engine::config::{SharedSettings, SyncSettings};
use replication_engine::executor::{ExchangeExecutor, ExecutorError};
use replication_engine::idempotency::InMemoryIdempotencyStore;
use replication_engine::models::{OrderKind, OrderResult, Side, TradingSignal};
use replication_engine::persistence::{OrderRecordStore, TursoOrderStore};
use replication_engine::stream::{
    InMemorySignalStream, SignalConsumer, SignalProducer, SignalStream,
};

// =============================================================================
// Scripted executor
// =============================================================================

/// Per-call behavior of a scripted venue.
#[derive(Debug, Clone, Copy)]
enum Step {
    Succeed,
    FailWith(u16),
}

/// Venue double recording every call; behavior driven by a script that
/// defaults to success once exhausted.
struct ScriptedExecutor {
    name: String,
    script: Mutex<VecDeque<Step>>,
    placed: Mutex<Vec<TradingSignal>>,
    get_calls: AtomicU32,
}

impl ScriptedExecutor {
    fn succeeding(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            placed: Mutex::new(Vec::new()),
            get_calls: AtomicU32::new(0),
        })
    }

    fn scripted(name: &str, steps: &[Step]) -> Arc<Self> {
        let executor = Self::succeeding(name);
        executor
            .script
            .lock()
            .unwrap()
            .extend(steps.iter().copied());
        executor
    }

    fn placed_signals(&self) -> Vec<TradingSignal> {
        self.placed.lock().unwrap().clone()
    }

    fn place_count(&self) -> usize {
        self.placed.lock().unwrap().len()
    }
}

#[async_trait]
impl ExchangeExecutor for ScriptedExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn place_order(&self, signal: &TradingSignal) -> Result<OrderResult, ExecutorError> {
        let call_index = {
            let mut placed = self.placed.lock().unwrap();
            placed.push(signal.clone());
            placed.len()
        };

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Succeed);

        match step {
            Step::Succeed => Ok(OrderResult::success(
                &self.name,
                &signal.symbol,
                format!("{}-{call_index}", self.name),
            )),
            Step::FailWith(status) => Err(ExecutorError::Venue {
                venue: self.name.clone(),
                status,
                message: format!("venue returned {status}"),
            }),
        }
    }

    async fn get_order(&self, order_id: &str, symbol: &str) -> Result<OrderResult, ExecutorError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let mut result = OrderResult::success(&self.name, symbol, order_id.to_string());
        result.status = "FILLED".to_string();
        Ok(result)
    }

    async fn close(&self) {}
}

// =============================================================================
// Harness
// =============================================================================

struct Pipeline {
    stream: Arc<InMemorySignalStream>,
    orders: Arc<TursoOrderStore>,
    consumer: SignalConsumer,
}

impl Pipeline {
    async fn new(targets: Vec<Arc<ScriptedExecutor>>, settings: SyncSettings) -> Self {
        let stream = Arc::new(InMemorySignalStream::new());
        let orders = Arc::new(TursoOrderStore::in_memory().await.unwrap());

        let consumer = SignalConsumer::new(
            Arc::clone(&stream) as Arc<dyn SignalStream>,
            Arc::new(InMemoryIdempotencyStore::new()),
            Arc::clone(&orders) as Arc<dyn OrderRecordStore>,
            targets
                .into_iter()
                .map(|t| t as Arc<dyn ExchangeExecutor>)
                .collect(),
            SharedSettings::new(settings),
            CancellationToken::new(),
        );

        Self {
            stream,
            orders,
            consumer,
        }
    }

    /// Deliver and process exactly one entry.
    async fn step(&self) {
        let entry = self
            .stream
            .read_next()
            .await
            .unwrap()
            .expect("an entry should be deliverable");
        self.consumer.handle_entry(entry).await;
    }
}

fn settings() -> SyncSettings {
    SyncSettings {
        symbol: "BTCUSDT".to_string(),
        position_ratio: Decimal::from_str("0.5").unwrap(),
        max_position: Decimal::from(10),
        ..SyncSettings::default()
    }
}

fn fill_signal() -> TradingSignal {
    TradingSignal {
        signal_id: "42".to_string(),
        source: "up".to_string(),
        symbol: "BTCUSDT".to_string(),
        side: Side::Buy,
        order_type: OrderKind::Market,
        quantity: Decimal::ONE,
        price: Decimal::ZERO,
        leverage: None,
        stop_loss: None,
        take_profit: None,
        timestamp: 1_700_000_000_000,
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn happy_path_mirrors_to_every_target() {
    let a = ScriptedExecutor::succeeding("A");
    let b = ScriptedExecutor::succeeding("B");
    let pipeline = Pipeline::new(vec![Arc::clone(&a), Arc::clone(&b)], settings()).await;

    pipeline.stream.produce(&fill_signal()).await.unwrap();
    pipeline.step().await;

    // Each target got exactly one order, scaled by the position ratio.
    for target in [&a, &b] {
        let placed = target.placed_signals();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].quantity, Decimal::from_str("0.5").unwrap());
        assert_eq!(placed[0].signal_id, "42");
    }

    assert!(pipeline.stream.pending_ids().is_empty(), "entry acked");
    assert!(pipeline.stream.dead_letters().is_empty());
    assert_eq!(pipeline.orders.count_with_status("success").await.unwrap(), 2);
}

#[tokio::test]
async fn duplicate_entry_places_no_additional_orders() {
    let a = ScriptedExecutor::succeeding("A");
    let b = ScriptedExecutor::succeeding("B");
    let pipeline = Pipeline::new(vec![Arc::clone(&a), Arc::clone(&b)], settings()).await;

    // The same fill produced twice (at-least-once upstream).
    pipeline.stream.produce(&fill_signal()).await.unwrap();
    pipeline.stream.produce(&fill_signal()).await.unwrap();
    pipeline.step().await;
    pipeline.step().await;

    // Both entries acked, but only two orders total across both targets.
    assert!(pipeline.stream.pending_ids().is_empty());
    assert_eq!(a.place_count() + b.place_count(), 2);
    assert_eq!(pipeline.orders.count_with_status("success").await.unwrap(), 2);
}

#[tokio::test]
async fn partial_failure_retries_only_the_failed_target() {
    // B fails transiently on deliveries 1 and 2, succeeds on 3.
    let a = ScriptedExecutor::succeeding("A");
    let b = ScriptedExecutor::scripted("B", &[Step::FailWith(503), Step::FailWith(503)]);
    let pipeline = Pipeline::new(vec![Arc::clone(&a), Arc::clone(&b)], settings()).await;

    pipeline.stream.produce(&fill_signal()).await.unwrap();
    pipeline.step().await;
    pipeline.step().await;
    pipeline.step().await;

    // A's claim survived its success: redeliveries skip it. B's claim
    // was released on each failure, so only B was retried.
    assert_eq!(a.place_count(), 1);
    assert_eq!(b.place_count(), 3);
    assert!(pipeline.stream.pending_ids().is_empty(), "acked on delivery 3");
    assert!(pipeline.stream.dead_letters().is_empty());
    assert_eq!(pipeline.orders.count_with_status("success").await.unwrap(), 2);
    assert_eq!(pipeline.orders.count_with_status("failed").await.unwrap(), 2);
}

#[tokio::test]
async fn exhausted_delivery_budget_moves_entry_to_dead_letter() {
    // A fails with a 500 on every delivery.
    let a = ScriptedExecutor::scripted(
        "A",
        &[Step::FailWith(500), Step::FailWith(500), Step::FailWith(500)],
    );
    let b = ScriptedExecutor::succeeding("B");
    let pipeline = Pipeline::new(vec![Arc::clone(&a), Arc::clone(&b)], settings()).await;

    pipeline.stream.produce(&fill_signal()).await.unwrap();
    pipeline.step().await;
    pipeline.step().await;
    pipeline.step().await;

    // After the third delivery the entry is dead-lettered and acked.
    let dead = pipeline.stream.dead_letters();
    assert_eq!(dead.len(), 1);
    assert!(pipeline.stream.pending_ids().is_empty());

    // Original values travel to the dead letter intact.
    let payload = dead[0].payload().unwrap();
    let carried: TradingSignal = serde_json::from_str(payload).unwrap();
    assert_eq!(carried, fill_signal());

    // B filled once on the first delivery; its claim suppressed the rest.
    assert_eq!(a.place_count(), 3);
    assert_eq!(b.place_count(), 1);
}

#[tokio::test]
async fn risk_rejection_is_terminal_without_executor_calls() {
    let a = ScriptedExecutor::succeeding("A");
    let pipeline = Pipeline::new(vec![Arc::clone(&a)], settings()).await;

    let mut oversized = fill_signal();
    oversized.quantity = Decimal::from(100);
    pipeline.stream.produce(&oversized).await.unwrap();
    pipeline.step().await;

    assert_eq!(a.place_count(), 0);
    assert!(pipeline.stream.pending_ids().is_empty(), "acked");
    assert!(pipeline.stream.dead_letters().is_empty());
}

#[tokio::test]
async fn symbol_mismatch_is_rejected_by_risk_check() {
    let a = ScriptedExecutor::succeeding("A");
    let pipeline = Pipeline::new(vec![Arc::clone(&a)], settings()).await;

    let mut wrong_symbol = fill_signal();
    wrong_symbol.symbol = "DOGEUSDT".to_string();
    pipeline.stream.produce(&wrong_symbol).await.unwrap();
    pipeline.step().await;

    assert_eq!(a.place_count(), 0);
    assert!(pipeline.stream.pending_ids().is_empty());
}

#[tokio::test]
async fn reconciler_converges_status_once() {
    use replication_engine::models::OrderRecord;
    use replication_engine::reconcile::Reconciler;

    let store = Arc::new(TursoOrderStore::in_memory().await.unwrap());
    store
        .save(&OrderRecord {
            exchange: "A".to_string(),
            symbol: "BTCUSDT".to_string(),
            order_id: "X".to_string(),
            client_order_id: String::new(),
            side: "BUY".to_string(),
            order_type: "MARKET".to_string(),
            price: Decimal::ZERO,
            quantity: Decimal::ONE,
            status: "NEW".to_string(),
            error_message: String::new(),
        })
        .await
        .unwrap();

    let a = ScriptedExecutor::succeeding("A");
    let reconciler = Reconciler::new(
        Arc::clone(&store) as Arc<dyn OrderRecordStore>,
        vec![Arc::clone(&a) as Arc<dyn ExchangeExecutor>],
        CancellationToken::new(),
    );

    reconciler.reconcile_once().await;
    assert_eq!(store.status_of("X").await.unwrap().as_deref(), Some("FILLED"));
    assert_eq!(a.get_calls.load(Ordering::SeqCst), 1);

    // The order is terminal now: no further venue lookups.
    reconciler.reconcile_once().await;
    assert_eq!(a.get_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_payload_never_reaches_executors() {
    let a = ScriptedExecutor::succeeding("A");
    let pipeline = Pipeline::new(vec![Arc::clone(&a)], settings()).await;

    pipeline
        .stream
        .append(&[("payload".to_string(), "{not json".to_string())])
        .await
        .unwrap();
    pipeline.step().await;

    assert_eq!(a.place_count(), 0);
    assert!(pipeline.stream.pending_ids().is_empty());
}
