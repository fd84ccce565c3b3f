//! Background order-status reconciliation.
//!
//! Venue-reported status is the truth: a locally-successful submission
//! may still be `NEW` or `PARTIALLY_FILLED` on the venue. The reconciler
//! polls every non-terminal order and converges the record store. It
//! never creates or cancels orders.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::executor::ExchangeExecutor;
use crate::persistence::OrderRecordStore;

/// Tick cadence of the reconciliation loop.
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

/// Periodic status reconciler.
pub struct Reconciler {
    orders: Arc<dyn OrderRecordStore>,
    executors: HashMap<String, Arc<dyn ExchangeExecutor>>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl Reconciler {
    /// Build a reconciler routing by executor name.
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderRecordStore>,
        executors: Vec<Arc<dyn ExchangeExecutor>>,
        shutdown: CancellationToken,
    ) -> Self {
        let executors = executors
            .into_iter()
            .map(|executor| (executor.name().to_string(), executor))
            .collect();
        Self {
            orders,
            executors,
            interval: RECONCILE_INTERVAL,
            shutdown,
        }
    }

    /// Override the tick cadence (tests).
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the tick loop until shutdown.
    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            venues = self.executors.len(),
            "Reconciler started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await; // the first tick fires immediately

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                _ = ticker.tick() => self.reconcile_once().await,
            }
        }

        tracing::info!("Reconciler stopped");
    }

    /// One reconciliation pass over all non-terminal orders.
    ///
    /// One record's failure never aborts the tick.
    pub async fn reconcile_once(&self) {
        let open_orders = match self.orders.find_non_terminal().await {
            Ok(orders) => orders,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to scan non-terminal orders");
                return;
            }
        };

        for order in open_orders {
            let Some(executor) = self.executors.get(&order.exchange) else {
                tracing::warn!(exchange = %order.exchange, "No executor for exchange, skipping");
                continue;
            };

            let reported = match executor.get_order(&order.order_id, &order.symbol).await {
                Ok(result) => result,
                Err(err) => {
                    tracing::warn!(
                        exchange = %order.exchange,
                        order_id = %order.order_id,
                        error = %err,
                        "Order status lookup failed"
                    );
                    continue;
                }
            };

            if reported.status.is_empty() {
                continue;
            }

            match self.orders.set_status(&order.order_id, &reported.status).await {
                Ok(()) => tracing::info!(
                    exchange = %order.exchange,
                    order_id = %order.order_id,
                    status = %reported.status,
                    "Order status reconciled"
                ),
                Err(err) => tracing::warn!(
                    order_id = %order.order_id,
                    error = %err,
                    "Failed to update order status"
                ),
            }
        }
    }
}
