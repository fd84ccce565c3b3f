//! Paper-trading executor.
//!
//! Simulated venue that fills every order immediately. Real venue
//! adapters live outside this crate behind the same trait; the paper
//! executor lets the full pipeline run without venue credentials.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{ExchangeExecutor, ExecutorError};
use crate::models::{OrderResult, TradingSignal};

#[derive(Debug, Clone)]
struct PaperOrder {
    symbol: String,
    status: String,
}

/// In-memory executor that acknowledges and fills every order.
pub struct PaperExecutor {
    name: String,
    orders: Mutex<HashMap<String, PaperOrder>>,
}

impl PaperExecutor {
    /// Create a paper venue labeled `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            orders: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ExchangeExecutor for PaperExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn place_order(&self, signal: &TradingSignal) -> Result<OrderResult, ExecutorError> {
        let order_id = Uuid::new_v4().to_string();
        let mut orders = self
            .orders
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        orders.insert(
            order_id.clone(),
            PaperOrder {
                symbol: signal.symbol.clone(),
                status: "FILLED".to_string(),
            },
        );
        drop(orders);

        tracing::debug!(
            venue = %self.name,
            symbol = %signal.symbol,
            side = %signal.side,
            quantity = %signal.quantity,
            order_id = %order_id,
            "Paper order filled"
        );
        Ok(OrderResult::success(&self.name, &signal.symbol, order_id))
    }

    async fn get_order(&self, order_id: &str, symbol: &str) -> Result<OrderResult, ExecutorError> {
        let orders = self
            .orders
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let order = orders
            .get(order_id)
            .ok_or_else(|| ExecutorError::Rejected {
                venue: self.name.clone(),
                reason: format!("unknown order {order_id}"),
            })?;

        let mut result = OrderResult::success(&self.name, symbol, order_id.to_string());
        result.status = order.status.clone();
        Ok(result)
    }

    async fn close(&self) {}
}
