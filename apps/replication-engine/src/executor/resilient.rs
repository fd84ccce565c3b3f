//! Circuit-breaking executor wrapper.
//!
//! Wraps one venue executor with a breaker keyed by venue name. Results
//! and errors propagate unchanged; the breaker only observes the
//! transient/business classification of each outcome.

use std::sync::Arc;

use async_trait::async_trait;

use super::{ExchangeExecutor, ExecutorError};
use crate::models::{OrderResult, TradingSignal};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig};

/// Executor wrapper that short-circuits calls to an unhealthy venue.
pub struct ResilientExecutor {
    name: String,
    inner: Arc<dyn ExchangeExecutor>,
    breaker: CircuitBreaker,
}

impl ResilientExecutor {
    /// Wrap `inner` with a breaker using the default configuration.
    #[must_use]
    pub fn new(inner: Arc<dyn ExchangeExecutor>) -> Self {
        Self::with_config(inner, CircuitBreakerConfig::default())
    }

    /// Wrap `inner` with a breaker using `config`.
    #[must_use]
    pub fn with_config(inner: Arc<dyn ExchangeExecutor>, config: CircuitBreakerConfig) -> Self {
        let name = inner.name().to_string();
        let breaker = CircuitBreaker::new(name.clone(), config);
        Self {
            name,
            inner,
            breaker,
        }
    }

    /// Admit one call through the breaker and record its classification.
    fn admit(&self) -> Result<(), ExecutorError> {
        if self.breaker.try_acquire() {
            Ok(())
        } else {
            Err(ExecutorError::CircuitOpen {
                venue: self.name.clone(),
            })
        }
    }

    fn observe<T>(&self, result: &Result<T, ExecutorError>) {
        match result {
            Err(err) if err.is_transient() => self.breaker.record_failure(),
            _ => self.breaker.record_success(),
        }
    }
}

#[async_trait]
impl ExchangeExecutor for ResilientExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn place_order(&self, signal: &TradingSignal) -> Result<OrderResult, ExecutorError> {
        self.admit()?;
        let result = self.inner.place_order(signal).await;
        self.observe(&result);
        result
    }

    async fn get_order(&self, order_id: &str, symbol: &str) -> Result<OrderResult, ExecutorError> {
        self.admit()?;
        let result = self.inner.get_order(order_id, symbol).await;
        self.observe(&result);
        result
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}
