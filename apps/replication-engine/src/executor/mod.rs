//! Uniform per-venue executor contract.
//!
//! Every downstream venue is driven through [`ExchangeExecutor`]; the
//! pipeline never sees venue wire details. Adapters map side, order type
//! and symbol into venue-native conventions behind this trait.

mod error;
mod paper;
mod resilient;

pub use error::ExecutorError;
pub use paper::PaperExecutor;
pub use resilient::ResilientExecutor;

use async_trait::async_trait;

use crate::models::{OrderResult, TradingSignal};

/// Operations every target venue exposes to the pipeline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeExecutor: Send + Sync {
    /// Stable venue identifier: metrics label, idempotency namespace, and
    /// reconciler routing key.
    fn name(&self) -> &str;

    /// Submit an order derived from `signal`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] when the venue call fails; the caller
    /// persists a failed [`OrderResult`] built from the error so the
    /// attempt stays on the audit trail.
    async fn place_order(&self, signal: &TradingSignal) -> Result<OrderResult, ExecutorError>;

    /// Look up the venue-reported status of a previously placed order.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] when the lookup fails.
    async fn get_order(&self, order_id: &str, symbol: &str) -> Result<OrderResult, ExecutorError>;

    /// Release venue resources.
    async fn close(&self);
}
