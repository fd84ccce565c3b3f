//! Normalized trade intent derived from an upstream fill.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    /// Buy side.
    Buy,
    /// Sell side.
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type carried on a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    /// Execute at market.
    Market,
    /// Execute at the carried limit price.
    Limit,
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::Limit => write!(f, "LIMIT"),
        }
    }
}

/// Validation errors for a signal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignalError {
    /// Quantity must be strictly positive.
    #[error("quantity must be > 0, got {0}")]
    NonPositiveQuantity(Decimal),

    /// Limit orders must carry a positive price.
    #[error("limit order requires price > 0, got {0}")]
    NonPositiveLimitPrice(Decimal),

    /// The signal id must be present.
    #[error("signal_id is empty")]
    EmptySignalId,
}

/// A normalized trade intent derived from a source-venue fill.
///
/// Immutable once produced onto the stream: the consumer scales a local
/// copy per target but never mutates the persisted payload. `quantity` is
/// the source-side fill quantity, unscaled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    /// Unique id within the source venue across the retention window.
    pub signal_id: String,
    /// Source venue tag (e.g. "binance").
    pub source: String,
    /// Symbol in the source venue's convention.
    pub symbol: String,
    /// Order side.
    pub side: Side,
    /// Order type.
    pub order_type: OrderKind,
    /// Fill quantity on the source venue.
    pub quantity: Decimal,
    /// Limit price; zero for market orders.
    #[serde(default)]
    pub price: Decimal,
    /// Leverage multiplier, when the source reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leverage: Option<u32>,
    /// Stop-loss price, when the source reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Decimal>,
    /// Take-profit price, when the source reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Decimal>,
    /// Millisecond epoch of the source event.
    pub timestamp: i64,
}

impl TradingSignal {
    /// Validate the structural invariants of a signal.
    ///
    /// # Errors
    ///
    /// Returns a [`SignalError`] when the signal id is empty, the quantity
    /// is not positive, or a limit order carries a non-positive price.
    pub fn validate(&self) -> Result<(), SignalError> {
        if self.signal_id.is_empty() {
            return Err(SignalError::EmptySignalId);
        }
        if self.quantity <= Decimal::ZERO {
            return Err(SignalError::NonPositiveQuantity(self.quantity));
        }
        if self.order_type == OrderKind::Limit && self.price <= Decimal::ZERO {
            return Err(SignalError::NonPositiveLimitPrice(self.price));
        }
        Ok(())
    }

    /// Copy of this signal with the quantity scaled by `ratio`.
    ///
    /// Used by the consumer to apply the configured position ratio without
    /// touching the payload that stays on the stream.
    #[must_use]
    pub fn scaled(&self, ratio: Decimal) -> Self {
        let mut scaled = self.clone();
        scaled.quantity = self.quantity * ratio;
        scaled
    }
}
