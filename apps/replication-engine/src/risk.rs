//! Stateless pre-order risk checks.
//!
//! Violations are terminal for a signal: the consumer acks and drops,
//! no partial adjustment is made.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::config::SyncSettings;
use crate::models::{SignalError, TradingSignal};

/// Risk violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RiskError {
    /// Signal failed structural validation.
    #[error("invalid signal: {0}")]
    InvalidSignal(#[from] SignalError),

    /// Signal symbol does not match the replicated symbol.
    #[error("symbol mismatch: signal {signal} vs configured {configured}")]
    SymbolMismatch {
        /// Symbol carried on the signal.
        signal: String,
        /// Symbol from configuration.
        configured: String,
    },

    /// Quantity exceeds the configured position bound.
    #[error("quantity {quantity} exceeds max position {max_position}")]
    MaxPositionExceeded {
        /// Offending quantity.
        quantity: Decimal,
        /// Configured bound.
        max_position: Decimal,
    },
}

/// Symbol comparison key: uppercase, separators stripped.
///
/// The source venue reports `BTCUSDT` while configuration may carry
/// `BTC-USDT` or `btc/usdt`; all map to the same key.
#[must_use]
pub fn normalize_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | '/'))
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Validate `signal` against the policy bounds in `settings`.
///
/// # Errors
///
/// Returns [`RiskError`] on the first violated bound.
pub fn pre_order_check(signal: &TradingSignal, settings: &SyncSettings) -> Result<(), RiskError> {
    signal.validate()?;

    if normalize_symbol(&signal.symbol) != normalize_symbol(&settings.symbol) {
        return Err(RiskError::SymbolMismatch {
            signal: signal.symbol.clone(),
            configured: settings.symbol.clone(),
        });
    }

    if signal.quantity > settings.max_position {
        return Err(RiskError::MaxPositionExceeded {
            quantity: signal.quantity,
            max_position: settings.max_position,
        });
    }

    Ok(())
}
