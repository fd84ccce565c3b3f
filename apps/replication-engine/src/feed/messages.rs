//! User-data stream event payloads.
//!
//! Binance futures sends terse single-letter field names; only the
//! `ORDER_TRADE_UPDATE` event matters to the pipeline. Numeric fields
//! arrive as strings and are parsed into decimals on conversion.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;

use crate::models::{OrderKind, Side, TradingSignal};

/// Event type carrying order lifecycle updates.
pub const ORDER_TRADE_UPDATE: &str = "ORDER_TRADE_UPDATE";

/// Order status at which a fill is complete.
pub const STATUS_FILLED: &str = "FILLED";

/// Conversion failures for a single event.
#[derive(Debug, Error)]
pub enum EventParseError {
    /// A numeric field did not parse as a decimal.
    #[error("invalid decimal in field {field}: {value}")]
    InvalidDecimal {
        /// Field name on the wire.
        field: &'static str,
        /// Offending value.
        value: String,
    },

    /// The side label was neither BUY nor SELL.
    #[error("unknown side: {0}")]
    UnknownSide(String),
}

/// Envelope of a user-data stream event.
#[derive(Debug, Clone, Deserialize)]
pub struct UserStreamEvent {
    /// Event type tag.
    #[serde(rename = "e")]
    pub event_type: String,
    /// Event time, millisecond epoch.
    #[serde(rename = "E", default)]
    pub event_time: i64,
    /// Order update body, present on `ORDER_TRADE_UPDATE`.
    #[serde(rename = "o")]
    pub order: Option<OrderUpdate>,
}

/// The order-level body of an `ORDER_TRADE_UPDATE` event.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderUpdate {
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Side label (`BUY`/`SELL`).
    #[serde(rename = "S")]
    pub side: String,
    /// Venue order type label.
    #[serde(rename = "o")]
    pub order_type: String,
    /// Order status label.
    #[serde(rename = "X")]
    pub status: String,
    /// Venue-assigned order id.
    #[serde(rename = "i")]
    pub order_id: i64,
    /// Accumulated filled quantity, stringified decimal.
    #[serde(rename = "z")]
    pub accumulated_filled_qty: String,
    /// Average fill price, stringified decimal.
    #[serde(rename = "ap")]
    pub average_price: String,
}

impl OrderUpdate {
    /// Whether this update reports a completed fill.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.status == STATUS_FILLED
    }

    /// Normalize this fill into a [`TradingSignal`].
    ///
    /// # Errors
    ///
    /// Returns [`EventParseError`] when a numeric field does not parse;
    /// the caller skips the single event, never the connection.
    pub fn to_signal(&self, source: &str, event_time: i64) -> Result<TradingSignal, EventParseError> {
        let side = match self.side.as_str() {
            "BUY" => Side::Buy,
            "SELL" => Side::Sell,
            other => return Err(EventParseError::UnknownSide(other.to_string())),
        };

        // Anything that is not an explicit limit fill is mirrored at
        // market; the fill already happened at the source.
        let order_type = if self.order_type == "LIMIT" {
            OrderKind::Limit
        } else {
            OrderKind::Market
        };

        let quantity = Decimal::from_str(&self.accumulated_filled_qty).map_err(|_| {
            EventParseError::InvalidDecimal {
                field: "z",
                value: self.accumulated_filled_qty.clone(),
            }
        })?;
        let price = Decimal::from_str(&self.average_price).map_err(|_| {
            EventParseError::InvalidDecimal {
                field: "ap",
                value: self.average_price.clone(),
            }
        })?;

        Ok(TradingSignal {
            signal_id: self.order_id.to_string(),
            source: source.to_string(),
            symbol: self.symbol.clone(),
            side,
            order_type,
            quantity,
            price,
            leverage: None,
            stop_loss: None,
            take_profit: None,
            timestamp: event_time,
        })
    }
}
