//! Per-venue order outcomes and persisted order records.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Local submission outcome label.
pub const STATUS_SUCCESS: &str = "success";
/// Local submission failure label.
pub const STATUS_FAILED: &str = "failed";

/// Venue-reported statuses (plus the local failure label) after which an
/// order will never change again. Everything else is non-terminal: a
/// locally-successful submission may still be `NEW` or `PARTIALLY_FILLED`
/// on the venue.
const TERMINAL_STATUSES: &[&str] = &["FILLED", "CANCELLED", "REJECTED", STATUS_FAILED];

/// Whether a status label is terminal for reconciliation purposes.
#[must_use]
pub fn is_terminal_status(status: &str) -> bool {
    TERMINAL_STATUSES.contains(&status)
}

/// Outcome of one executor call against one venue.
///
/// `status` is `success`/`failed` for a submission, or the venue's own
/// lifecycle label (`NEW`, `FILLED`, ...) when returned by a status lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    /// Venue name, as reported by the executor.
    pub exchange: String,
    /// Symbol the order was placed on.
    pub symbol: String,
    /// Venue-assigned order id; empty when the submission failed.
    #[serde(default)]
    pub order_id: String,
    /// Outcome or venue lifecycle label.
    pub status: String,
    /// Populated when the call failed.
    #[serde(default)]
    pub error_message: String,
    /// Millisecond epoch at which the result was produced.
    pub timestamp: i64,
}

impl OrderResult {
    /// Successful submission carrying the venue order id.
    #[must_use]
    pub fn success(exchange: &str, symbol: &str, order_id: String) -> Self {
        Self {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            order_id,
            status: STATUS_SUCCESS.to_string(),
            error_message: String::new(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Failed submission. Persisted anyway: the record is the audit trail.
    #[must_use]
    pub fn failure(exchange: &str, symbol: &str, error_message: String) -> Self {
        Self {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            order_id: String::new(),
            status: STATUS_FAILED.to_string(),
            error_message,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Whether this result reports a successful submission.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// One persisted executor-call outcome, as stored in the order table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Venue name.
    pub exchange: String,
    /// Symbol.
    pub symbol: String,
    /// Venue-assigned order id; empty for failed submissions.
    pub order_id: String,
    /// Client-side id attached at submission time.
    pub client_order_id: String,
    /// Order side label.
    pub side: String,
    /// Order type label.
    pub order_type: String,
    /// Price carried on the signal.
    pub price: Decimal,
    /// Scaled quantity submitted to the venue.
    pub quantity: Decimal,
    /// Current status label.
    pub status: String,
    /// Error message for failed submissions.
    pub error_message: String,
}

/// Projection used by the reconciler: orders still worth polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonTerminalOrder {
    /// Venue name, used to route to the right executor.
    pub exchange: String,
    /// Symbol to pass to the status lookup.
    pub symbol: String,
    /// Venue-assigned order id.
    pub order_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(is_terminal_status("FILLED"));
        assert!(is_terminal_status("CANCELLED"));
        assert!(is_terminal_status("REJECTED"));
        assert!(is_terminal_status("failed"));
        assert!(!is_terminal_status("NEW"));
        assert!(!is_terminal_status("PARTIALLY_FILLED"));
        assert!(!is_terminal_status("success"));
    }

    #[test]
    fn success_result_carries_order_id() {
        let result = OrderResult::success("okx", "BTCUSDT", "ord-1".to_string());
        assert!(result.is_success());
        assert_eq!(result.order_id, "ord-1");
        assert!(result.error_message.is_empty());
    }

    #[test]
    fn failure_result_carries_message() {
        let result = OrderResult::failure("okx", "BTCUSDT", "503 from venue".to_string());
        assert!(!result.is_success());
        assert!(result.order_id.is_empty());
        assert_eq!(result.error_message, "503 from venue");
    }
}
