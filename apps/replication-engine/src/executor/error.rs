//! Typed executor errors and the breaker-facing failure classifier.

use thiserror::Error;

/// Errors surfaced by venue executors.
///
/// The variants carry the classification the circuit breaker needs:
/// transport faults and 5xx-class venue statuses are transient, business
/// rejections are well-formed venue answers and must not open the circuit.
#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    /// Network-level failure reaching the venue.
    #[error("{venue}: transport error: {message}")]
    Transport {
        /// Venue name.
        venue: String,
        /// Error details.
        message: String,
    },

    /// Venue answered with an HTTP status outside 2xx.
    #[error("{venue}: venue returned {status}: {message}")]
    Venue {
        /// Venue name.
        venue: String,
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Order rejected for business reasons (insufficient funds, invalid
    /// symbol, bad parameters).
    #[error("{venue}: order rejected: {reason}")]
    Rejected {
        /// Venue name.
        venue: String,
        /// Rejection reason.
        reason: String,
    },

    /// Venue adapter could not parse the venue's response.
    #[error("{venue}: malformed venue response: {message}")]
    MalformedResponse {
        /// Venue name.
        venue: String,
        /// Parse error details.
        message: String,
    },

    /// Circuit breaker is open for this venue; the call was not attempted.
    #[error("{venue}: circuit open, call rejected")]
    CircuitOpen {
        /// Venue name.
        venue: String,
    },
}

impl ExecutorError {
    /// Venue the error originated from.
    #[must_use]
    pub fn venue(&self) -> &str {
        match self {
            Self::Transport { venue, .. }
            | Self::Venue { venue, .. }
            | Self::Rejected { venue, .. }
            | Self::MalformedResponse { venue, .. }
            | Self::CircuitOpen { venue } => venue,
        }
    }

    /// Whether this error counts as a failure for breaker purposes.
    ///
    /// Transport errors and 5xx-class venue statuses do; so do rejection
    /// messages whose text carries a transient server condition, covering
    /// adapters that can only surface the venue's error string. Everything
    /// else is a well-formed venue response.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Venue { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            Self::Rejected { reason, .. } => message_is_transient(reason),
            Self::MalformedResponse { .. } | Self::CircuitOpen { .. } => false,
        }
    }
}

/// Text heuristic for venues that only expose an error string.
fn message_is_transient(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["500", "502", "503", "504", "internal server error", "service unavailable"]
        .iter()
        .any(|needle| lower.contains(needle))
}
