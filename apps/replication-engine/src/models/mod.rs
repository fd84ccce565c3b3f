//! Core data model shared across the pipeline.
//!
//! A [`TradingSignal`] is the normalized intent derived from an upstream
//! fill; an [`OrderResult`] is the per-venue outcome of mirroring it.

mod order;
mod signal;

pub use order::{
    NonTerminalOrder, OrderRecord, OrderResult, STATUS_FAILED, STATUS_SUCCESS, is_terminal_status,
};
pub use signal::{OrderKind, Side, SignalError, TradingSignal};
