//! Game validation errors
//!
//! Every variant is raised before the session is touched, so a rejected
//! command leaves the snapshot exactly as it was.

use thiserror::Error;

use crate::types::ChartLineKind;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GameError {
    /// Sizing would divide by zero or produce a non-finite quantity
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// TP and SL are on the same side of the entry
    #[error("Invalid trade setup: take-profit {tp} and stop-loss {sl} must straddle entry {price}")]
    InvalidTradeSetup { tp: f64, sl: f64, price: f64 },

    #[error("Invalid price: {0}")]
    InvalidPrice(f64),

    #[error("Risk must be one of 1, 5, 10 or 50 percent, got {0}")]
    InvalidRisk(u32),

    #[error("Unknown interval: {0}")]
    UnknownInterval(String),

    #[error("A position is already open")]
    PositionOpen,

    #[error("No open position")]
    NoPosition,

    #[error("Trade setup missing {0} line")]
    NoTradeSetup(ChartLineKind),

    #[error("No candles loaded")]
    NoCandles,

    #[error("No symbol loaded")]
    NoSymbol,

    #[error("Chart line {0} is locked")]
    LineLocked(usize),

    #[error("Chart line {0} does not exist")]
    LineNotFound(usize),

    #[error("Game is over, start a new game")]
    GameOver,

    #[error("Symbol has no future candles left")]
    SymbolEnded,
}
