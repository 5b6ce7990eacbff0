//! Core types used throughout CandleGame
//!
//! Defines candles, chart lines, positions, trades and the closed enums
//! (side, risk, interval, game state) the session state machine runs on.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GameError;

/// One OHLCV bar. `time` is the bar open in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.time, 0).single()
    }
}

/// Tradable instrument as listed by the data provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub base_coin: String,
    pub quote_coin: String,
    pub status: String,
}

/// Trade side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Default for Side {
    fn default() -> Self {
        Side::Buy
    }
}

impl Side {
    /// A take-profit above the stop-loss means a long.
    pub fn from_levels(tp: f64, sl: f64) -> Self {
        if tp > sl {
            Side::Buy
        } else {
            Side::Sell
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "Buy"),
            Side::Sell => write!(f, "Sell"),
        }
    }
}

/// Fraction of capital put at risk between entry and stop-loss
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum RiskPercent {
    One,
    Five,
    Ten,
    Fifty,
}

impl Default for RiskPercent {
    fn default() -> Self {
        RiskPercent::One
    }
}

impl RiskPercent {
    pub const ALL: [RiskPercent; 4] = [
        RiskPercent::One,
        RiskPercent::Five,
        RiskPercent::Ten,
        RiskPercent::Fifty,
    ];

    pub fn percent(&self) -> f64 {
        f64::from(u32::from(*self))
    }
}

impl From<RiskPercent> for u32 {
    fn from(risk: RiskPercent) -> Self {
        match risk {
            RiskPercent::One => 1,
            RiskPercent::Five => 5,
            RiskPercent::Ten => 10,
            RiskPercent::Fifty => 50,
        }
    }
}

impl TryFrom<u32> for RiskPercent {
    type Error = GameError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RiskPercent::One),
            5 => Ok(RiskPercent::Five),
            10 => Ok(RiskPercent::Ten),
            50 => Ok(RiskPercent::Fifty),
            other => Err(GameError::InvalidRisk(other)),
        }
    }
}

impl fmt::Display for RiskPercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", u32::from(*self))
    }
}

/// Kline interval offered by the game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    Min1,
    Min5,
    Min15,
    Min30,
    Hour1,
    Hour4,
    Day1,
    Week1,
}

impl Default for Interval {
    fn default() -> Self {
        Interval::Min30
    }
}

impl Interval {
    /// Get duration in seconds
    pub fn duration_secs(&self) -> i64 {
        match self {
            Interval::Min1 => 60,
            Interval::Min5 => 5 * 60,
            Interval::Min15 => 15 * 60,
            Interval::Min30 => 30 * 60,
            Interval::Hour1 => 60 * 60,
            Interval::Hour4 => 4 * 60 * 60,
            Interval::Day1 => 24 * 60 * 60,
            Interval::Week1 => 7 * 24 * 60 * 60,
        }
    }

    /// Interval code used by Bybit V5 kline endpoints
    pub fn bybit_code(&self) -> &'static str {
        match self {
            Interval::Min1 => "1",
            Interval::Min5 => "5",
            Interval::Min15 => "15",
            Interval::Min30 => "30",
            Interval::Hour1 => "60",
            Interval::Hour4 => "240",
            Interval::Day1 => "D",
            Interval::Week1 => "W",
        }
    }

    /// Parse from a label ("15m", "1h") or a Bybit code ("15", "60", "D")
    pub fn parse(s: &str) -> Result<Self, GameError> {
        match s.trim().to_lowercase().as_str() {
            "1m" | "1" => Ok(Interval::Min1),
            "5m" | "5" => Ok(Interval::Min5),
            "15m" | "15" => Ok(Interval::Min15),
            "30m" | "30" => Ok(Interval::Min30),
            "1h" | "60" => Ok(Interval::Hour1),
            "4h" | "240" => Ok(Interval::Hour4),
            "1d" | "d" => Ok(Interval::Day1),
            "1w" | "w" => Ok(Interval::Week1),
            _ => Err(GameError::UnknownInterval(s.to_string())),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Min1 => write!(f, "1m"),
            Interval::Min5 => write!(f, "5m"),
            Interval::Min15 => write!(f, "15m"),
            Interval::Min30 => write!(f, "30m"),
            Interval::Hour1 => write!(f, "1h"),
            Interval::Hour4 => write!(f, "4h"),
            Interval::Day1 => write!(f, "1D"),
            Interval::Week1 => write!(f, "1W"),
        }
    }
}

/// Kind of a price marker on the chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartLineKind {
    Entry,
    TakeProfit,
    StopLoss,
}

impl fmt::Display for ChartLineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartLineKind::Entry => write!(f, "ENTRY"),
            ChartLineKind::TakeProfit => write!(f, "TP"),
            ChartLineKind::StopLoss => write!(f, "SL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartLine {
    pub kind: ChartLineKind,
    pub price: f64,
    /// Quantity override for the PnL label; the position size is used when absent
    pub qty: Option<f64>,
    pub draggable: bool,
}

impl ChartLine {
    pub fn new(kind: ChartLineKind, price: f64, draggable: bool) -> Self {
        Self {
            kind,
            price,
            qty: None,
            draggable,
        }
    }
}

/// Open simulated position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub qty: f64,
    /// Notional at entry (`price * qty`)
    pub value: f64,
    /// Entry price
    pub price: f64,
    pub side: Side,
    pub tp: f64,
    pub sl: f64,
}

/// Why a trade was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    /// Future window ran out with the position still open
    DataExhausted,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::TakeProfit => write!(f, "TAKE_PROFIT"),
            ExitReason::StopLoss => write!(f, "STOP_LOSS"),
            ExitReason::DataExhausted => write!(f, "DATA_EXHAUSTED"),
        }
    }
}

/// Closed trade. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub qty: f64,
    /// Entry price
    pub price: f64,
    pub exit_price: f64,
    pub side: Side,
    pub pnl: f64,
    pub exit_reason: ExitReason,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.pnl >= 0.0
    }
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameState {
    /// Symbol freshly loaded, nothing traded on it yet
    Start,
    InGame,
    TradeEnd,
    /// Future data exhausted with no open position
    SymbolEnd,
    GameOver,
}

impl Default for GameState {
    fn default() -> Self {
        GameState::Start
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameState::Start => write!(f, "start"),
            GameState::InGame => write!(f, "in-game"),
            GameState::TradeEnd => write!(f, "trade-end"),
            GameState::SymbolEnd => write!(f, "symbol-end"),
            GameState::GameOver => write!(f, "gameover"),
        }
    }
}
