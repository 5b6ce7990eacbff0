//! Configuration section types

use anyhow::{anyhow, bail, Result};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::candles::WindowPolicy;
use crate::game::GameRules;
use crate::position::PositionConfig;
use crate::resolver::TieBreak;
use crate::types::{Interval, RiskPercent, Side};

#[derive(Debug, Clone, Deserialize)]
pub struct GameCfg {
    /// Capital a new game starts with
    pub initial_capital: f64,
    /// Closed trades per game before game over
    pub max_trades: usize,
    /// Default risk per trade (1, 5, 10 or 50)
    pub risk: u32,
    /// Candle interval code ("1m" .. "1W")
    pub interval: String,
    /// TP line offset from the last close (0.05 = 5%)
    pub tp_offset_pct: f64,
    /// SL line offset from the last close
    pub sl_offset_pct: f64,
    /// Bar touching both TP and SL: "take_profit_first" or "stop_loss_first"
    pub tie_break: String,
    /// Hidden bars left before the future window is topped up
    pub future_low_water: usize,
    /// Visible bars from the left edge that trigger a history fetch
    pub history_edge_bars: usize,
    /// Bars revealed at chart start; midpoint when unset
    pub lookback: Option<usize>,
}

impl GameCfg {
    /// Build validated game rules from this section
    pub fn rules(&self) -> Result<GameRules> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            bail!("game.initial_capital must be positive, got {}", self.initial_capital);
        }
        if self.max_trades == 0 {
            bail!("game.max_trades must be at least 1");
        }
        for (name, pct) in [
            ("game.tp_offset_pct", self.tp_offset_pct),
            ("game.sl_offset_pct", self.sl_offset_pct),
        ] {
            if !pct.is_finite() || pct <= 0.0 || pct >= 1.0 {
                bail!("{} must be in (0, 1), got {}", name, pct);
            }
        }

        let default_risk = RiskPercent::try_from(self.risk)?;
        let default_interval = Interval::parse(&self.interval)?;
        let tie_break = TieBreak::parse(&self.tie_break)
            .ok_or_else(|| anyhow!("game.tie_break: unknown value {:?}", self.tie_break))?;

        Ok(GameRules {
            initial_capital: self.initial_capital,
            max_trades: self.max_trades,
            default_risk,
            default_interval,
            position: PositionConfig {
                tp_offset_pct: self.tp_offset_pct,
                sl_offset_pct: self.sl_offset_pct,
            },
            tie_break,
            window: WindowPolicy {
                future_low_water: self.future_low_water,
                history_edge_bars: self.history_edge_bars,
            },
            lookback: self.lookback,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderCfg {
    /// REST endpoint
    pub base_url: String,
    /// Bybit product category (linear, spot, inverse)
    pub category: String,
    /// Instruments kept for play, matched case-insensitively
    pub quote_suffix: String,
    /// HTTP timeout in seconds
    pub timeout_secs: u64,
    /// Candles per kline request
    pub page_limit: usize,
}

impl ProviderCfg {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Which side the headless player takes each round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerSide {
    Buy,
    Sell,
    Alternate,
}

impl PlayerSide {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "buy" | "long" => Ok(PlayerSide::Buy),
            "sell" | "short" => Ok(PlayerSide::Sell),
            "alternate" | "alt" => Ok(PlayerSide::Alternate),
            other => bail!("autoplay.side: unknown value {:?}", other),
        }
    }

    /// Side for the given zero-based round
    pub fn for_round(&self, round: usize) -> Side {
        match self {
            PlayerSide::Buy => Side::Buy,
            PlayerSide::Sell => Side::Sell,
            PlayerSide::Alternate if round % 2 == 0 => Side::Buy,
            PlayerSide::Alternate => Side::Sell,
        }
    }
}

impl fmt::Display for PlayerSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerSide::Buy => write!(f, "buy"),
            PlayerSide::Sell => write!(f, "sell"),
            PlayerSide::Alternate => write!(f, "alternate"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutoplayCfg {
    /// Delay between simulated bars in milliseconds
    pub tick_ms: u64,
    /// Bars per round before the player gives up waiting
    pub max_steps: usize,
    /// buy, sell or alternate
    pub side: String,
}

impl AutoplayCfg {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn player_side(&self) -> Result<PlayerSide> {
        PlayerSide::parse(&self.side)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingCfg {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// "plain" or "json"
    pub format: String,
}

impl LoggingCfg {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}
