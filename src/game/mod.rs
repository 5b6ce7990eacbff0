//! Game Session - the state machine a front end drives
//!
//! A session is a plain value: every command validates first and only then
//! mutates, so a rejected command leaves the snapshot untouched.
//!
//! ```text
//! start ──open──▶ in-game ──hit──▶ trade-end ──open──▶ in-game
//!                    │                 │
//!                    └─no data─────────┴──▶ symbol-end / gameover
//! ```

pub mod controller;
pub mod loader;

pub use controller::{GameController, LoadingState};
pub use loader::prepare_chart;

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::candles::{self, WindowPolicy};
use crate::error::GameError;
use crate::position::{compute_size_from_risk, line_price, PositionConfig, PositionManager};
use crate::resolver::{StepOutcome, TieBreak, TradeResolver};
use crate::types::{
    Candle, ChartLine, ChartLineKind, GameState, Interval, Position, RiskPercent, Side, Trade,
};

/// Trades per game before `GameOver`
pub const MAX_TRADES: usize = 5;
/// Capital a new game starts with
pub const INITIAL_CAPITAL: f64 = 1000.0;

/// Tunables shared by every session of a game
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameRules {
    pub initial_capital: f64,
    pub max_trades: usize,
    pub default_risk: RiskPercent,
    pub default_interval: Interval,
    pub position: PositionConfig,
    pub tie_break: TieBreak,
    pub window: WindowPolicy,
    /// Bars shown before the hidden future; midpoint split when `None`
    pub lookback: Option<usize>,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            initial_capital: INITIAL_CAPITAL,
            max_trades: MAX_TRADES,
            default_risk: RiskPercent::default(),
            default_interval: Interval::default(),
            position: PositionConfig::default(),
            tie_break: TieBreak::default(),
            window: WindowPolicy::default(),
            lookback: None,
        }
    }
}

/// End-of-game scoreboard
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GameSummary {
    pub wins: usize,
    pub losses: usize,
    pub total_pnl: f64,
    pub trades: usize,
    pub max_trades: usize,
    pub capital: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameSession {
    /// Generation id, regenerated on every start/skip
    pub id: Uuid,
    pub symbol: Option<String>,
    pub capital: f64,
    pub risk: RiskPercent,
    /// Append-only, chronological
    pub trades: Vec<Trade>,
    pub position: Option<Position>,
    pub state: GameState,
    pub position_size: f64,
    pub chart_lines: Vec<ChartLine>,
    /// Revealed candles
    pub candles_past: Vec<Candle>,
    /// Hidden candles, consumed one per step
    pub candles_future: VecDeque<Candle>,
    pub interval: Interval,
    pub rules: GameRules,
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new(GameRules::default())
    }
}

impl GameSession {
    pub fn new(rules: GameRules) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: None,
            capital: rules.initial_capital,
            risk: rules.default_risk,
            trades: Vec::new(),
            position: None,
            state: GameState::Start,
            position_size: 0.0,
            chart_lines: Vec::new(),
            candles_past: Vec::new(),
            candles_future: VecDeque::new(),
            interval: rules.default_interval,
            rules,
        }
    }

    fn positions(&self) -> PositionManager {
        PositionManager::new(self.rules.position)
    }

    fn resolver(&self) -> TradeResolver {
        TradeResolver::new(self.rules.tie_break, self.rules.max_trades, self.positions())
    }

    // ─────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────

    /// Load a new symbol and reset capital and trades to their initial values
    pub fn start_game(&mut self, symbol: &str, candles: &[Candle]) -> Result<(), GameError> {
        let (past, future) = self.split(candles)?;
        self.trades.clear();
        self.capital = self.rules.initial_capital;
        self.load_chart(symbol, past, future);
        info!(
            symbol = %symbol,
            interval = %self.interval,
            past = self.candles_past.len(),
            future = self.candles_future.len(),
            capital = self.capital,
            "New game started"
        );
        Ok(())
    }

    /// Load another symbol; trades and capital carry over
    pub fn skip_chart(&mut self, symbol: &str, candles: &[Candle]) -> Result<(), GameError> {
        self.ensure_can_leave_chart()?;
        let (past, future) = self.split(candles)?;
        self.load_chart(symbol, past, future);
        info!(
            symbol = %symbol,
            past = self.candles_past.len(),
            future = self.candles_future.len(),
            trades = self.trades.len(),
            "Chart skipped"
        );
        Ok(())
    }

    /// Checks shared by skip and the async controller before it fetches
    pub fn ensure_can_leave_chart(&self) -> Result<(), GameError> {
        if self.state == GameState::GameOver {
            return Err(GameError::GameOver);
        }
        if self.position.is_some() {
            return Err(GameError::PositionOpen);
        }
        Ok(())
    }

    fn split(&self, candles: &[Candle]) -> Result<(Vec<Candle>, Vec<Candle>), GameError> {
        let (past, future) = candles::split_window(candles, self.rules.lookback);
        if past.is_empty() {
            return Err(GameError::NoCandles);
        }
        Ok((past, future))
    }

    fn load_chart(&mut self, symbol: &str, past: Vec<Candle>, future: Vec<Candle>) {
        self.id = Uuid::new_v4();
        self.symbol = Some(symbol.to_string());
        self.candles_past = past;
        self.candles_future = future.into();
        self.position = None;
        self.chart_lines.clear();
        self.position_size = 0.0;
        self.state = GameState::Start;
    }

    /// Back to `Start` on the same chart, dropping the trade setup
    pub fn reset_chart(&mut self) -> Result<(), GameError> {
        self.ensure_can_leave_chart()?;
        self.chart_lines.clear();
        self.position_size = 0.0;
        self.state = GameState::Start;
        Ok(())
    }

    /// Interval used by the next start/skip
    pub fn set_interval(&mut self, interval: Interval) {
        self.interval = interval;
    }

    // ─────────────────────────────────────────────────────────────────
    // Trade setup
    // ─────────────────────────────────────────────────────────────────

    /// Seed ENTRY/TP/SL around the last close and size from risk
    pub fn setup_trade(&mut self) -> Result<(), GameError> {
        if self.state == GameState::GameOver {
            return Err(GameError::GameOver);
        }
        if self.position.is_some() {
            return Err(GameError::PositionOpen);
        }
        let last_close = self
            .candles_past
            .last()
            .map(|c| c.close)
            .ok_or(GameError::NoCandles)?;

        let positions = self.positions();
        let lines = positions.setup_lines(last_close);
        let size = positions
            .size_from_lines(self.capital, self.risk, &lines)?
            .unwrap_or(0.0);

        self.chart_lines = lines;
        self.position_size = size;
        debug!(entry = last_close, size, "Trade setup");
        Ok(())
    }

    /// Recompute size from the current ENTRY/SL lines; no-op without lines
    pub fn recompute_position_size(&mut self) -> Result<(), GameError> {
        let size = self
            .positions()
            .size_from_lines(self.capital, self.risk, &self.chart_lines)?;
        if let Some(size) = size {
            self.position_size = size;
        }
        Ok(())
    }

    pub fn update_risk(&mut self, risk: RiskPercent) -> Result<(), GameError> {
        let size = self
            .positions()
            .size_from_lines(self.capital, risk, &self.chart_lines)?;
        self.risk = risk;
        if let Some(size) = size {
            self.position_size = size;
        }
        Ok(())
    }

    /// Index of the line of `kind`, the stable handle a front end drags by
    pub fn line_index(&self, kind: ChartLineKind) -> Option<usize> {
        self.chart_lines.iter().position(|l| l.kind == kind)
    }

    /// Move a draggable line and resize
    pub fn drag_line(&mut self, index: usize, price: f64) -> Result<(), GameError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(GameError::InvalidPrice(price));
        }
        let line = self
            .chart_lines
            .get(index)
            .ok_or(GameError::LineNotFound(index))?;
        if self.position.is_some() || !line.draggable {
            return Err(GameError::LineLocked(index));
        }

        let mut lines = self.chart_lines.clone();
        lines[index].price = price;
        let size = self
            .positions()
            .size_from_lines(self.capital, self.risk, &lines)?
            .unwrap_or(self.position_size);

        self.chart_lines = lines;
        self.position_size = size;
        Ok(())
    }

    /// Open at `price` with the given levels
    pub fn open_position(&mut self, tp: f64, sl: f64, price: f64) -> Result<(), GameError> {
        match self.state {
            GameState::GameOver => return Err(GameError::GameOver),
            GameState::SymbolEnd => return Err(GameError::SymbolEnded),
            _ => {}
        }
        if self.position.is_some() {
            return Err(GameError::PositionOpen);
        }
        let symbol = self.symbol.clone().ok_or(GameError::NoSymbol)?;
        for level in [tp, sl, price] {
            if !level.is_finite() || level <= 0.0 {
                return Err(GameError::InvalidPrice(level));
            }
        }
        if price == sl {
            return Err(GameError::InvalidConfiguration(format!(
                "entry equals stop-loss ({price})"
            )));
        }
        let straddles = (tp > price && sl < price) || (tp < price && sl > price);
        if !straddles {
            return Err(GameError::InvalidTradeSetup { tp, sl, price });
        }

        let qty = compute_size_from_risk(self.capital, self.risk.percent(), price, sl)?;
        if qty <= 0.0 {
            return Err(GameError::InvalidConfiguration(format!(
                "no capital to risk ({:.2})",
                self.capital
            )));
        }

        let side = Side::from_levels(tp, sl);
        self.position = Some(Position {
            symbol: symbol.clone(),
            qty,
            value: price * qty,
            price,
            side,
            tp,
            sl,
        });
        self.chart_lines = vec![
            ChartLine::new(ChartLineKind::Entry, price, false),
            ChartLine::new(ChartLineKind::TakeProfit, tp, false),
            ChartLine::new(ChartLineKind::StopLoss, sl, false),
        ];
        self.position_size = qty;
        self.state = GameState::InGame;

        info!(symbol = %symbol, side = %side, price, tp, sl, qty, "Position opened");
        Ok(())
    }

    /// Open using the prices of the current ENTRY/TP/SL lines
    pub fn open_position_from_lines(&mut self) -> Result<(), GameError> {
        let price = line_price(&self.chart_lines, ChartLineKind::Entry)
            .ok_or(GameError::NoTradeSetup(ChartLineKind::Entry))?;
        let tp = line_price(&self.chart_lines, ChartLineKind::TakeProfit)
            .ok_or(GameError::NoTradeSetup(ChartLineKind::TakeProfit))?;
        let sl = line_price(&self.chart_lines, ChartLineKind::StopLoss)
            .ok_or(GameError::NoTradeSetup(ChartLineKind::StopLoss))?;
        self.open_position(tp, sl, price)
    }

    // ─────────────────────────────────────────────────────────────────
    // Simulation
    // ─────────────────────────────────────────────────────────────────

    pub fn play_step(&mut self) -> StepOutcome {
        self.resolver().play_step(self)
    }

    /// Merge older candles into the past window.
    ///
    /// Returns false when `generation` belongs to a replaced session.
    pub fn apply_history(&mut self, generation: Uuid, candles: &[Candle]) -> bool {
        if generation != self.id {
            warn!(%generation, current = %self.id, "Discarding stale history batch");
            return false;
        }
        let before = self.candles_future.front().map(|c| c.time);
        let older: Vec<Candle> = candles
            .iter()
            .filter(|c| before.map_or(true, |t| c.time < t))
            .copied()
            .collect();
        self.candles_past = candles::merge(&self.candles_past, &older);
        true
    }

    /// Merge newer candles into the future window.
    ///
    /// Returns false when `generation` belongs to a replaced session.
    pub fn apply_future(&mut self, generation: Uuid, candles: &[Candle]) -> bool {
        if generation != self.id {
            warn!(%generation, current = %self.id, "Discarding stale future batch");
            return false;
        }
        let after = self.candles_past.last().map(|c| c.time);
        let newer: Vec<Candle> = candles
            .iter()
            .filter(|c| after.map_or(true, |t| c.time > t))
            .copied()
            .collect();
        let merged = candles::merge(self.candles_future.make_contiguous(), &newer);
        self.candles_future = merged.into();
        true
    }

    // ─────────────────────────────────────────────────────────────────
    // Read models
    // ─────────────────────────────────────────────────────────────────

    /// Last revealed close, 0 before any candles are loaded
    pub fn current_price(&self) -> f64 {
        self.candles_past.last().map(|c| c.close).unwrap_or(0.0)
    }

    /// Position entry when open, otherwise the current price
    pub fn entry_price(&self) -> f64 {
        self.position
            .as_ref()
            .map(|p| p.price)
            .unwrap_or_else(|| self.current_price())
    }

    pub fn unrealized_pnl(&self) -> Option<f64> {
        self.position
            .as_ref()
            .map(|p| self.positions().unrealized_pnl(p, self.current_price()))
    }

    /// PnL shown next to a TP/SL line if the trade closed there
    pub fn line_pnl(&self, index: usize) -> Option<f64> {
        let line = self.chart_lines.get(index)?;
        let (side, qty) = match &self.position {
            Some(p) => (p.side, p.qty),
            None => {
                let tp = line_price(&self.chart_lines, ChartLineKind::TakeProfit)?;
                let sl = line_price(&self.chart_lines, ChartLineKind::StopLoss)?;
                (Side::from_levels(tp, sl), self.position_size)
            }
        };
        let qty = line.qty.unwrap_or(qty);
        Some(
            self.positions()
                .projected_pnl(line.price, self.entry_price(), side, qty),
        )
    }

    pub fn last_trade(&self) -> Option<&Trade> {
        self.trades.last()
    }

    pub fn summary(&self) -> GameSummary {
        let wins = self.trades.iter().filter(|t| t.is_win()).count();
        GameSummary {
            wins,
            losses: self.trades.len() - wins,
            total_pnl: self.trades.iter().map(|t| t.pnl).sum(),
            trades: self.trades.len(),
            max_trades: self.rules.max_trades,
            capital: self.capital,
        }
    }

    pub fn trade_count_label(&self) -> String {
        format!("{} / {}", self.trades.len(), self.rules.max_trades)
    }

    /// Oldest revealed candle time, the boundary for history pagination
    pub fn history_boundary(&self) -> Option<i64> {
        self.candles_past.first().map(|c| c.time)
    }

    /// Newest hidden candle time, the boundary for future pagination
    pub fn future_boundary(&self) -> Option<i64> {
        self.candles_future.back().map(|c| c.time)
    }

    pub fn needs_future(&self) -> bool {
        self.rules.window.needs_future(self.candles_future.len())
    }
}
