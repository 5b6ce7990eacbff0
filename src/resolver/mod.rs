//! Trade Resolver - advances simulated time one bar per step
//!
//! Each step reveals the next hidden future candle. An open position is
//! checked against that bar's range; a hit closes it at the TP/SL level,
//! books the trade and moves the session to `TradeEnd` (or `GameOver`
//! once the trade limit is reached). When the future window is empty an
//! open position is force-closed at the last visible close.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::game::GameSession;
use crate::position::{compute_pnl, PositionManager};
use crate::types::{Candle, ChartLineKind, ExitReason, GameState, Position, Side, Trade};

/// Which level wins when one bar crosses both TP and SL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    TakeProfitFirst,
    StopLossFirst,
}

impl Default for TieBreak {
    fn default() -> Self {
        TieBreak::TakeProfitFirst
    }
}

impl TieBreak {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "take_profit_first" | "tp_first" | "tp" => Some(TieBreak::TakeProfitFirst),
            "stop_loss_first" | "sl_first" | "sl" => Some(TieBreak::StopLossFirst),
            _ => None,
        }
    }
}

impl fmt::Display for TieBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TieBreak::TakeProfitFirst => write!(f, "take_profit_first"),
            TieBreak::StopLossFirst => write!(f, "stop_loss_first"),
        }
    }
}

/// Result of a single `play_step`
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// A bar was revealed and nothing closed
    Advanced(Candle),
    /// A position was closed, either on a hit or because data ran out
    Closed(Trade),
    /// Future data exhausted with no open position
    SymbolEnded,
    /// Game is over; nothing happened
    Halted,
}

impl StepOutcome {
    /// Whether an autoplay driver should stop after this step
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepOutcome::Advanced(_))
    }
}

/// Exit level and reason if `bar` touches the position's TP or SL.
///
/// Hit tests are strict: a bar that only touches the level does not fill.
pub fn detect_exit(position: &Position, bar: &Candle, tie_break: TieBreak) -> Option<(f64, ExitReason)> {
    let (tp_hit, sl_hit) = match position.side {
        Side::Buy => (position.tp < bar.high, position.sl > bar.low),
        Side::Sell => (position.tp > bar.low, position.sl < bar.high),
    };

    let take_profit = (position.tp, ExitReason::TakeProfit);
    let stop_loss = (position.sl, ExitReason::StopLoss);

    match (tp_hit, sl_hit) {
        (true, true) => Some(match tie_break {
            TieBreak::TakeProfitFirst => take_profit,
            TieBreak::StopLossFirst => stop_loss,
        }),
        (true, false) => Some(take_profit),
        (false, true) => Some(stop_loss),
        (false, false) => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeResolver {
    tie_break: TieBreak,
    max_trades: usize,
    positions: PositionManager,
}

impl TradeResolver {
    pub fn new(tie_break: TieBreak, max_trades: usize, positions: PositionManager) -> Self {
        Self {
            tie_break,
            max_trades,
            positions,
        }
    }

    /// Advance the session by one bar
    pub fn play_step(&self, session: &mut GameSession) -> StepOutcome {
        if session.state == GameState::GameOver {
            return StepOutcome::Halted;
        }

        let Some(bar) = session.candles_future.pop_front() else {
            return self.exhaust(session);
        };
        session.candles_past.push(bar);

        if let Some(position) = session.position.take() {
            return match detect_exit(&position, &bar, self.tie_break) {
                Some((exit_price, reason)) => {
                    let trade = self.book_trade(session, position, exit_price, reason);
                    StepOutcome::Closed(trade)
                }
                None => {
                    session.position = Some(position);
                    StepOutcome::Advanced(bar)
                }
            };
        }

        // No position: ENTRY trails the latest close
        if let Some(entry) = session
            .chart_lines
            .iter_mut()
            .find(|l| l.kind == ChartLineKind::Entry)
        {
            entry.price = bar.close;
            match self
                .positions
                .size_from_lines(session.capital, session.risk, &session.chart_lines)
            {
                Ok(Some(size)) => session.position_size = size,
                Ok(None) => {}
                Err(e) => debug!(error = %e, "Keeping previous position size"),
            }
        }

        StepOutcome::Advanced(bar)
    }

    /// No hidden bars left: force-close an open position at the last
    /// revealed close, otherwise end the symbol
    fn exhaust(&self, session: &mut GameSession) -> StepOutcome {
        match session.position.take() {
            Some(position) => {
                let exit_price = session
                    .candles_past
                    .last()
                    .map(|c| c.close)
                    .unwrap_or(position.price);
                let trade = self.book_trade(session, position, exit_price, ExitReason::DataExhausted);
                StepOutcome::Closed(trade)
            }
            None => {
                info!(symbol = ?session.symbol, "Symbol ran out of future candles");
                session.state = GameState::SymbolEnd;
                StepOutcome::SymbolEnded
            }
        }
    }

    fn book_trade(
        &self,
        session: &mut GameSession,
        position: Position,
        exit_price: f64,
        reason: ExitReason,
    ) -> Trade {
        let pnl = compute_pnl(position.price, exit_price, position.side, position.qty);
        let trade = Trade {
            symbol: position.symbol,
            qty: position.qty,
            price: position.price,
            exit_price,
            side: position.side,
            pnl,
            exit_reason: reason,
        };

        session.trades.push(trade.clone());
        session.capital += pnl;
        session.position = None;
        session.chart_lines.clear();
        session.position_size = 0.0;
        session.state = if session.trades.len() >= self.max_trades {
            GameState::GameOver
        } else {
            GameState::TradeEnd
        };

        info!(
            symbol = %trade.symbol,
            side = %trade.side,
            entry = trade.price,
            exit = trade.exit_price,
            pnl = trade.pnl,
            reason = %reason,
            capital = session.capital,
            trades = session.trades.len(),
            "Trade closed"
        );

        trade
    }
}
