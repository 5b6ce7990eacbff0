//! Position Manager - risk-based sizing and PnL arithmetic
//!
//! Implements:
//! - Size from risk: capital * risk% spread over the entry/stop distance
//! - Default trade setup lines around the last close
//! - Realized, unrealized and projected PnL with buy/sell sign convention

use crate::error::GameError;
use crate::types::{ChartLine, ChartLineKind, Position, RiskPercent, Side};

/// Default take-profit / stop-loss distance from the last close (5%)
pub const DEFAULT_LINE_OFFSET_PCT: f64 = 0.05;

/// Trade setup configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionConfig {
    /// TP distance above the last close (e.g., 0.05 = 5%)
    pub tp_offset_pct: f64,
    /// SL distance below the last close (e.g., 0.05 = 5%)
    pub sl_offset_pct: f64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            tp_offset_pct: DEFAULT_LINE_OFFSET_PCT,
            sl_offset_pct: DEFAULT_LINE_OFFSET_PCT,
        }
    }
}

/// `(capital * risk_pct / 100) / |entry - stop_loss|`
///
/// Rejects a zero entry/stop distance and any non-finite input instead of
/// returning an infinite size. Never negative.
pub fn compute_size_from_risk(
    capital: f64,
    risk_pct: f64,
    entry: f64,
    stop_loss: f64,
) -> Result<f64, GameError> {
    if !capital.is_finite() || !risk_pct.is_finite() || !entry.is_finite() || !stop_loss.is_finite()
    {
        return Err(GameError::InvalidConfiguration(format!(
            "non-finite sizing input (capital={capital}, risk={risk_pct}, entry={entry}, sl={stop_loss})"
        )));
    }

    let distance = (entry - stop_loss).abs();
    if distance == 0.0 {
        return Err(GameError::InvalidConfiguration(format!(
            "entry equals stop-loss ({entry})"
        )));
    }

    let risk_value = capital * (risk_pct / 100.0);
    let size = risk_value / distance;
    if !size.is_finite() {
        return Err(GameError::InvalidConfiguration(format!(
            "position size is not finite (risk={risk_value}, distance={distance})"
        )));
    }

    Ok(size.max(0.0))
}

/// Buy: `(exit - entry) * qty`, Sell: `(entry - exit) * qty`
pub fn compute_pnl(entry: f64, exit: f64, side: Side, qty: f64) -> f64 {
    match side {
        Side::Buy => (exit - entry) * qty,
        Side::Sell => (entry - exit) * qty,
    }
}

/// Price of the first line of `kind`, if any
pub fn line_price(lines: &[ChartLine], kind: ChartLineKind) -> Option<f64> {
    lines.iter().find(|l| l.kind == kind).map(|l| l.price)
}

/// Sizing and setup helper for a single session
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PositionManager {
    config: PositionConfig,
}

impl PositionManager {
    pub fn new(config: PositionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PositionConfig {
        &self.config
    }

    /// ENTRY at the last close, TP above and SL below by the configured offsets
    pub fn setup_lines(&self, last_close: f64) -> Vec<ChartLine> {
        let tp = last_close + last_close * self.config.tp_offset_pct;
        let sl = last_close - last_close * self.config.sl_offset_pct;
        vec![
            ChartLine::new(ChartLineKind::Entry, last_close, false),
            ChartLine::new(ChartLineKind::TakeProfit, tp, true),
            ChartLine::new(ChartLineKind::StopLoss, sl, true),
        ]
    }

    /// Size implied by the ENTRY and SL lines.
    ///
    /// `Ok(None)` when there are no lines at all.
    pub fn size_from_lines(
        &self,
        capital: f64,
        risk: RiskPercent,
        lines: &[ChartLine],
    ) -> Result<Option<f64>, GameError> {
        if lines.is_empty() {
            return Ok(None);
        }
        let entry = line_price(lines, ChartLineKind::Entry)
            .ok_or(GameError::NoTradeSetup(ChartLineKind::Entry))?;
        let sl = line_price(lines, ChartLineKind::StopLoss)
            .ok_or(GameError::NoTradeSetup(ChartLineKind::StopLoss))?;
        compute_size_from_risk(capital, risk.percent(), entry, sl).map(Some)
    }

    /// Live PnL of an open position marked at `price`
    pub fn unrealized_pnl(&self, position: &Position, price: f64) -> f64 {
        compute_pnl(position.price, price, position.side, position.qty)
    }

    /// PnL if the trade were closed at `line_price`
    pub fn projected_pnl(&self, line_price: f64, entry: f64, side: Side, qty: f64) -> f64 {
        compute_pnl(entry, line_price, side, qty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_from_risk() {
        let size = compute_size_from_risk(1000.0, 1.0, 100.0, 95.0).unwrap();
        assert!((size - 2.0).abs() < 1e-12);

        // Stop above entry (short) sizes on the absolute distance
        let size = compute_size_from_risk(1000.0, 5.0, 100.0, 105.0).unwrap();
        assert!((size - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_size_rejects_entry_equal_to_stop() {
        let err = compute_size_from_risk(1000.0, 1.0, 100.0, 100.0).unwrap_err();
        assert!(matches!(err, GameError::InvalidConfiguration(_)));

        assert!(compute_size_from_risk(f64::NAN, 1.0, 100.0, 95.0).is_err());
    }

    #[test]
    fn test_size_never_negative() {
        let size = compute_size_from_risk(-500.0, 10.0, 100.0, 90.0).unwrap();
        assert_eq!(size, 0.0);
    }

    #[test]
    fn test_pnl_sign_convention() {
        assert_eq!(compute_pnl(100.0, 110.0, Side::Buy, 2.0), 20.0);
        assert_eq!(compute_pnl(100.0, 110.0, Side::Sell, 2.0), -20.0);
        assert_eq!(compute_pnl(100.0, 90.0, Side::Sell, 2.0), 20.0);
    }

    #[test]
    fn test_setup_lines_default_offsets() {
        let pm = PositionManager::default();
        let lines = pm.setup_lines(200.0);

        assert_eq!(lines.len(), 3);
        assert_eq!(line_price(&lines, ChartLineKind::Entry), Some(200.0));
        assert_eq!(line_price(&lines, ChartLineKind::TakeProfit), Some(210.0));
        assert_eq!(line_price(&lines, ChartLineKind::StopLoss), Some(190.0));
        assert!(!lines[0].draggable);
        assert!(lines[1].draggable && lines[2].draggable);
    }

    #[test]
    fn test_size_from_lines() {
        let pm = PositionManager::default();
        assert_eq!(pm.size_from_lines(1000.0, RiskPercent::One, &[]).unwrap(), None);

        let lines = pm.setup_lines(100.0);
        let size = pm
            .size_from_lines(1000.0, RiskPercent::Five, &lines)
            .unwrap()
            .unwrap();
        assert!((size - 10.0).abs() < 1e-9);

        let partial = vec![ChartLine::new(ChartLineKind::Entry, 100.0, false)];
        assert_eq!(
            pm.size_from_lines(1000.0, RiskPercent::One, &partial),
            Err(GameError::NoTradeSetup(ChartLineKind::StopLoss))
        );
    }

    #[test]
    fn test_unrealized_pnl_for_short() {
        let pm = PositionManager::default();
        let position = Position {
            symbol: "BTCUSDT".to_string(),
            qty: 3.0,
            value: 300.0,
            price: 100.0,
            side: Side::Sell,
            tp: 90.0,
            sl: 105.0,
        };
        assert_eq!(pm.unrealized_pnl(&position, 96.0), 12.0);
        assert_eq!(pm.projected_pnl(105.0, 100.0, Side::Sell, 3.0), -15.0);
    }
}
