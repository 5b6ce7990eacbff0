//! Game Controller - async command layer over a [`GameSession`]
//!
//! Owns the session and the data provider. Fetches never overlap because
//! every command borrows the controller mutably; pagination requests are
//! still deduplicated per boundary timestamp, and every batch is applied
//! against the generation id captured before the fetch.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::candles::LoadedChunks;
use crate::error::GameError;
use crate::game::{loader, GameRules, GameSession};
use crate::provider::{CandleRange, DataProvider};
use crate::resolver::StepOutcome;
use crate::types::{Candle, GameState, Instrument, Interval, RiskPercent};

/// Default quote currency filter for the instrument list
pub const DEFAULT_QUOTE_SUFFIX: &str = "USDT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingState {
    Idle,
    Pending,
}

pub struct GameController<P: DataProvider> {
    provider: P,
    session: GameSession,
    instruments: Vec<Instrument>,
    loading: LoadingState,
    /// Transient fetch failures, newest last
    errors: Vec<String>,
    history_chunks: LoadedChunks,
    future_chunks: LoadedChunks,
    quote_suffix: String,
    rng: StdRng,
}

impl<P: DataProvider> GameController<P> {
    pub fn new(provider: P, rules: GameRules) -> Self {
        Self {
            provider,
            session: GameSession::new(rules),
            instruments: Vec::new(),
            loading: LoadingState::Idle,
            errors: Vec::new(),
            history_chunks: LoadedChunks::new(),
            future_chunks: LoadedChunks::new(),
            quote_suffix: DEFAULT_QUOTE_SUFFIX.to_string(),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_quote_suffix(mut self, suffix: &str) -> Self {
        self.quote_suffix = suffix.to_string();
        self
    }

    /// Deterministic symbol and start-time picks
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    pub fn loading(&self) -> LoadingState {
        self.loading
    }

    /// True while a fetch is pending or before any chart is loaded
    pub fn is_loading(&self) -> bool {
        self.loading != LoadingState::Idle || self.session.candles_past.is_empty()
    }

    fn record_failure(&mut self, what: &str, err: &anyhow::Error) {
        warn!(provider = self.provider.name(), error = %err, "{} failed", what);
        self.errors.push(format!("{}: {:#}", what, err));
        self.loading = LoadingState::Idle;
    }

    // ─────────────────────────────────────────────────────────────────
    // Async commands
    // ─────────────────────────────────────────────────────────────────

    /// Load the instrument list, keeping symbols with the configured quote suffix
    pub async fn load_game_data(&mut self) -> Result<usize> {
        self.loading = LoadingState::Pending;
        match self.provider.list_instruments().await {
            Ok(list) => {
                let suffix = self.quote_suffix.to_lowercase();
                self.instruments = list
                    .into_iter()
                    .filter(|i| i.symbol.to_lowercase().ends_with(&suffix))
                    .collect();
                self.loading = LoadingState::Idle;
                info!(
                    provider = self.provider.name(),
                    count = self.instruments.len(),
                    "Instruments loaded"
                );
                Ok(self.instruments.len())
            }
            Err(e) => {
                self.record_failure("Loading instruments", &e);
                Err(e)
            }
        }
    }

    /// New game on a random symbol; capital and trades reset
    pub async fn start_game(&mut self) -> Result<()> {
        let (symbol, candles) = self.fetch_random_chart("Starting game").await?;
        self.session.start_game(&symbol, &candles)?;
        self.reset_pagination();
        Ok(())
    }

    /// Next random symbol; capital and trades carry over
    pub async fn skip_chart(&mut self) -> Result<()> {
        self.session.ensure_can_leave_chart()?;
        let (symbol, candles) = self.fetch_random_chart("Skipping chart").await?;
        self.session.skip_chart(&symbol, &candles)?;
        self.reset_pagination();
        Ok(())
    }

    async fn fetch_random_chart(&mut self, what: &str) -> Result<(String, Vec<Candle>)> {
        let symbol = self
            .instruments
            .choose(&mut self.rng)
            .map(|i| i.symbol.clone())
            .ok_or_else(|| anyhow!("No instruments loaded"))?;
        let interval = self.session.interval;

        self.loading = LoadingState::Pending;
        match loader::prepare_chart(&self.provider, &symbol, interval, &mut self.rng).await {
            Ok(candles) => {
                self.loading = LoadingState::Idle;
                Ok((symbol, candles))
            }
            Err(e) => {
                self.record_failure(what, &e);
                Err(e)
            }
        }
    }

    fn reset_pagination(&mut self) {
        self.history_chunks.clear();
        self.future_chunks.clear();
    }

    /// Prepend candles older than `before_time`.
    ///
    /// Returns false when the boundary was already requested or the result
    /// arrived for a replaced session.
    pub async fn load_history(&mut self, before_time: i64) -> Result<bool> {
        let symbol = self.session.symbol.clone().ok_or(GameError::NoSymbol)?;
        if !self.history_chunks.claim(before_time) {
            debug!(boundary = before_time, "History chunk already requested");
            return Ok(false);
        }

        let generation = self.session.id;
        let interval = self.session.interval;
        match self
            .provider
            .fetch_candles(&symbol, interval, CandleRange::ending_at(before_time))
            .await
        {
            Ok(candles) => Ok(self.session.apply_history(generation, &candles)),
            Err(e) => {
                self.history_chunks.release(before_time);
                self.record_failure("Loading history", &e);
                Err(e)
            }
        }
    }

    /// Fetch older candles once the view scrolls within the edge band.
    ///
    /// `first_visible` is the index into the past window of the leftmost
    /// bar on screen.
    pub async fn ensure_history(&mut self, first_visible: usize) -> Result<bool> {
        if !self.session.rules.window.needs_history(first_visible) {
            return Ok(false);
        }
        match self.session.history_boundary() {
            Some(boundary) => self.load_history(boundary).await,
            None => Ok(false),
        }
    }

    /// Append candles after the newest loaded one
    pub async fn load_future(&mut self) -> Result<bool> {
        let symbol = self.session.symbol.clone().ok_or(GameError::NoSymbol)?;
        let boundary = self
            .session
            .future_boundary()
            .or_else(|| self.session.candles_past.last().map(|c| c.time));
        let Some(boundary) = boundary else {
            return Ok(false);
        };
        if !self.future_chunks.claim(boundary) {
            debug!(boundary, "Future chunk already requested");
            return Ok(false);
        }

        let generation = self.session.id;
        let interval = self.session.interval;
        match self
            .provider
            .fetch_candles(&symbol, interval, CandleRange::starting_at(boundary))
            .await
        {
            Ok(candles) => Ok(self.session.apply_future(generation, &candles)),
            Err(e) => {
                self.future_chunks.release(boundary);
                self.record_failure("Loading future", &e);
                Err(e)
            }
        }
    }

    /// Top up the future window once it drops below the low-water mark.
    /// A symbol that already ended stays ended.
    pub async fn ensure_future(&mut self) -> Result<bool> {
        let playable = !matches!(
            self.session.state,
            GameState::SymbolEnd | GameState::GameOver
        );
        if playable && self.session.symbol.is_some() && self.session.needs_future() {
            return self.load_future().await;
        }
        Ok(false)
    }

    /// One simulated bar, then a future top-up if needed
    pub async fn play_step(&mut self) -> StepOutcome {
        let outcome = self.session.play_step();
        if let Err(e) = self.ensure_future().await {
            debug!(error = %e, "Future top-up failed, playing on with what is loaded");
        }
        outcome
    }

    /// Step every `tick` until a trade closes, the symbol ends, the game
    /// ends, or `max_steps` bars have been played.
    pub async fn autoplay(&mut self, tick: Duration, max_steps: usize) -> StepOutcome {
        let mut ticker = tokio::time::interval(tick);
        let mut outcome = StepOutcome::Halted;
        for _ in 0..max_steps {
            ticker.tick().await;
            outcome = self.play_step().await;
            if outcome.is_terminal() {
                break;
            }
        }
        outcome
    }

    // ─────────────────────────────────────────────────────────────────
    // Sync commands
    // ─────────────────────────────────────────────────────────────────

    pub fn setup_trade(&mut self) -> Result<(), GameError> {
        self.session.setup_trade()
    }

    pub fn open_position(&mut self, tp: f64, sl: f64, price: f64) -> Result<(), GameError> {
        self.session.open_position(tp, sl, price)
    }

    pub fn open_position_from_lines(&mut self) -> Result<(), GameError> {
        self.session.open_position_from_lines()
    }

    pub fn update_risk(&mut self, risk: RiskPercent) -> Result<(), GameError> {
        self.session.update_risk(risk)
    }

    pub fn recompute_position_size(&mut self) -> Result<(), GameError> {
        self.session.recompute_position_size()
    }

    pub fn drag_line(&mut self, index: usize, price: f64) -> Result<(), GameError> {
        self.session.drag_line(index, price)
    }

    pub fn reset_chart(&mut self) -> Result<(), GameError> {
        self.session.reset_chart()
    }

    pub fn set_interval(&mut self, interval: Interval) {
        self.session.set_interval(interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockDataProvider;

    const T0: i64 = 1_700_000_000;
    const STEP: i64 = 1800;

    fn series(from: i64, count: usize, close: f64) -> Vec<Candle> {
        (0..count as i64)
            .map(|i| Candle {
                time: from + i * STEP,
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume: 1.0,
            })
            .collect()
    }

    fn instrument(symbol: &str) -> Instrument {
        Instrument {
            symbol: symbol.to_string(),
            base_coin: String::new(),
            quote_coin: String::new(),
            status: "Trading".to_string(),
        }
    }

    fn mock() -> MockDataProvider {
        let mut provider = MockDataProvider::new();
        provider.expect_name().return_const("mock");
        provider
    }

    fn controller(provider: MockDataProvider) -> GameController<MockDataProvider> {
        GameController::new(provider, GameRules::default()).with_seed(7)
    }

    #[tokio::test]
    async fn test_load_game_data_filters_quote() {
        let mut provider = mock();
        provider.expect_list_instruments().times(1).returning(|| {
            Ok(vec![
                instrument("BTCUSDT"),
                instrument("ETHPERP"),
                instrument("solusdt"),
            ])
        });

        let mut game = controller(provider);
        let count = tokio_test::assert_ok!(game.load_game_data().await);

        assert_eq!(count, 2);
        assert_eq!(game.loading(), LoadingState::Idle);
    }

    #[tokio::test]
    async fn test_load_failure_is_recorded() {
        let mut provider = mock();
        provider
            .expect_list_instruments()
            .returning(|| Err(anyhow!("connection reset")));

        let mut game = controller(provider);
        tokio_test::assert_err!(game.load_game_data().await);

        assert_eq!(game.errors().len(), 1);
        assert!(game.errors()[0].contains("connection reset"));
        assert_eq!(game.loading(), LoadingState::Idle);
        assert!(game.instruments().is_empty());
    }

    #[tokio::test]
    async fn test_start_game_fetches_random_slice() {
        let mut provider = mock();
        provider
            .expect_list_instruments()
            .returning(|| Ok(vec![instrument("BTCUSDT")]));
        provider
            .expect_fetch_candles()
            .withf(|symbol, _, _| symbol == "BTCUSDT")
            .returning(|_, interval, range| match interval {
                Interval::Week1 => Ok(series(T0, 6, 100.0)),
                _ => {
                    let end = range.end.unwrap_or(T0);
                    Ok(series(end - 9 * STEP, 10, 100.0))
                }
            });

        let mut game = controller(provider);
        game.load_game_data().await.unwrap();
        game.start_game().await.unwrap();

        let session = game.session();
        assert_eq!(session.symbol.as_deref(), Some("BTCUSDT"));
        assert_eq!(session.state, GameState::Start);
        // two overlapping pages of 10 share one candle
        assert_eq!(session.candles_past.len() + session.candles_future.len(), 19);
        assert!(!game.is_loading());
    }

    #[tokio::test]
    async fn test_start_without_instruments_fails() {
        let mut game = controller(mock());
        assert!(game.start_game().await.is_err());
        assert!(game.session().symbol.is_none());
    }

    #[tokio::test]
    async fn test_history_requests_are_deduplicated() {
        let mut provider = mock();
        provider
            .expect_fetch_candles()
            .times(1)
            .returning(|_, _, range| Ok(series(range.end.unwrap() - 5 * STEP, 5, 90.0)));

        let mut game = controller(provider);
        game.session
            .start_game("BTCUSDT", &series(T0, 4, 100.0))
            .unwrap();

        assert!(game.load_history(T0).await.unwrap());
        assert!(!game.load_history(T0).await.unwrap());
        assert_eq!(game.session().candles_past.len(), 7);
        assert_eq!(game.session().history_boundary(), Some(T0 - 5 * STEP));
    }

    #[tokio::test]
    async fn test_history_only_near_left_edge() {
        let mut provider = mock();
        provider
            .expect_fetch_candles()
            .times(1)
            .returning(|_, _, range| Ok(series(range.end.unwrap() - 3 * STEP, 3, 90.0)));

        let mut game = controller(provider);
        game.session
            .start_game("BTCUSDT", &series(T0, 40, 100.0))
            .unwrap();

        assert!(!game.ensure_history(15).await.unwrap());
        assert!(game.ensure_history(2).await.unwrap());
        assert_eq!(game.session().candles_past.len(), 23);
    }

    #[tokio::test]
    async fn test_future_failure_leaves_session_unchanged() {
        let mut provider = mock();
        provider
            .expect_fetch_candles()
            .times(2)
            .returning(|_, _, _| Err(anyhow!("HTTP 503")));

        let mut game = controller(provider);
        game.session
            .start_game("BTCUSDT", &series(T0, 4, 100.0))
            .unwrap();
        let before = game.session().clone();

        tokio_test::assert_err!(game.load_future().await);
        assert_eq!(game.session(), &before);
        assert_eq!(game.errors().len(), 1);

        // the boundary was released, so a retry goes out again
        tokio_test::assert_err!(game.load_future().await);
        assert_eq!(game.errors().len(), 2);
    }

    #[tokio::test]
    async fn test_symbol_end_is_not_refilled() {
        let mut provider = mock();
        provider.expect_fetch_candles().times(0);

        let rules = GameRules {
            lookback: Some(10),
            ..GameRules::default()
        };
        let mut game = GameController::new(provider, rules).with_seed(7);
        game.session
            .start_game("BTCUSDT", &series(T0, 4, 100.0))
            .unwrap();
        assert!(game.session().candles_future.is_empty());

        assert_eq!(game.play_step().await, StepOutcome::SymbolEnded);
        assert_eq!(game.session().state, GameState::SymbolEnd);
        assert!(game.session().candles_future.is_empty());
        assert_eq!(
            game.open_position(105.0, 95.0, 100.0),
            Err(GameError::SymbolEnded)
        );

        assert_eq!(game.play_step().await, StepOutcome::SymbolEnded);
        assert_eq!(game.session().candles_past.len(), 4);
    }

    #[tokio::test]
    async fn test_autoplay_stops_on_trade_close() {
        let mut provider = mock();
        provider.expect_fetch_candles().returning(|_, _, _| Ok(Vec::new()));

        let mut game = controller(provider);
        let mut candles = series(T0, 6, 100.0);
        candles[4].high = 111.0;
        game.session.start_game("BTCUSDT", &candles).unwrap();
        game.update_risk(RiskPercent::Five).unwrap();
        game.open_position(105.0, 95.0, 100.0).unwrap();

        let outcome = game.autoplay(Duration::from_millis(1), 100).await;

        match outcome {
            StepOutcome::Closed(trade) => {
                assert_eq!(trade.exit_price, 105.0);
                assert!((trade.pnl - 50.0).abs() < 1e-9);
            }
            other => panic!("expected a closed trade, got {:?}", other),
        }
        assert_eq!(game.session().state, GameState::TradeEnd);
        assert_eq!(game.session().candles_future.len(), 1);
    }
}
