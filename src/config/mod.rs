//! Configuration management for CandleGame
//!
//! Loads from config files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::game::GameRules;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub game: GameCfg,
    pub provider: ProviderCfg,
    pub autoplay: AutoplayCfg,
    pub logging: LoggingCfg,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (CANDLEGAME__GAME__MAX_TRADES=...)
            .add_source(Environment::with_prefix("CANDLEGAME").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app_config.validate()?;

        Ok(app_config)
    }

    /// Defaults only, no files or environment
    pub fn defaults() -> Result<Self> {
        let config = Self::builder()?
            .build()
            .context("Failed to build configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let builder = Config::builder()
            // Game defaults
            .set_default("game.initial_capital", 1000.0)?
            .set_default("game.max_trades", 5)?
            .set_default("game.risk", 1)?
            .set_default("game.interval", "30m")?
            .set_default("game.tp_offset_pct", 0.05)?
            .set_default("game.sl_offset_pct", 0.05)?
            .set_default("game.tie_break", "take_profit_first")?
            .set_default("game.future_low_water", 100)?
            .set_default("game.history_edge_bars", 10)?
            // Provider defaults
            .set_default("provider.base_url", crate::provider::BYBIT_REST_URL)?
            .set_default("provider.category", "linear")?
            .set_default("provider.quote_suffix", "USDT")?
            .set_default("provider.timeout_secs", 30)?
            .set_default("provider.page_limit", 200)?
            // Autoplay defaults
            .set_default("autoplay.tick_ms", 10)?
            .set_default("autoplay.max_steps", 5000)?
            .set_default("autoplay.side", "alternate")?
            // Logging defaults
            .set_default("logging.level", "info")?
            .set_default("logging.format", "plain")?;
        Ok(builder)
    }

    /// Game rules built from the `game` section
    pub fn rules(&self) -> Result<GameRules> {
        self.game.rules()
    }

    /// Reject values that would only fail later, mid-game
    pub fn validate(&self) -> Result<()> {
        self.game.rules()?;
        self.autoplay.player_side()?;
        if self.provider.quote_suffix.trim().is_empty() {
            bail!("provider.quote_suffix must not be empty");
        }
        if self.provider.page_limit == 0 {
            bail!("provider.page_limit must be at least 1");
        }
        if self.autoplay.max_steps == 0 {
            bail!("autoplay.max_steps must be at least 1");
        }
        Ok(())
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "capital={:.2} max_trades={} risk={}% interval={} tie_break={} provider={}/{} side={}",
            self.game.initial_capital,
            self.game.max_trades,
            self.game.risk,
            self.game.interval,
            self.game.tie_break,
            self.provider.base_url,
            self.provider.category,
            self.autoplay.side,
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::TieBreak;
    use crate::types::{Interval, RiskPercent, Side};

    #[test]
    fn test_defaults_build_rules() {
        let cfg = AppConfig::defaults().unwrap();
        cfg.validate().unwrap();

        let rules = cfg.rules().unwrap();
        assert_eq!(rules, GameRules::default());
        assert_eq!(rules.default_interval, Interval::Min30);
        assert_eq!(rules.default_risk, RiskPercent::One);
        assert_eq!(rules.tie_break, TieBreak::TakeProfitFirst);
        assert_eq!(cfg.provider.page_limit, 200);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut cfg = AppConfig::defaults().unwrap();
        cfg.game.risk = 3;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::defaults().unwrap();
        cfg.game.interval = "7m".to_string();
        assert!(cfg.rules().is_err());

        let mut cfg = AppConfig::defaults().unwrap();
        cfg.game.max_trades = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::defaults().unwrap();
        cfg.autoplay.side = "sideways".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_tie_break_alias() {
        let mut cfg = AppConfig::defaults().unwrap();
        cfg.game.tie_break = "sl_first".to_string();
        assert_eq!(cfg.rules().unwrap().tie_break, TieBreak::StopLossFirst);
    }

    #[test]
    fn test_player_side_rounds() {
        assert_eq!(PlayerSide::parse("Long").unwrap(), PlayerSide::Buy);
        assert_eq!(PlayerSide::Alternate.for_round(0), Side::Buy);
        assert_eq!(PlayerSide::Alternate.for_round(1), Side::Sell);
        assert_eq!(PlayerSide::Sell.for_round(4), Side::Sell);
    }

    #[test]
    fn test_digest() {
        let cfg = AppConfig::defaults().unwrap();
        let digest = cfg.to_string();
        assert!(digest.contains("max_trades=5"));
        assert!(digest.contains("interval=30m"));
    }
}
