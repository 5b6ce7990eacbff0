//! Headless CandleGame player
//!
//! Usage: cargo run (config from config/default.*, config/local.* and CANDLEGAME__* env)

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use candlegame::config::{AppConfig, LoggingCfg};
use candlegame::game::GameController;
use candlegame::provider::{BybitClient, DataProvider};
use candlegame::resolver::StepOutcome;
use candlegame::types::{ChartLineKind, GameState, Side};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging);

    info!("🕯️ CandleGame v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", config);

    let provider = BybitClient::new(
        &config.provider.base_url,
        &config.provider.category,
        config.provider.timeout(),
        config.provider.page_limit,
    )?;
    let mut game = GameController::new(provider, config.rules()?)
        .with_quote_suffix(&config.provider.quote_suffix);

    tokio::select! {
        result = play(&mut game, &config) => {
            if let Err(e) = result {
                error!(error = %e, "Game aborted");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping");
        }
    }

    let summary = game.session().summary();
    info!(
        trades = %game.session().trade_count_label(),
        wins = summary.wins,
        losses = summary.losses,
        total_pnl = %format!("{:.2}", summary.total_pnl),
        capital = %format!("{:.2}", summary.capital),
        "🏁 Game finished"
    );
    Ok(())
}

fn init_tracing(logging: &LoggingCfg) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let _ = if logging.is_json() {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Play rounds until game over: seed lines, place them for the round's
/// side, open, then autoplay until the trade resolves or the chart runs out.
async fn play<P: DataProvider>(game: &mut GameController<P>, config: &AppConfig) -> Result<()> {
    let side = config.autoplay.player_side()?;
    let count = game
        .load_game_data()
        .await
        .context("Failed to load instruments")?;
    info!(count, "📋 Instruments available");

    game.start_game().await?;
    let mut round = 0;

    loop {
        let state = game.session().state;
        let exhausted = game.session().candles_future.is_empty();
        match state {
            GameState::GameOver => return Ok(()),
            GameState::SymbolEnd => {
                game.skip_chart().await?;
                continue;
            }
            _ if exhausted => {
                game.skip_chart().await?;
                continue;
            }
            _ => {}
        }

        game.setup_trade()?;
        if side.for_round(round) == Side::Sell {
            place_short(game, config)?;
        }
        game.open_position_from_lines()?;
        round += 1;

        match game
            .autoplay(config.autoplay.tick(), config.autoplay.max_steps)
            .await
        {
            StepOutcome::Closed(trade) => {
                info!(
                    symbol = %trade.symbol,
                    side = %trade.side,
                    exit = ?trade.exit_reason,
                    pnl = %format!("{:.2}", trade.pnl),
                    trades = %game.session().trade_count_label(),
                    "💰 Trade closed"
                );
            }
            StepOutcome::SymbolEnded => info!("Chart exhausted"),
            StepOutcome::Halted => return Ok(()),
            StepOutcome::Advanced(_) => {
                warn!(
                    steps = config.autoplay.max_steps,
                    "Trade still open after max steps, stopping"
                );
                return Ok(());
            }
        }
    }
}

/// Mirror the seeded TP/SL lines around the entry for a short
fn place_short<P: DataProvider>(game: &mut GameController<P>, config: &AppConfig) -> Result<()> {
    let entry = game.session().current_price();
    let tp = entry * (1.0 - config.game.tp_offset_pct);
    let sl = entry * (1.0 + config.game.sl_offset_pct);

    for (kind, price) in [(ChartLineKind::TakeProfit, tp), (ChartLineKind::StopLoss, sl)] {
        let index = game
            .session()
            .line_index(kind)
            .with_context(|| format!("{} line missing after setup", kind))?;
        game.drag_line(index, price)?;
    }
    Ok(())
}
