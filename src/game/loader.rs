//! Chart preparation - picks a random historical slice for a symbol

use anyhow::{anyhow, bail, Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::candles;
use crate::provider::{CandleRange, DataProvider};
use crate::types::{Candle, Interval};

/// Newest weekly bars excluded from the random start pick, so the slice
/// always has history after it to play through
const RECENT_WEEKS_EXCLUDED: usize = 2;

/// Fetch two contiguous pages of `interval` candles ending at a random
/// weekly open in the symbol's history.
pub async fn prepare_chart<P, R>(
    provider: &P,
    symbol: &str,
    interval: Interval,
    rng: &mut R,
) -> Result<Vec<Candle>>
where
    P: DataProvider + ?Sized,
    R: Rng + ?Sized,
{
    let weeks = provider
        .fetch_candles(symbol, Interval::Week1, CandleRange::default())
        .await
        .with_context(|| format!("Failed to fetch weekly history for {}", symbol))?;
    let mut weeks = candles::merge(&[], &weeks);
    if weeks.len() > RECENT_WEEKS_EXCLUDED + 1 {
        weeks.truncate(weeks.len() - RECENT_WEEKS_EXCLUDED);
    }

    let start_week = weeks
        .choose(rng)
        .ok_or_else(|| anyhow!("{} has no weekly history", symbol))?;
    let end = start_week.time;
    debug!(
        symbol = %symbol,
        week = ?start_week.datetime(),
        weeks = weeks.len(),
        "Picked chart end"
    );

    let recent = provider
        .fetch_candles(symbol, interval, CandleRange::ending_at(end))
        .await
        .with_context(|| format!("Failed to fetch {} {} candles", symbol, interval))?;
    let recent = candles::merge(&[], &recent);
    let Some(oldest) = recent.first().map(|c| c.time) else {
        bail!("{} returned no {} candles before {}", symbol, interval, end);
    };

    let older = provider
        .fetch_candles(symbol, interval, CandleRange::ending_at(oldest))
        .await
        .with_context(|| format!("Failed to fetch {} {} candles", symbol, interval))?;

    let chart = candles::merge(&recent, &older);
    debug!(symbol = %symbol, interval = %interval, end, count = chart.len(), "Prepared chart");
    Ok(chart)
}
