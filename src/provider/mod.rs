//! Market data providers
//!
//! The game only needs two things from a venue: the list of tradable
//! instruments and batches of historical candles. Batches may come back in
//! any order; the session re-sorts everything through `candles::merge`.

mod bybit;

pub use bybit::{parse_instruments, parse_klines, BybitClient, BYBIT_REST_URL};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{Candle, Instrument, Interval};

/// Time bounds of a candle request, in Unix seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl CandleRange {
    /// Latest page ending at `end` (history pagination)
    pub fn ending_at(end: i64) -> Self {
        Self {
            start: None,
            end: Some(end),
        }
    }

    /// First page starting at `start` (future pagination)
    pub fn starting_at(start: i64) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }
}

/// Trait for historical market data sources
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Instruments usable for candle queries
    async fn list_instruments(&self) -> Result<Vec<Instrument>>;

    /// One page of candles for `symbol` within `range`
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        range: CandleRange,
    ) -> Result<Vec<Candle>>;
}
