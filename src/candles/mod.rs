//! Candle Window - merges incrementally fetched candles into the
//! session's past and future windows
//!
//! Pagination fetches can overlap and complete in any order, so every
//! batch goes through [`merge`]: first occurrence per timestamp wins and
//! the result is sorted ascending. Applying the same batch twice is a no-op.

use std::collections::HashSet;

use crate::types::Candle;

/// Default number of remaining future bars below which more are fetched
pub const DEFAULT_FUTURE_LOW_WATER: usize = 100;
/// Default number of bars left of the visible range that triggers a history fetch
pub const DEFAULT_HISTORY_EDGE_BARS: usize = 10;

/// Concatenate `existing` and `incoming`, keep the first candle seen for
/// each `time`, and sort ascending by `time`.
pub fn merge(existing: &[Candle], incoming: &[Candle]) -> Vec<Candle> {
    let mut seen = HashSet::with_capacity(existing.len() + incoming.len());
    let mut merged: Vec<Candle> = existing
        .iter()
        .chain(incoming.iter())
        .filter(|c| seen.insert(c.time))
        .copied()
        .collect();
    merged.sort_by_key(|c| c.time);
    merged
}

/// Split a freshly fetched sequence into (past, future).
///
/// The sequence is normalized first. With no lookback the split is at the
/// midpoint; a lookback larger than the sequence puts everything in the past.
pub fn split_window(candles: &[Candle], lookback: Option<usize>) -> (Vec<Candle>, Vec<Candle>) {
    let mut past = merge(&[], candles);
    let at = lookback
        .map(|n| n.min(past.len()))
        .unwrap_or(past.len() / 2);
    let future = past.split_off(at);
    (past, future)
}

/// True when every timestamp is strictly greater than the previous one
pub fn is_strictly_ordered(candles: &[Candle]) -> bool {
    candles.windows(2).all(|w| w[0].time < w[1].time)
}

/// When the session should ask for more data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub future_low_water: usize,
    pub history_edge_bars: usize,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            future_low_water: DEFAULT_FUTURE_LOW_WATER,
            history_edge_bars: DEFAULT_HISTORY_EDGE_BARS,
        }
    }
}

impl WindowPolicy {
    pub fn needs_future(&self, remaining: usize) -> bool {
        remaining < self.future_low_water
    }

    pub fn needs_history(&self, bars_before: usize) -> bool {
        bars_before < self.history_edge_bars
    }
}

/// Boundary timestamps already requested for one window edge
#[derive(Debug, Clone, Default)]
pub struct LoadedChunks {
    requested: HashSet<i64>,
}

impl LoadedChunks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request for `boundary`. Returns false if it was already requested.
    pub fn claim(&mut self, boundary: i64) -> bool {
        self.requested.insert(boundary)
    }

    /// Forget a boundary so a failed fetch can be retried
    pub fn release(&mut self, boundary: i64) {
        self.requested.remove(&boundary);
    }

    pub fn clear(&mut self) {
        self.requested.clear();
    }

    pub fn len(&self) -> usize {
        self.requested.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requested.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(time: i64, close: f64) -> Candle {
        Candle {
            time,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        }
    }

    fn times(candles: &[Candle]) -> Vec<i64> {
        candles.iter().map(|c| c.time).collect()
    }

    #[test]
    fn test_merge_sorts_and_dedupes() {
        let existing = vec![candle(300, 3.0), candle(100, 1.0)];
        let incoming = vec![candle(200, 2.0), candle(100, 99.0), candle(400, 4.0)];

        let merged = merge(&existing, &incoming);

        assert_eq!(times(&merged), vec![100, 200, 300, 400]);
        // first occurrence wins
        assert_eq!(merged[0].close, 1.0);
        assert!(is_strictly_ordered(&merged));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let cases: Vec<(Vec<Candle>, Vec<Candle>)> = vec![
            (vec![], vec![]),
            (vec![candle(5, 1.0)], vec![]),
            (vec![], vec![candle(9, 1.0), candle(9, 2.0), candle(3, 3.0)]),
            (
                vec![candle(10, 1.0), candle(20, 2.0), candle(20, 5.0)],
                vec![candle(15, 3.0), candle(20, 4.0), candle(5, 6.0)],
            ),
        ];

        for (a, b) in cases {
            let once = merge(&a, &b);
            let twice = merge(&once, &b);
            assert_eq!(once, twice);
            assert!(is_strictly_ordered(&once));
        }
    }

    #[test]
    fn test_split_at_midpoint() {
        let candles: Vec<Candle> = (0..7).rev().map(|i| candle(i * 60, i as f64)).collect();

        let (past, future) = split_window(&candles, None);

        assert_eq!(times(&past), vec![0, 60, 120]);
        assert_eq!(times(&future), vec![180, 240, 300, 360]);
    }

    #[test]
    fn test_split_with_lookback() {
        let candles: Vec<Candle> = (0..4).map(|i| candle(i, 1.0)).collect();

        let (past, future) = split_window(&candles, Some(3));
        assert_eq!(past.len(), 3);
        assert_eq!(future.len(), 1);

        let (past, future) = split_window(&candles, Some(50));
        assert_eq!(past.len(), 4);
        assert!(future.is_empty());
    }

    #[test]
    fn test_window_policy_thresholds() {
        let policy = WindowPolicy::default();
        assert!(policy.needs_future(99));
        assert!(!policy.needs_future(100));
        assert!(policy.needs_history(9));
        assert!(!policy.needs_history(10));
    }

    #[test]
    fn test_loaded_chunks_suppresses_duplicates() {
        let mut chunks = LoadedChunks::new();
        assert!(chunks.claim(1_700_000_000));
        assert!(!chunks.claim(1_700_000_000));
        chunks.release(1_700_000_000);
        assert!(chunks.claim(1_700_000_000));
        assert_eq!(chunks.len(), 1);
    }
}
