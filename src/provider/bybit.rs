//! Bybit V5 public REST client for instruments and klines
//!
//! Endpoints documented at: https://bybit-exchange.github.io/docs/v5/market/kline

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::provider::{CandleRange, DataProvider};
use crate::types::{Candle, Instrument, Interval};

pub const BYBIT_REST_URL: &str = "https://api.bybit.com";

/// Bybit caps kline pages at 1000 rows
const MAX_PAGE_LIMIT: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitResponse<T> {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    result: Option<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct KlineResult {
    /// `[startTime, open, high, low, close, volume, turnover]`, newest first
    #[serde(default)]
    list: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentsResult {
    #[serde(default)]
    list: Vec<BybitInstrument>,
    #[serde(default)]
    next_page_cursor: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitInstrument {
    symbol: String,
    #[serde(default)]
    base_coin: String,
    #[serde(default)]
    quote_coin: String,
    #[serde(default)]
    status: String,
}

fn unwrap_response<T: DeserializeOwned + Default>(payload: &str) -> Result<T> {
    let response: BybitResponse<T> =
        serde_json::from_str(payload).context("Failed to parse Bybit response")?;
    if response.ret_code != 0 {
        bail!(
            "Bybit returned retCode {}: {}",
            response.ret_code,
            response.ret_msg
        );
    }
    Ok(response.result.unwrap_or_default())
}

fn parse_number(raw: &str, field: &str) -> Result<f64> {
    let value: f64 = raw
        .parse()
        .with_context(|| format!("Invalid kline {}: {}", field, raw))?;
    if !value.is_finite() {
        bail!("Non-finite kline {}: {}", field, raw);
    }
    Ok(value)
}

/// Parse a `/v5/market/kline` payload. Candle time is the bar start in seconds.
pub fn parse_klines(payload: &str) -> Result<Vec<Candle>> {
    let result: KlineResult = unwrap_response(payload)?;
    result
        .list
        .iter()
        .map(|row| -> Result<Candle> {
            if row.len() < 6 {
                bail!("Bybit kline row has {} fields, expected at least 6", row.len());
            }
            let start_ms: i64 = row[0]
                .parse()
                .with_context(|| format!("Invalid kline start time: {}", row[0]))?;
            Ok(Candle {
                time: start_ms / 1000,
                open: parse_number(&row[1], "open")?,
                high: parse_number(&row[2], "high")?,
                low: parse_number(&row[3], "low")?,
                close: parse_number(&row[4], "close")?,
                volume: parse_number(&row[5], "volume")?,
            })
        })
        .collect()
}

/// Parse a `/v5/market/instruments-info` payload into instruments and the
/// cursor of the next page, if any
pub fn parse_instruments(payload: &str) -> Result<(Vec<Instrument>, Option<String>)> {
    let result: InstrumentsResult = unwrap_response(payload)?;
    let instruments = result
        .list
        .into_iter()
        .map(|i| Instrument {
            symbol: i.symbol,
            base_coin: i.base_coin,
            quote_coin: i.quote_coin,
            status: i.status,
        })
        .collect();
    let cursor = Some(result.next_page_cursor).filter(|c| !c.is_empty());
    Ok((instruments, cursor))
}

/// REST client for Bybit market data
#[derive(Debug, Clone)]
pub struct BybitClient {
    client: Client,
    base_url: String,
    category: String,
    page_limit: usize,
}

impl BybitClient {
    pub fn new(base_url: &str, category: &str, timeout: Duration, page_limit: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            category: category.to_string(),
            page_limit: page_limit.clamp(1, MAX_PAGE_LIMIT),
        })
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!("Bybit {} returned {}: {}", path, status, body);
        }
        Ok(body)
    }
}

impl Default for BybitClient {
    fn default() -> Self {
        Self {
            client: Client::new(),
            base_url: BYBIT_REST_URL.to_string(),
            category: "linear".to_string(),
            page_limit: 200,
        }
    }
}

#[async_trait]
impl DataProvider for BybitClient {
    fn name(&self) -> &'static str {
        "Bybit"
    }

    async fn list_instruments(&self) -> Result<Vec<Instrument>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut params = vec![
                ("category", self.category.clone()),
                ("limit", MAX_PAGE_LIMIT.to_string()),
            ];
            if let Some(c) = &cursor {
                params.push(("cursor", c.clone()));
            }

            let body = self.get("/v5/market/instruments-info", &params).await?;
            let (page, next) = parse_instruments(&body)?;
            all.extend(page);

            match next {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => break,
            }
        }

        debug!(count = all.len(), category = %self.category, "Fetched Bybit instruments");
        Ok(all)
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        range: CandleRange,
    ) -> Result<Vec<Candle>> {
        let mut params = vec![
            ("category", self.category.clone()),
            ("symbol", symbol.to_string()),
            ("interval", interval.bybit_code().to_string()),
            ("limit", self.page_limit.to_string()),
        ];
        if let Some(start) = range.start {
            params.push(("start", (start * 1000).to_string()));
        }
        if let Some(end) = range.end {
            params.push(("end", (end * 1000).to_string()));
        }

        let body = self.get("/v5/market/kline", &params).await?;
        let candles = parse_klines(&body)
            .with_context(|| format!("Failed to parse {} {} klines", symbol, interval))?;

        debug!(
            symbol = %symbol,
            interval = %interval,
            start = ?range.start,
            end = ?range.end,
            count = candles.len(),
            "Fetched Bybit klines"
        );
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KLINES: &str = r#"{
        "retCode": 0,
        "retMsg": "OK",
        "result": {
            "category": "linear",
            "symbol": "BTCUSDT",
            "list": [
                ["1704069000000", "42100.5", "42200", "42050", "42150.5", "12.5", "526000"],
                ["1704067200000", "42000", "42150", "41900", "42100.5", "10.25", "430000"]
            ]
        },
        "time": 1704069060000
    }"#;

    #[test]
    fn test_parse_klines() {
        let candles = parse_klines(KLINES).unwrap();

        assert_eq!(candles.len(), 2);
        // newest first, as Bybit sends them
        assert_eq!(candles[0].time, 1_704_069_000);
        assert_eq!(candles[0].close, 42150.5);
        assert_eq!(candles[1].time, 1_704_067_200);
        assert_eq!(candles[1].volume, 10.25);
    }

    #[test]
    fn test_parse_klines_rejects_error_code() {
        let payload = r#"{"retCode": 10001, "retMsg": "params error: symbol invalid", "result": {}}"#;
        let err = parse_klines(payload).unwrap_err();
        assert!(err.to_string().contains("10001"));
    }

    #[test]
    fn test_parse_klines_rejects_short_row() {
        let payload = r#"{"retCode": 0, "retMsg": "OK", "result": {"list": [["1704067200000", "1"]]}}"#;
        assert!(parse_klines(payload).is_err());
    }

    #[test]
    fn test_parse_instruments_with_cursor() {
        let payload = r#"{
            "retCode": 0,
            "retMsg": "OK",
            "result": {
                "category": "linear",
                "list": [
                    {"symbol": "BTCUSDT", "baseCoin": "BTC", "quoteCoin": "USDT", "status": "Trading"},
                    {"symbol": "ETHPERP", "baseCoin": "ETH", "quoteCoin": "USDC", "status": "Trading"}
                ],
                "nextPageCursor": "abc"
            }
        }"#;

        let (instruments, cursor) = parse_instruments(payload).unwrap();
        assert_eq!(instruments.len(), 2);
        assert_eq!(instruments[0].symbol, "BTCUSDT");
        assert_eq!(instruments[1].quote_coin, "USDC");
        assert_eq!(cursor.as_deref(), Some("abc"));
    }

    #[test]
    fn test_parse_instruments_last_page() {
        let payload = r#"{"retCode": 0, "retMsg": "OK", "result": {"list": [], "nextPageCursor": ""}}"#;
        let (instruments, cursor) = parse_instruments(payload).unwrap();
        assert!(instruments.is_empty());
        assert!(cursor.is_none());
    }
}
