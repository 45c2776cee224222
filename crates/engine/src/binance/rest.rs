use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use common::{Candle, Error, MarketDataSource, Result};

use super::{from_millis, parse_decimal};

const BASE_URL: &str = "https://api.binance.com";
/// Largest page `/api/v3/klines` will return.
const MAX_LIMIT: usize = 1000;

/// Public market-data REST client for Binance. Used for the startup backfill;
/// no endpoint it calls needs an API key.
pub struct BinanceRest {
    base_url: String,
    http: Client,
}

impl BinanceRest {
    pub fn new() -> Result<Self> {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }
}

#[async_trait]
impl MarketDataSource for BinanceRest {
    async fn historical_candles(
        &self,
        pair: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let limit = limit.clamp(1, MAX_LIMIT);
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            pair.to_uppercase(),
            interval,
            limit
        );

        debug!(%pair, %interval, limit, "Fetching historical klines");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        parse_klines(&body)
    }
}

// ─── Kline array parsing ──────────────────────────────────────────────────────

/// Each kline is a positional array:
/// `[openTime, open, high, low, close, volume, closeTime, ...]`.
fn parse_klines(body: &str) -> Result<Vec<Candle>> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(body)?;
    rows.iter().map(|row| parse_row(row)).collect()
}

fn parse_row(row: &[Value]) -> Result<Candle> {
    if row.len() < 7 {
        return Err(Error::Exchange(format!(
            "kline row has {} fields, expected at least 7",
            row.len()
        )));
    }

    let millis = |i: usize, field: &str| {
        row[i]
            .as_i64()
            .ok_or_else(|| Error::Exchange(format!("{field} is not an integer: {}", row[i])))
            .and_then(|ms| from_millis(field, ms))
    };
    let decimal = |i: usize, field: &str| match row[i].as_str() {
        Some(raw) => parse_decimal(field, raw),
        None => Err(Error::Exchange(format!("{field} is not a string: {}", row[i]))),
    };

    Ok(Candle {
        opentime: millis(0, "open time")?,
        open: decimal(1, "open")?,
        high: decimal(2, "high")?,
        low: decimal(3, "low")?,
        close: decimal(4, "close")?,
        volume: decimal(5, "volume")?,
        closetime: millis(6, "close time")?,
    })
}
