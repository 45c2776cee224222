use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};
use url::Url;

use common::{Candle, Error, Result};

use super::{from_millis, parse_decimal};

/// Binance kline WebSocket stream for a single pair and interval.
///
/// Only closed klines (`x == true`) are forwarded; the in-progress updates
/// Binance pushes every second or two are dropped here. Reconnects
/// automatically with exponential backoff and stops once the receiving side
/// of the channel is gone.
pub struct BinanceStream {
    pair: String,
    interval: String,
    candle_tx: mpsc::Sender<Candle>,
}

impl BinanceStream {
    pub fn new(
        pair: impl Into<String>,
        interval: impl Into<String>,
        candle_tx: mpsc::Sender<Candle>,
    ) -> Self {
        Self {
            pair: pair.into(),
            interval: interval.into(),
            candle_tx,
        }
    }

    pub fn url(&self) -> String {
        format!(
            "wss://stream.binance.com:9443/ws/{}@kline_{}",
            self.pair.to_lowercase(),
            self.interval
        )
    }

    /// Run the stream loop, reconnecting on failure.
    /// Call this inside a `tokio::spawn`.
    pub async fn run(self) {
        let mut backoff = Duration::from_secs(1);
        const MAX_BACKOFF: Duration = Duration::from_secs(60);

        loop {
            info!(pair = %self.pair, interval = %self.interval, "Connecting to Binance WebSocket stream");
            match self.connect_once().await {
                Ok(()) => {
                    info!(pair = %self.pair, "WebSocket stream closed cleanly");
                    // Binance ends every connection after 24h
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    backoff = Duration::from_secs(1);
                }
                Err(Error::EngineClosed) => {
                    info!(pair = %self.pair, "Candle receiver dropped, stopping stream");
                    return;
                }
                Err(e) => {
                    warn!(pair = %self.pair, error = %e, backoff = ?backoff, "WebSocket error, reconnecting");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn connect_once(&self) -> Result<()> {
        let url = Url::parse(&self.url()).map_err(|e| Error::WebSocket(e.to_string()))?;

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;

        let (_, mut read) = ws_stream.split();

        while let Some(msg) = read.next().await {
            let msg = msg.map_err(|e| Error::WebSocket(e.to_string()))?;

            if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                match parse_kline_event(&text) {
                    Ok(Some(candle)) => {
                        debug!(pair = %self.pair, opentime = %candle.opentime, close = candle.close, "Closed kline received");
                        self.candle_tx
                            .send(candle)
                            .await
                            .map_err(|_| Error::EngineClosed)?;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "Failed to parse kline event");
                    }
                }
            }
        }

        Ok(())
    }
}

// ─── Binance kline JSON parsing ──────────────────────────────────────────────

#[derive(Deserialize)]
struct KlineWrapper {
    k: KlineData,
}

#[derive(Deserialize)]
struct KlineData {
    #[serde(rename = "t")]
    open_time_ms: i64,
    #[serde(rename = "T")]
    close_time_ms: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "x")]
    is_closed: bool,
}

/// `Ok(None)` for anything that is not a closed kline.
fn parse_kline_event(text: &str) -> Result<Option<Candle>> {
    let wrapper: serde_json::Value = serde_json::from_str(text)?;
    if wrapper.get("e").and_then(|v| v.as_str()) != Some("kline") {
        return Ok(None);
    }

    let k = serde_json::from_value::<KlineWrapper>(wrapper)?.k;
    if !k.is_closed {
        return Ok(None);
    }

    Ok(Some(Candle {
        opentime: from_millis("open time", k.open_time_ms)?,
        open: parse_decimal("open", &k.open)?,
        high: parse_decimal("high", &k.high)?,
        low: parse_decimal("low", &k.low)?,
        close: parse_decimal("close", &k.close)?,
        volume: parse_decimal("volume", &k.volume)?,
        closetime: from_millis("close time", k.close_time_ms)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(closed: bool) -> String {
        format!(
            r#"{{
                "e": "kline", "E": 1672515782136, "s": "BNBBTC",
                "k": {{
                    "t": 1672515780000, "T": 1672515839999, "s": "BNBBTC", "i": "1m",
                    "f": 100, "L": 200, "o": "0.0010", "c": "0.0020", "h": "0.0025",
                    "l": "0.0015", "v": "1000", "n": 100, "x": {closed}, "q": "1.0000",
                    "V": "500", "Q": "0.500", "B": "123456"
                }}
            }}"#
        )
    }

    #[test]
    fn closed_kline_becomes_candle() {
        let candle = parse_kline_event(&event(true)).unwrap().unwrap();
        assert_eq!(candle.opentime.timestamp_millis(), 1_672_515_780_000);
        assert_eq!(candle.closetime.timestamp_millis(), 1_672_515_839_999);
        assert_eq!(candle.open, 0.001);
        assert_eq!(candle.high, 0.0025);
        assert_eq!(candle.low, 0.0015);
        assert_eq!(candle.close, 0.002);
        // Base asset volume, not the trade count.
        assert_eq!(candle.volume, 1000.0);
    }

    #[test]
    fn open_kline_is_skipped() {
        assert!(parse_kline_event(&event(false)).unwrap().is_none());
    }

    #[test]
    fn non_kline_message_is_skipped() {
        assert!(parse_kline_event(r#"{"result":null,"id":1}"#).unwrap().is_none());
    }

    #[test]
    fn stream_url_uses_pair_and_interval() {
        let (tx, _rx) = mpsc::channel(1);
        let stream = BinanceStream::new("BTCUSDT", "15m", tx);
        assert_eq!(
            stream.url(),
            "wss://stream.binance.com:9443/ws/btcusdt@kline_15m"
        );
    }
}
