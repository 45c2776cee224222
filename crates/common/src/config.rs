use crate::{Error, Result};

/// Process configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Trading pair, e.g. "BTCUSDT".
    pub pair: String,
    /// Kline interval as Binance spells it, e.g. "1m", "15m", "1h".
    pub interval: String,
    /// Number of historical klines fetched before the live stream starts.
    pub backfill_limit: usize,
    /// Feed indicators Heikin-Ashi bars instead of raw bars.
    pub heikin_ashi: bool,
    /// Path to the TOML file with indicator and weight overrides.
    pub signal_config_path: String,
}

impl Config {
    const DEFAULT_INTERVAL: &'static str = "1m";
    const DEFAULT_BACKFILL_LIMIT: usize = 500;

    /// Load configuration from environment variables.
    /// Loads `.env` if present. Fails on a missing `PAIR` or unparsable values.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let pair = required_env("PAIR")?.to_uppercase();

        let backfill_limit = match optional_env("BACKFILL_LIMIT") {
            Some(v) => v.trim().parse::<usize>().map_err(|_| {
                Error::Config(format!("BACKFILL_LIMIT must be a positive integer, got '{v}'"))
            })?,
            None => Self::DEFAULT_BACKFILL_LIMIT,
        };

        let heikin_ashi = match optional_env("HEIKIN_ASHI") {
            Some(v) => parse_bool(&v).ok_or_else(|| {
                Error::Config(format!("HEIKIN_ASHI must be true or false, got '{v}'"))
            })?,
            None => false,
        };

        Ok(Config {
            pair,
            interval: optional_env("INTERVAL").unwrap_or_else(|| Self::DEFAULT_INTERVAL.to_string()),
            backfill_limit,
            heikin_ashi,
            signal_config_path: optional_env("SIGNAL_CONFIG_PATH")
                .unwrap_or_else(|| "config/signals.toml".to_string()),
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        Error::Config(format!(
            "Required environment variable '{key}' is not set. Check your .env file."
        ))
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
