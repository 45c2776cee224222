pub mod rest;
pub mod stream;

pub use rest::BinanceRest;
pub use stream::BinanceStream;

use chrono::{DateTime, TimeZone, Utc};

use common::{Error, Result};

/// Binance sends prices and volumes as decimal strings.
fn parse_decimal(field: &str, raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|_| Error::Exchange(format!("{field} is not a number: '{raw}'")))
}

fn from_millis(field: &str, ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| Error::Exchange(format!("{field} is not a valid timestamp: {ms}")))
}
