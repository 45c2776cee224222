use async_trait::async_trait;

use crate::{Candle, Result};

/// Abstraction over the source of historical candles.
///
/// `BinanceRest` implements this for the live exchange. The engine never
/// talks to a source directly: the binary fetches the backfill and hands it
/// to the engine before any live candle is forwarded.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch up to `limit` most recent klines for `pair`, oldest first.
    async fn historical_candles(
        &self,
        pair: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>>;
}
