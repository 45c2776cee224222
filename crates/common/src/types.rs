use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One closed OHLCV bar for a fixed interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub opentime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub closetime: DateTime<Utc>,
}

impl Candle {
    /// Reject non-finite values and highs/lows that do not bound the body.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(self.invalid(format!("{name} is not finite ({value})")));
        }

        if self.high < self.open.max(self.close) {
            return Err(self.invalid(format!(
                "high {} is below the candle body ({} / {})",
                self.high, self.open, self.close
            )));
        }
        if self.low > self.open.min(self.close) {
            return Err(self.invalid(format!(
                "low {} is above the candle body ({} / {})",
                self.low, self.open, self.close
            )));
        }
        Ok(())
    }

    pub fn value(&self, source: PriceSource) -> f64 {
        match source {
            PriceSource::Open => self.open,
            PriceSource::High => self.high,
            PriceSource::Low => self.low,
            PriceSource::Close => self.close,
            PriceSource::Volume => self.volume,
        }
    }

    fn invalid(&self, reason: String) -> Error {
        Error::InvalidCandle {
            opentime: self.opentime,
            reason,
        }
    }
}

/// A raw candle column that indicators can read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl PriceSource {
    pub const ALL: [PriceSource; 5] = [
        PriceSource::Open,
        PriceSource::High,
        PriceSource::Low,
        PriceSource::Close,
        PriceSource::Volume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::Open => "open",
            PriceSource::High => "high",
            PriceSource::Low => "low",
            PriceSource::Close => "close",
            PriceSource::Volume => "volume",
        }
    }
}

impl std::fmt::Display for PriceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PriceSource::ALL
            .into_iter()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| Error::UnknownColumn(s.to_string()))
    }
}

/// What happened to a candle handed to the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendOutcome {
    Appended,
    /// Same opentime as the last bar; the last bar was overwritten.
    Replaced,
    RejectedOutOfOrder,
    RejectedInvalid,
}

impl AppendOutcome {
    /// True when the series changed and indicators must be recomputed.
    pub fn is_applied(&self) -> bool {
        matches!(self, AppendOutcome::Appended | AppendOutcome::Replaced)
    }
}

impl std::fmt::Display for AppendOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppendOutcome::Appended => write!(f, "appended"),
            AppendOutcome::Replaced => write!(f, "replaced"),
            AppendOutcome::RejectedOutOfOrder => write!(f, "rejected (out of order)"),
            AppendOutcome::RejectedInvalid => write!(f, "rejected (invalid)"),
        }
    }
}

/// Direction a condition suggests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
    Neutral,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Buy => write!(f, "Buy"),
            Action::Sell => write!(f, "Sell"),
            Action::Neutral => write!(f, "Neutral"),
        }
    }
}

/// Family of indicator a condition was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Oscillator,
    Average,
    Volume,
    Volatility,
    Pattern,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Oscillator => write!(f, "Oscillator"),
            Category::Average => write!(f, "Average"),
            Category::Volume => write!(f, "Volume"),
            Category::Volatility => write!(f, "Volatility"),
            Category::Pattern => write!(f, "Pattern"),
        }
    }
}

/// A named, weighted observation that currently holds for the market.
/// `name` is the identity; re-adding the same name updates the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub name: String,
    pub action: Action,
    pub category: Category,
    pub description: String,
    pub weight: i64,
    pub observed_value: f64,
    /// Closetime of the bar on which the condition first became active.
    pub created_at: DateTime<Utc>,
}

/// Aggregate verdict over the active conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketState {
    Bullish,
    Bearish,
}

impl MarketState {
    /// Bullish only for a strictly positive total; zero and below are bearish.
    pub fn from_weight(total_weight: i64) -> Self {
        if total_weight > 0 {
            MarketState::Bullish
        } else {
            MarketState::Bearish
        }
    }
}

impl std::fmt::Display for MarketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketState::Bullish => write!(f, "Bullish"),
            MarketState::Bearish => write!(f, "Bearish"),
        }
    }
}

/// Lifecycle of the engine actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Waiting for the historical backfill; live candles are queued.
    #[default]
    WarmingUp,
    Running,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::WarmingUp => write!(f, "warming_up"),
            EngineState::Running => write!(f, "running"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        let t = Utc.timestamp_millis_opt(0).unwrap();
        Candle {
            opentime: t,
            open,
            high,
            low,
            close,
            volume: 1.0,
            closetime: t,
        }
    }

    #[test]
    fn valid_candle_passes() {
        assert!(candle(10.0, 12.0, 9.0, 11.0).validate().is_ok());
    }

    #[test]
    fn high_below_body_is_invalid() {
        let err = candle(10.0, 10.5, 9.0, 11.0).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidCandle { .. }));
    }

    #[test]
    fn low_above_body_is_invalid() {
        assert!(candle(10.0, 12.0, 10.5, 11.0).validate().is_err());
    }

    #[test]
    fn non_finite_is_invalid() {
        assert!(candle(f64::NAN, 12.0, 9.0, 11.0).validate().is_err());
        let mut c = candle(10.0, 12.0, 9.0, 11.0);
        c.volume = f64::INFINITY;
        assert!(c.validate().is_err());
    }

    #[test]
    fn zero_weight_is_bearish() {
        assert_eq!(MarketState::from_weight(0), MarketState::Bearish);
        assert_eq!(MarketState::from_weight(-3), MarketState::Bearish);
        assert_eq!(MarketState::from_weight(1), MarketState::Bullish);
    }

    #[test]
    fn price_source_parses_lowercase_names() {
        assert_eq!("volume".parse::<PriceSource>().unwrap(), PriceSource::Volume);
        assert!("vwap".parse::<PriceSource>().is_err());
    }
}
