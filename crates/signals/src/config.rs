use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use common::{Error, PriceSource, Result};

use crate::indicators::IndicatorSpec;

/// Largest absolute weight a rule may be given.
pub const MAX_WEIGHT: i64 = 1_000;

/// Signal config file (TOML): which indicators to compute and per-rule
/// weight overrides.
///
/// Example `config/signals.toml`:
/// ```toml
/// [[indicator]]
/// type = "sma"
/// period = 50
/// source = "close"
///
/// [[indicator]]
/// type = "macd"
/// fast = 12
/// slow = 26
/// signal = 9
///
/// [weights]
/// stochastic_oversold = 3
/// macd_bearish_crossover = -3
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SignalConfig {
    #[serde(rename = "indicator", default = "default_indicators")]
    pub indicators: Vec<IndicatorSpec>,
    /// Rule name → weight.
    #[serde(default)]
    pub weights: BTreeMap<String, i64>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            indicators: default_indicators(),
            weights: BTreeMap::new(),
        }
    }
}

fn default_indicators() -> Vec<IndicatorSpec> {
    let mut specs = vec![IndicatorSpec::bollinger(), IndicatorSpec::stochastic()];
    for period in [300, 200, 150, 100, 50, 20] {
        specs.push(IndicatorSpec::Sma {
            period,
            source: PriceSource::Close,
        });
    }
    specs.push(IndicatorSpec::Sma {
        period: 20,
        source: PriceSource::Volume,
    });
    specs.push(IndicatorSpec::macd());
    for period in [8, 13, 21, 55] {
        specs.push(IndicatorSpec::Ema {
            period,
            source: PriceSource::Close,
        });
    }
    specs
}

impl SignalConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("invalid signal config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Every weight override must lie within `±MAX_WEIGHT`.
    pub fn validate(&self) -> Result<()> {
        if let Some((name, weight)) = self
            .weights
            .iter()
            .find(|(_, w)| w.unsigned_abs() > MAX_WEIGHT as u64)
        {
            return Err(Error::Config(format!(
                "weight for '{name}' is {weight}, must be within ±{MAX_WEIGHT}"
            )));
        }
        Ok(())
    }

    /// Load from a TOML file. A missing or unreadable file is an `Io` error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading signal config");
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load from a TOML file, falling back to the built-in set when the file
    /// does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No signal config found, using default indicator set");
            return Ok(Self::default());
        }
        Self::load(path)
    }
}
