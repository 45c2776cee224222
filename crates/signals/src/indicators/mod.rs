pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod sma;
pub mod stochastic;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{AppendOutcome, Candle, Error, PriceSource, Result};

use self::macd::MacdState;

pub const BB_MIDDLE: &str = "BBM";
pub const BB_UPPER: &str = "BBU";
pub const BB_LOWER: &str = "BBL";
pub const STOCH_K: &str = "stoch_k";
pub const STOCH_D: &str = "stoch_d";
pub const MACD: &str = "MACD";
pub const MACD_SIGNAL: &str = "MACD-S";

/// One registered indicator and its parameters.
///
/// Deserialized from `[[indicator]]` entries in the signal config:
/// ```toml
/// [[indicator]]
/// type = "sma"
/// period = 50
/// source = "close"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IndicatorSpec {
    Sma {
        period: usize,
        #[serde(default = "default_source")]
        source: PriceSource,
    },
    Ema {
        period: usize,
        #[serde(default = "default_source")]
        source: PriceSource,
    },
    Bollinger {
        #[serde(default = "default_bb_period")]
        period: usize,
        #[serde(default = "default_bb_std")]
        num_std: f64,
    },
    Stochastic {
        #[serde(default = "default_stoch_window")]
        window: usize,
        #[serde(default = "default_stoch_smoothing")]
        smoothing: usize,
    },
    Macd {
        #[serde(default = "default_macd_fast")]
        fast: usize,
        #[serde(default = "default_macd_slow")]
        slow: usize,
        #[serde(default = "default_macd_signal")]
        signal: usize,
    },
}

fn default_source() -> PriceSource {
    PriceSource::Close
}
fn default_bb_period() -> usize {
    20
}
fn default_bb_std() -> f64 {
    2.0
}
fn default_stoch_window() -> usize {
    14
}
fn default_stoch_smoothing() -> usize {
    3
}
fn default_macd_fast() -> usize {
    12
}
fn default_macd_slow() -> usize {
    26
}
fn default_macd_signal() -> usize {
    9
}

pub fn sma_name(period: usize, source: PriceSource) -> String {
    format!("SMA-{period}-{source}")
}

pub fn ema_name(period: usize, source: PriceSource) -> String {
    format!("EMA-{period}-{source}")
}

impl IndicatorSpec {
    pub fn bollinger() -> Self {
        IndicatorSpec::Bollinger {
            period: default_bb_period(),
            num_std: default_bb_std(),
        }
    }

    pub fn stochastic() -> Self {
        IndicatorSpec::Stochastic {
            window: default_stoch_window(),
            smoothing: default_stoch_smoothing(),
        }
    }

    pub fn macd() -> Self {
        IndicatorSpec::Macd {
            fast: default_macd_fast(),
            slow: default_macd_slow(),
            signal: default_macd_signal(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            IndicatorSpec::Sma { .. } => "sma",
            IndicatorSpec::Ema { .. } => "ema",
            IndicatorSpec::Bollinger { .. } => "bollinger",
            IndicatorSpec::Stochastic { .. } => "stochastic",
            IndicatorSpec::Macd { .. } => "macd",
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ok = match *self {
            IndicatorSpec::Sma { period, .. } | IndicatorSpec::Ema { period, .. } => period >= 1,
            IndicatorSpec::Bollinger { period, num_std } => {
                period >= 1 && num_std.is_finite() && num_std >= 0.0
            }
            IndicatorSpec::Stochastic { window, smoothing } => window >= 1 && smoothing >= 1,
            IndicatorSpec::Macd { fast, slow, signal } => fast >= 1 && fast < slow && signal >= 1,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::Config(format!("invalid indicator parameters: {self:?}")))
        }
    }

    /// Published columns and the first index at which each is defined.
    pub fn columns(&self) -> Vec<(String, usize)> {
        match *self {
            IndicatorSpec::Sma { period, source } => vec![(sma_name(period, source), period - 1)],
            IndicatorSpec::Ema { period, source } => vec![(ema_name(period, source), 0)],
            IndicatorSpec::Bollinger { period, .. } => vec![
                (BB_MIDDLE.to_string(), period - 1),
                (BB_UPPER.to_string(), period - 1),
                (BB_LOWER.to_string(), period - 1),
            ],
            IndicatorSpec::Stochastic { window, smoothing } => vec![
                (STOCH_K.to_string(), window - 1),
                (STOCH_D.to_string(), window + smoothing - 2),
            ],
            IndicatorSpec::Macd { fast, slow, signal } => vec![
                (ema_name(fast, PriceSource::Close), 0),
                (ema_name(slow, PriceSource::Close), 0),
                (MACD.to_string(), macd::macd_warmup(slow)),
                (MACD_SIGNAL.to_string(), macd::signal_warmup(slow, signal)),
            ],
        }
    }
}

/// Values of one indicator, aligned 1:1 with the candle series.
///
/// Values below `warmup` are kept for the recurrences that need them but
/// always read as undefined.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    name: String,
    warmup: usize,
    values: Vec<Option<f64>>,
}

impl IndicatorSeries {
    fn new(name: String, warmup: usize) -> Self {
        Self {
            name,
            warmup,
            values: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn warmup(&self) -> usize {
        self.warmup
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        if index < self.warmup {
            return None;
        }
        self.raw(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        (0..self.values.len()).map(move |i| self.get(i))
    }

    fn raw(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().flatten()
    }
}

/// Indicator values plus raw candle fields at one bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub index: usize,
    pub opentime: DateTime<Utc>,
    values: BTreeMap<String, Option<f64>>,
}

impl Snapshot {
    pub fn new(index: usize, opentime: DateTime<Utc>, values: BTreeMap<String, Option<f64>>) -> Self {
        Self {
            index,
            opentime,
            values,
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().flatten()
    }

    pub fn values(&self) -> &BTreeMap<String, Option<f64>> {
        &self.values
    }

    #[cfg(test)]
    pub(crate) fn from_pairs(index: usize, pairs: &[(&str, f64)]) -> Self {
        let values = pairs
            .iter()
            .map(|(name, value)| (name.to_string(), Some(*value)))
            .collect();
        Self::new(index, DateTime::<Utc>::default(), values)
    }
}

#[derive(Debug, Clone, Default)]
struct ColumnStore {
    columns: BTreeMap<String, IndicatorSeries>,
}

impl ColumnStore {
    fn raw(&self, name: &str, index: usize) -> Option<f64> {
        self.columns.get(name).and_then(|c| c.raw(index))
    }

    fn prev_raw(&self, name: &str, index: usize) -> Option<f64> {
        index.checked_sub(1).and_then(|i| self.raw(name, i))
    }

    /// Write the value at `index` unless another registration already did.
    /// Columns are always either one short of `index + 1` or already at it.
    fn record(&mut self, name: &str, index: usize, value: Option<f64>) {
        if let Some(column) = self.columns.get_mut(name) {
            debug_assert!(
                column.values.len() == index || column.values.len() == index + 1,
                "column {name} has {} values, cannot write index {index}",
                column.values.len()
            );
            if column.values.len() == index {
                column.values.push(value);
            }
        }
    }

    fn truncate(&mut self, len: usize) {
        for column in self.columns.values_mut() {
            column.values.truncate(len);
        }
    }

    fn apply(&mut self, spec: &IndicatorSpec, bars: &[Candle], index: usize) {
        match *spec {
            IndicatorSpec::Sma { period, source } => {
                let value = sma::sma_at(|i| bars.get(i).map(|b| b.value(source)), index, period);
                self.record(&sma_name(period, source), index, value);
            }
            IndicatorSpec::Ema { period, source } => {
                let name = ema_name(period, source);
                let prev = self.prev_raw(&name, index);
                let value = ema::ema_step(prev, bars[index].value(source), period);
                self.record(&name, index, Some(value));
            }
            IndicatorSpec::Bollinger { period, num_std } => {
                let bands = bollinger::bands_at(bars, index, period, num_std);
                self.record(BB_MIDDLE, index, bands.map(|b| b.middle));
                self.record(BB_UPPER, index, bands.map(|b| b.upper));
                self.record(BB_LOWER, index, bands.map(|b| b.lower));
            }
            IndicatorSpec::Stochastic { window, smoothing } => {
                let k = stochastic::percent_k_at(bars, index, window);
                self.record(STOCH_K, index, k);
                let d = sma::sma_at(|i| self.raw(STOCH_K, i), index, smoothing);
                self.record(STOCH_D, index, d);
            }
            IndicatorSpec::Macd { fast, slow, signal } => {
                let fast_name = ema_name(fast, PriceSource::Close);
                let slow_name = ema_name(slow, PriceSource::Close);
                let prev = match (
                    self.prev_raw(&fast_name, index),
                    self.prev_raw(&slow_name, index),
                    self.prev_raw(MACD, index),
                    self.prev_raw(MACD_SIGNAL, index),
                ) {
                    (Some(fast), Some(slow), Some(macd), Some(signal)) => Some(MacdState {
                        fast,
                        slow,
                        macd,
                        signal,
                    }),
                    _ => None,
                };
                let state = macd::macd_step(prev.as_ref(), bars[index].close, fast, slow, signal);
                self.record(&fast_name, index, Some(state.fast));
                self.record(&slow_name, index, Some(state.slow));
                self.record(MACD, index, Some(state.macd));
                self.record(MACD_SIGNAL, index, Some(state.signal));
            }
        }
    }
}

/// Computes the registered indicator set, one bar at a time.
///
/// Only the newest index is ever (re)computed; earlier values are final.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    specs: Vec<IndicatorSpec>,
    store: ColumnStore,
}

impl IndicatorEngine {
    pub fn new(specs: Vec<IndicatorSpec>) -> Result<Self> {
        let mut unique: Vec<IndicatorSpec> = Vec::with_capacity(specs.len());
        for spec in specs {
            spec.validate()?;
            if unique.contains(&spec) {
                continue;
            }
            let fixed_names = matches!(
                spec,
                IndicatorSpec::Bollinger { .. }
                    | IndicatorSpec::Stochastic { .. }
                    | IndicatorSpec::Macd { .. }
            );
            if fixed_names && unique.iter().any(|s| s.kind() == spec.kind()) {
                return Err(Error::Config(format!(
                    "only one {} indicator may be registered",
                    spec.kind()
                )));
            }
            unique.push(spec);
        }

        let mut store = ColumnStore::default();
        for spec in &unique {
            for (name, warmup) in spec.columns() {
                store
                    .columns
                    .entry(name.clone())
                    .or_insert_with(|| IndicatorSeries::new(name, warmup));
            }
        }

        Ok(Self {
            specs: unique,
            store,
        })
    }

    pub fn specs(&self) -> &[IndicatorSpec] {
        &self.specs
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.store.columns.contains_key(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.store.columns.keys().map(String::as_str)
    }

    pub fn series(&self, name: &str) -> Option<&IndicatorSeries> {
        self.store.columns.get(name)
    }

    /// Number of bars the columns have been computed for.
    pub fn computed_len(&self) -> usize {
        self.store
            .columns
            .values()
            .map(IndicatorSeries::len)
            .max()
            .unwrap_or(0)
    }

    pub fn value(&self, name: &str, index: usize) -> Option<f64> {
        self.store.columns.get(name).and_then(|c| c.get(index))
    }

    /// Bring every column in line with `bars` after an append.
    ///
    /// On `Replaced` the stale value at the last index is discarded first, so
    /// recurrences restart from the bar before it.
    pub fn update(&mut self, bars: &[Candle], outcome: AppendOutcome) {
        if !outcome.is_applied() {
            return;
        }
        let Some(index) = bars.len().checked_sub(1) else {
            return;
        };

        self.store.truncate(index);
        for spec in &self.specs {
            self.store.apply(spec, bars, index);
        }
        debug!(index, columns = self.store.columns.len(), "Indicators recomputed");
    }

    /// Every indicator column plus the raw candle fields at `index`.
    pub fn snapshot(&self, bars: &[Candle], index: usize) -> Option<Snapshot> {
        let bar = bars.get(index)?;
        let mut values: BTreeMap<String, Option<f64>> = self
            .store
            .columns
            .iter()
            .map(|(name, column)| (name.clone(), column.get(index)))
            .collect();
        for source in PriceSource::ALL {
            values.insert(source.as_str().to_string(), Some(bar.value(source)));
        }

        Some(Snapshot::new(index, bar.opentime, values))
    }
}
