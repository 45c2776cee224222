use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use common::{AppendOutcome, Candle, Condition, Error, MarketState, Result};

use crate::aggregator::{summarize, Summary};
use crate::conditions::{ConditionDelta, ConditionSet, ConditionTracker};
use crate::config::SignalConfig;
use crate::indicators::{IndicatorEngine, Snapshot};
use crate::rules::RuleRegistry;
use crate::series::CandleSeries;

/// Everything a caller learns from handing one candle to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub outcome: AppendOutcome,
    /// Values at the newest bar; `None` while the series is empty.
    pub snapshot: Option<Snapshot>,
    pub deltas: Vec<ConditionDelta>,
    pub active_conditions: Vec<Condition>,
    pub total_weight: i64,
    pub market_state: MarketState,
}

/// Series, indicators and condition tracking for one trading pair.
///
/// Not thread-safe by itself: it is meant to be owned by a single task (see
/// `engine::Engine`), which applies candles strictly one at a time.
#[derive(Debug, Clone)]
pub struct SignalPipeline {
    series: CandleSeries,
    indicators: IndicatorEngine,
    tracker: ConditionTracker,
}

impl SignalPipeline {
    pub fn new(config: &SignalConfig, heikin_ashi: bool) -> Result<Self> {
        config.validate()?;
        let indicators = IndicatorEngine::new(config.indicators.clone())?;
        let rules = RuleRegistry::standard(&indicators, heikin_ashi, &config.weights);
        Self::from_parts(CandleSeries::new(heikin_ashi), indicators, rules)
    }

    /// Assemble a pipeline from fresh parts. Indicators are only ever computed
    /// bar by bar as candles arrive, so both the series and the engine must
    /// still be empty.
    pub fn from_parts(
        series: CandleSeries,
        indicators: IndicatorEngine,
        rules: RuleRegistry,
    ) -> Result<Self> {
        if !series.is_empty() || indicators.computed_len() != 0 {
            return Err(Error::Config(format!(
                "pipeline parts must start empty (series has {} bars, indicators cover {})",
                series.len(),
                indicators.computed_len()
            )));
        }
        Ok(Self {
            series,
            indicators,
            tracker: ConditionTracker::new(rules),
        })
    }

    pub fn series(&self) -> &CandleSeries {
        &self.series
    }

    pub fn indicators(&self) -> &IndicatorEngine {
        &self.indicators
    }

    pub fn conditions(&self) -> &ConditionSet {
        self.tracker.conditions()
    }

    pub fn rules(&self) -> &RuleRegistry {
        self.tracker.rules()
    }

    pub fn summary(&self) -> Summary {
        summarize(self.tracker.conditions())
    }

    /// Append → recompute → evaluate → summarize.
    ///
    /// A rejected candle leaves every piece of state untouched; the result
    /// then reports the rejection together with the unchanged summary.
    pub fn append(&mut self, candle: Candle) -> EvaluationResult {
        let (outcome, deltas) = match self.series.append(candle) {
            Ok(outcome) => {
                if outcome == AppendOutcome::Replaced {
                    warn!(
                        opentime = %candle.opentime,
                        "Candle has the same opening time as the last bar, replacing it"
                    );
                }
                self.indicators.update(self.series.bars(), outcome);
                (outcome, self.evaluate_latest(outcome))
            }
            Err(e @ Error::OutOfOrderCandle { .. }) => {
                warn!(error = %e, "Discarding out-of-order candle");
                (AppendOutcome::RejectedOutOfOrder, Vec::new())
            }
            Err(e) => {
                warn!(error = %e, "Discarding invalid candle");
                (AppendOutcome::RejectedInvalid, Vec::new())
            }
        };

        let summary = self.summary();
        debug!(
            %outcome,
            bars = self.series.len(),
            total_weight = summary.total_weight,
            market = %summary.market_state,
            "Evaluation complete"
        );

        EvaluationResult {
            outcome,
            snapshot: self.latest_snapshot(),
            deltas,
            active_conditions: summary.active_conditions,
            total_weight: summary.total_weight,
            market_state: summary.market_state,
        }
    }

    /// Snapshot at the newest bar.
    pub fn latest_snapshot(&self) -> Option<Snapshot> {
        let index = self.series.len().checked_sub(1)?;
        self.indicators.snapshot(self.series.bars(), index)
    }

    /// Every value of an indicator (or raw candle column) with its bar's
    /// opentime, oldest first.
    pub fn indicator_history(&self, name: &str) -> Result<Vec<(DateTime<Utc>, Option<f64>)>> {
        let bars = self.series.bars();
        if let Some(series) = self.indicators.series(name) {
            return Ok(bars
                .iter()
                .zip(series.iter())
                .map(|(bar, value)| (bar.opentime, value))
                .collect());
        }

        let column = self.series.column(name)?;
        Ok(bars
            .iter()
            .zip(column)
            .map(|(bar, value)| (bar.opentime, Some(value)))
            .collect())
    }

    fn evaluate_latest(&mut self, outcome: AppendOutcome) -> Vec<ConditionDelta> {
        let len = self.series.len();
        if len < 2 {
            return Vec::new();
        }
        let bars = self.series.bars();
        let (Some(prev), Some(curr)) = (
            self.indicators.snapshot(bars, len - 2),
            self.indicators.snapshot(bars, len - 1),
        ) else {
            return Vec::new();
        };
        let at = bars[len - 1].closetime;
        if outcome == AppendOutcome::Replaced {
            self.tracker.reevaluate(&prev, &curr, at)
        } else {
            self.tracker.evaluate(&prev, &curr, at)
        }
    }
}
