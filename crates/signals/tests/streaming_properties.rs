use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use common::{Action, AppendOutcome, Candle, MarketState, PriceSource};
use signals::indicators::{BB_LOWER, BB_MIDDLE, BB_UPPER, MACD, MACD_SIGNAL, STOCH_D, STOCH_K};
use signals::{
    ConditionDelta, ConditionTracker, IndicatorEngine, IndicatorSpec, RuleRegistry, SignalConfig,
    SignalPipeline, Snapshot,
};

fn start() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_600_000_000_000).unwrap()
}

fn bar(minute: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
    let opentime = start() + Duration::minutes(minute);
    Candle {
        opentime,
        open,
        high,
        low,
        close,
        volume,
        closetime: opentime + Duration::seconds(59),
    }
}

fn from_closes(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| bar(i as i64, c, c + 0.5, c - 0.5, c, 100.0 + i as f64))
        .collect()
}

/// Deterministic wobbly price path long enough to warm every default indicator.
fn wobble(n: usize) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let x = i as f64;
            let close = 100.0 + 8.0 * (x * 0.21).sin() + 3.0 * (x * 0.05).cos();
            let open = close - (x * 0.9).sin();
            let high = open.max(close) + 0.4 + (x * 0.3).cos().abs();
            let low = open.min(close) - 0.4 - (x * 0.7).sin().abs();
            bar(i as i64, open, high, low, close, 50.0 + 40.0 * (x * 0.4).sin().abs())
        })
        .collect()
}

fn default_pipeline() -> SignalPipeline {
    SignalPipeline::new(&SignalConfig::default(), false).unwrap()
}

fn all_histories(p: &SignalPipeline) -> BTreeMap<String, Vec<(DateTime<Utc>, Option<f64>)>> {
    p.indicators()
        .column_names()
        .map(|name| (name.to_string(), p.indicator_history(name).unwrap()))
        .collect()
}

fn snapshot(values: &[(&str, f64)]) -> Snapshot {
    Snapshot::new(
        0,
        start(),
        values.iter().map(|(k, v)| (k.to_string(), Some(*v))).collect(),
    )
}

#[test]
fn sma_three_of_rising_closes() {
    let config = SignalConfig {
        indicators: vec![IndicatorSpec::Sma {
            period: 3,
            source: PriceSource::Close,
        }],
        weights: BTreeMap::new(),
    };
    let mut p = SignalPipeline::new(&config, false).unwrap();
    for candle in from_closes(&[10.0, 12.0, 14.0, 16.0, 18.0]) {
        p.append(candle);
    }
    let history = p.indicator_history("SMA-3-close").unwrap();
    assert_eq!(history[0].1, None);
    assert_eq!(history[1].1, None);
    assert_eq!(history[4].1, Some(16.0));
}

#[test]
fn constant_closes_collapse_bollinger_bands() {
    let mut p = default_pipeline();
    for candle in from_closes(&[100.0; 20]) {
        p.append(candle);
    }
    let snap = p.latest_snapshot().unwrap();
    assert_eq!(snap.get(BB_MIDDLE), Some(100.0));
    assert_eq!(snap.get(BB_UPPER), Some(100.0));
    assert_eq!(snap.get(BB_LOWER), Some(100.0));
}

#[test]
fn warmup_regions_are_undefined() {
    let mut p = default_pipeline();
    for candle in wobble(40) {
        p.append(candle);
    }
    let engine = p.indicators();
    assert!((0..19).all(|i| engine.value(BB_UPPER, i).is_none()));
    assert!(engine.value(BB_UPPER, 19).is_some());
    assert!((0..25).all(|i| engine.value(MACD, i).is_none()));
    assert!((0..34).all(|i| engine.value(MACD_SIGNAL, i).is_none()));
    assert!(engine.value(MACD_SIGNAL, 34).is_some());
    // Fewer bars than the period: undefined everywhere.
    assert!(p
        .indicator_history("SMA-50-close")
        .unwrap()
        .iter()
        .all(|(_, v)| v.is_none()));
}

#[test]
fn flat_range_leaves_stochastic_undefined_and_rules_skipped() {
    let mut p = default_pipeline();
    for i in 0..16 {
        p.append(bar(i, 10.0, 10.0, 10.0, 10.0, 1.0));
    }
    let snap = p.latest_snapshot().unwrap();
    assert_eq!(snap.get(STOCH_K), None);
    assert!(!p.conditions().contains("stochastic_oversold"));
    assert!(!p.conditions().contains("stochastic_overbought"));

    // An active oversold condition survives a bar where %K is undefined.
    let engine = IndicatorEngine::new(vec![IndicatorSpec::stochastic()]).unwrap();
    let mut tracker = ConditionTracker::new(RuleRegistry::standard(&engine, false, &BTreeMap::new()));
    tracker.evaluate(
        &snapshot(&[(STOCH_K, 12.0), (STOCH_D, 14.0)]),
        &snapshot(&[(STOCH_K, 10.0), (STOCH_D, 13.0)]),
        start(),
    );
    assert!(tracker.conditions().contains("stochastic_oversold"));

    let deltas = tracker.evaluate(&snapshot(&[(STOCH_K, 10.0), (STOCH_D, 13.0)]), &snap, start());
    assert!(deltas.is_empty());
    assert!(tracker.conditions().contains("stochastic_oversold"));
}

#[test]
fn stochastic_bullish_crossover_is_added_then_dropped() {
    let engine = IndicatorEngine::new(vec![IndicatorSpec::stochastic()]).unwrap();
    let mut tracker = ConditionTracker::new(RuleRegistry::standard(&engine, false, &BTreeMap::new()));

    let before = snapshot(&[(STOCH_K, 10.0), (STOCH_D, 15.0)]);
    let crossed = snapshot(&[(STOCH_K, 18.0), (STOCH_D, 14.0)]);
    let reversed = snapshot(&[(STOCH_K, 12.0), (STOCH_D, 15.0)]);

    let deltas = tracker.evaluate(&before, &crossed, start());
    assert!(deltas.contains(&ConditionDelta::Added("stochastic_bullish_crossover".into())));
    let condition = tracker.conditions().get("stochastic_bullish_crossover").unwrap();
    assert_eq!(condition.action, Action::Buy);
    assert!(condition.weight > 0);
    assert_eq!(condition.observed_value, 18.0);

    let deltas = tracker.evaluate(&crossed, &reversed, start() + Duration::minutes(1));
    assert!(deltas.contains(&ConditionDelta::Dropped("stochastic_bullish_crossover".into())));
    assert!(deltas.contains(&ConditionDelta::Added("stochastic_bearish_crossover".into())));
    assert!(!tracker.conditions().contains("stochastic_bullish_crossover"));
}

#[test]
fn duplicate_close_event_is_idempotent() {
    let bars = wobble(60);
    let mut once = default_pipeline();
    let mut twice = default_pipeline();
    for candle in &bars {
        once.append(*candle);
        twice.append(*candle);
    }
    let last = *bars.last().unwrap();
    assert_eq!(twice.append(last).outcome, AppendOutcome::Replaced);
    let replay = twice.append(last);
    assert_eq!(replay.outcome, AppendOutcome::Replaced);
    assert!(replay.deltas.is_empty());

    assert_eq!(once.series().len(), twice.series().len());
    assert_eq!(all_histories(&once), all_histories(&twice));
    assert_eq!(once.conditions(), twice.conditions());
}

#[test]
fn out_of_order_candle_leaves_state_unchanged() {
    let bars = wobble(50);
    let mut p = default_pipeline();
    for candle in &bars {
        p.append(*candle);
    }
    let histories = all_histories(&p);
    let conditions = p.conditions().clone();

    let result = p.append(bars[10]);
    assert_eq!(result.outcome, AppendOutcome::RejectedOutOfOrder);
    assert!(result.deltas.is_empty());
    assert_eq!(p.series().len(), 50);
    assert_eq!(all_histories(&p), histories);
    assert_eq!(p.conditions(), &conditions);
}

#[test]
fn verdict_follows_total_weight() {
    let mut p = default_pipeline();
    let mut last = None;
    for candle in wobble(120) {
        last = Some(p.append(candle));
    }
    let result = last.unwrap();
    let total: i64 = result.active_conditions.iter().map(|c| c.weight).sum();
    assert_eq!(result.total_weight, total);
    let expected = if total > 0 {
        MarketState::Bullish
    } else {
        MarketState::Bearish
    };
    assert_eq!(result.market_state, expected);
}

#[test]
fn heikin_ashi_pipeline_sees_transformed_bars() {
    let mut p = SignalPipeline::new(&SignalConfig::default(), true).unwrap();
    for candle in wobble(30) {
        p.append(candle);
    }
    assert!(p.rules().get("heikin_ashi_no_upper_wick").is_some());
    let bars = p.series().bars();
    for pair in bars.windows(2) {
        let expected_open = (pair[0].open + pair[0].close) / 2.0;
        assert!((pair[1].open - expected_open).abs() < 1e-9);
    }
}

fn candle_strategy() -> impl Strategy<Value = Vec<(f64, f64, f64, f64)>> {
    // (close, body, upper wick, lower wick)
    prop::collection::vec(
        (1.0f64..10_000.0, -50.0f64..50.0, 0.0f64..20.0, 0.0f64..20.0),
        2..80,
    )
}

fn build(raw: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
    raw.iter()
        .enumerate()
        .map(|(i, &(close, body, up, down))| {
            let open = (close - body).max(0.01);
            let high = open.max(close) + up;
            let low = (open.min(close) - down).max(0.0);
            bar(i as i64, open, high, low, close, 1.0 + up * 10.0)
        })
        .collect()
}

proptest! {
    /// Replaying the newest candle never changes indicators or conditions.
    #[test]
    fn replaying_last_candle_never_drifts(raw in candle_strategy()) {
        let bars = build(&raw);
        let mut p = default_pipeline();
        for candle in &bars {
            p.append(*candle);
        }
        let histories = all_histories(&p);
        let conditions = p.conditions().clone();

        let result = p.append(*bars.last().unwrap());
        prop_assert_eq!(result.outcome, AppendOutcome::Replaced);
        prop_assert_eq!(all_histories(&p), histories);
        prop_assert_eq!(p.conditions(), &conditions);
    }

    /// Any candle older than the newest bar is rejected and changes nothing.
    #[test]
    fn older_candles_are_always_rejected(raw in candle_strategy(), pick in any::<prop::sample::Index>()) {
        let bars = build(&raw);
        let mut p = default_pipeline();
        for candle in &bars {
            p.append(*candle);
        }
        let older = bars[pick.index(bars.len() - 1)];
        let len = p.series().len();
        let histories = all_histories(&p);

        let result = p.append(older);
        prop_assert_eq!(result.outcome, AppendOutcome::RejectedOutOfOrder);
        prop_assert_eq!(p.series().len(), len);
        prop_assert_eq!(all_histories(&p), histories);
    }

    /// Series stays strictly ordered and every defined value is finite.
    #[test]
    fn indicators_stay_finite(raw in candle_strategy()) {
        let bars = build(&raw);
        let mut p = default_pipeline();
        for candle in &bars {
            p.append(*candle);
        }
        let series = p.series().bars();
        prop_assert!(series.windows(2).all(|w| w[0].opentime < w[1].opentime));
        for (_, history) in all_histories(&p) {
            prop_assert!(history.iter().all(|(_, v)| v.map_or(true, f64::is_finite)));
        }
    }
}
