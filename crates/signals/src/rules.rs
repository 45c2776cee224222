use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use common::{Action, Category, Condition, PriceSource};

use crate::indicators::{
    ema_name, sma_name, IndicatorEngine, IndicatorSpec, Snapshot, BB_LOWER, BB_UPPER, MACD,
    MACD_SIGNAL, STOCH_D, STOCH_K,
};

pub const STOCH_OVERSOLD: f64 = 20.0;
pub const STOCH_OVERBOUGHT: f64 = 80.0;

/// Which side of the comparison a predicate looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Above,
    Below,
}

impl Direction {
    fn compare(self, a: f64, b: f64) -> bool {
        match self {
            Direction::Above => a > b,
            Direction::Below => a < b,
        }
    }

    fn opposite(self) -> Self {
        match self {
            Direction::Above => Direction::Below,
            Direction::Below => Direction::Above,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WickSide {
    Upper,
    Lower,
}

/// The shape of a rule. Column names refer to snapshot keys: indicator
/// columns or the raw candle fields (`open`, `close`, `volume`, ...).
///
/// `holds` returns `None` whenever an input it reads is undefined, which
/// makes the rule skip the bar.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Every input is beyond `bound` on the current bar.
    Threshold {
        inputs: Vec<String>,
        bound: f64,
        direction: Direction,
    },
    /// `a` is above/below `b` on the current bar.
    Position {
        a: String,
        b: String,
        direction: Direction,
    },
    /// `a` is strictly above/below `b` now and was strictly on the other side
    /// on the previous bar. Touching on the previous bar is not a cross.
    Crossover {
        a: String,
        b: String,
        direction: Direction,
    },
    /// Volume beats its average and the bar body points the same way.
    VolumeConfirmation {
        volume_average: String,
        direction: Direction,
    },
    /// The bar has no wick on the given side.
    NoWick { side: WickSide },
    All(Vec<Predicate>),
}

impl Predicate {
    pub fn holds(&self, prev: &Snapshot, curr: &Snapshot) -> Option<bool> {
        match self {
            Predicate::Threshold {
                inputs,
                bound,
                direction,
            } => {
                let mut all = true;
                for input in inputs {
                    let value = curr.get(input)?;
                    all &= direction.compare(value, *bound);
                }
                Some(all)
            }
            Predicate::Position { a, b, direction } => {
                Some(direction.compare(curr.get(a)?, curr.get(b)?))
            }
            Predicate::Crossover { a, b, direction } => {
                let now = direction.compare(curr.get(a)?, curr.get(b)?);
                let before = direction.opposite().compare(prev.get(a)?, prev.get(b)?);
                Some(now && before)
            }
            Predicate::VolumeConfirmation {
                volume_average,
                direction,
            } => {
                let volume = curr.get(PriceSource::Volume.as_str())?;
                let average = curr.get(volume_average)?;
                let open = curr.get(PriceSource::Open.as_str())?;
                let close = curr.get(PriceSource::Close.as_str())?;
                Some(volume > average && direction.compare(close, open))
            }
            Predicate::NoWick { side } => {
                let open = curr.get(PriceSource::Open.as_str())?;
                let close = curr.get(PriceSource::Close.as_str())?;
                Some(match side {
                    WickSide::Upper => curr.get(PriceSource::High.as_str())? <= open.max(close),
                    WickSide::Lower => curr.get(PriceSource::Low.as_str())? >= open.min(close),
                })
            }
            Predicate::All(parts) => {
                let mut all = true;
                for part in parts {
                    all &= part.holds(prev, curr)?;
                }
                Some(all)
            }
        }
    }
}

/// Result of checking one rule against a pair of snapshots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    /// An input was undefined; leave the condition as it is.
    Skipped,
    Holds { observed: f64 },
    Clear,
}

/// A named rule. The name doubles as the identity of the condition it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub action: Action,
    pub category: Category,
    pub description: String,
    pub weight: i64,
    /// Snapshot column reported as the condition's observed value.
    pub observe: String,
    pub predicate: Predicate,
}

impl Rule {
    pub fn evaluate(&self, prev: &Snapshot, curr: &Snapshot) -> Evaluation {
        match self.predicate.holds(prev, curr) {
            None => Evaluation::Skipped,
            Some(false) => Evaluation::Clear,
            Some(true) => match curr.get(&self.observe) {
                Some(observed) => Evaluation::Holds { observed },
                None => Evaluation::Skipped,
            },
        }
    }

    pub fn condition(&self, observed: f64, at: DateTime<Utc>) -> Condition {
        Condition {
            name: self.name.clone(),
            action: self.action,
            category: self.category,
            description: self.description.clone(),
            weight: self.weight,
            observed_value: observed,
            created_at: at,
        }
    }
}

/// Ordered, immutable list of rules derived from the registered indicators.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
}

impl RuleRegistry {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Build the standard rule set for whatever the engine computes.
    /// Rules whose indicators are not registered are left out; `weights`
    /// overrides default weights by rule name.
    pub fn standard(
        indicators: &IndicatorEngine,
        heikin_ashi: bool,
        weights: &BTreeMap<String, i64>,
    ) -> Self {
        let mut rules = Vec::new();
        let specs = indicators.specs();

        if specs.iter().any(|s| matches!(s, IndicatorSpec::Stochastic { .. })) {
            rules.extend(stochastic_rules());
        }
        if specs.iter().any(|s| matches!(s, IndicatorSpec::Bollinger { .. })) {
            rules.extend(bollinger_rules());
        }

        let mut close_periods: Vec<usize> = specs
            .iter()
            .filter_map(|s| match *s {
                IndicatorSpec::Sma {
                    period,
                    source: PriceSource::Close,
                } => Some(period),
                _ => None,
            })
            .collect();
        close_periods.sort_unstable_by(|a, b| b.cmp(a));
        for period in close_periods {
            rules.extend(moving_average_rules(&sma_name(period, PriceSource::Close)));
        }

        for spec in specs {
            if let IndicatorSpec::Sma {
                period,
                source: PriceSource::Volume,
            } = *spec
            {
                rules.extend(volume_rules(&sma_name(period, PriceSource::Volume)));
            }
        }

        if specs.iter().any(|s| matches!(s, IndicatorSpec::Macd { .. })) {
            rules.extend(macd_rules());
        }

        let ribbon = [8, 13, 21, 55].map(|p| ema_name(p, PriceSource::Close));
        if ribbon.iter().all(|name| indicators.has_column(name)) {
            rules.push(ema_ribbon_rule());
        }

        if heikin_ashi {
            rules.extend(heikin_ashi_rules());
        }

        for (name, weight) in weights {
            match rules.iter_mut().find(|r| &r.name == name) {
                Some(rule) => rule.weight = *weight,
                None => warn!(rule = %name, "Weight override for unknown rule ignored"),
            }
        }

        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// ─── Rule tables ──────────────────────────────────────────────────────────────

fn rule(
    name: impl Into<String>,
    action: Action,
    category: Category,
    description: impl Into<String>,
    weight: i64,
    observe: &str,
    predicate: Predicate,
) -> Rule {
    Rule {
        name: name.into(),
        action,
        category,
        description: description.into(),
        weight,
        observe: observe.to_string(),
        predicate,
    }
}

fn position(a: &str, b: &str, direction: Direction) -> Predicate {
    Predicate::Position {
        a: a.to_string(),
        b: b.to_string(),
        direction,
    }
}

fn crossover(a: &str, b: &str, direction: Direction) -> Predicate {
    Predicate::Crossover {
        a: a.to_string(),
        b: b.to_string(),
        direction,
    }
}

fn stochastic_rules() -> Vec<Rule> {
    let both = || vec![STOCH_K.to_string(), STOCH_D.to_string()];
    vec![
        rule(
            "stochastic_oversold",
            Action::Buy,
            Category::Oscillator,
            format!("K and D lines are below lower threshold ({STOCH_OVERSOLD})"),
            2,
            STOCH_K,
            Predicate::Threshold {
                inputs: both(),
                bound: STOCH_OVERSOLD,
                direction: Direction::Below,
            },
        ),
        rule(
            "stochastic_overbought",
            Action::Sell,
            Category::Oscillator,
            format!("K and D lines are above upper threshold ({STOCH_OVERBOUGHT})"),
            -2,
            STOCH_K,
            Predicate::Threshold {
                inputs: both(),
                bound: STOCH_OVERBOUGHT,
                direction: Direction::Above,
            },
        ),
        rule(
            "stochastic_bullish_market",
            Action::Neutral,
            Category::Oscillator,
            "K line is above D, indicating bullish market",
            1,
            STOCH_K,
            position(STOCH_K, STOCH_D, Direction::Above),
        ),
        rule(
            "stochastic_bearish_market",
            Action::Neutral,
            Category::Oscillator,
            "K line is below D, indicating bearish market",
            -1,
            STOCH_K,
            position(STOCH_K, STOCH_D, Direction::Below),
        ),
        rule(
            "stochastic_bullish_crossover",
            Action::Buy,
            Category::Oscillator,
            "K crossed over D",
            2,
            STOCH_K,
            crossover(STOCH_K, STOCH_D, Direction::Above),
        ),
        rule(
            "stochastic_bearish_crossover",
            Action::Sell,
            Category::Oscillator,
            "D crossed over K",
            -2,
            STOCH_K,
            crossover(STOCH_K, STOCH_D, Direction::Below),
        ),
    ]
}

fn bollinger_rules() -> Vec<Rule> {
    let close = PriceSource::Close.as_str();
    vec![
        rule(
            "price_below_bollinger_lower",
            Action::Buy,
            Category::Volatility,
            "Closing below the lower Bollinger Band",
            1,
            BB_LOWER,
            position(close, BB_LOWER, Direction::Below),
        ),
        rule(
            "price_above_bollinger_upper",
            Action::Sell,
            Category::Volatility,
            "Closing above the upper Bollinger Band",
            -1,
            BB_UPPER,
            position(close, BB_UPPER, Direction::Above),
        ),
    ]
}

fn moving_average_rules(ma: &str) -> Vec<Rule> {
    let close = PriceSource::Close.as_str();
    vec![
        rule(
            format!("price_above_{ma}"),
            Action::Neutral,
            Category::Average,
            format!("Closing higher than Moving Average ({ma})"),
            1,
            ma,
            position(close, ma, Direction::Above),
        ),
        rule(
            format!("price_below_{ma}"),
            Action::Neutral,
            Category::Average,
            format!("Closing lower than Moving Average ({ma})"),
            -1,
            ma,
            position(close, ma, Direction::Below),
        ),
        rule(
            format!("price_crossed_over_{ma}"),
            Action::Buy,
            Category::Average,
            format!("Price crossed over {ma}"),
            2,
            ma,
            crossover(close, ma, Direction::Above),
        ),
        rule(
            format!("price_crossed_under_{ma}"),
            Action::Sell,
            Category::Average,
            format!("Price crossed under {ma}"),
            -2,
            ma,
            crossover(close, ma, Direction::Below),
        ),
    ]
}

fn volume_rules(average: &str) -> Vec<Rule> {
    let volume = PriceSource::Volume.as_str();
    vec![
        rule(
            format!("bullish_volume_above_{average}"),
            Action::Buy,
            Category::Volume,
            format!("Trading volume is higher than {average} on a rising bar"),
            1,
            volume,
            Predicate::VolumeConfirmation {
                volume_average: average.to_string(),
                direction: Direction::Above,
            },
        ),
        rule(
            format!("bearish_volume_above_{average}"),
            Action::Sell,
            Category::Volume,
            format!("Trading volume is higher than {average} on a falling bar"),
            -1,
            volume,
            Predicate::VolumeConfirmation {
                volume_average: average.to_string(),
                direction: Direction::Below,
            },
        ),
    ]
}

fn macd_rules() -> Vec<Rule> {
    vec![
        rule(
            "macd_bullish_crossover",
            Action::Buy,
            Category::Oscillator,
            "MACD crossed over the signal line",
            2,
            MACD,
            crossover(MACD, MACD_SIGNAL, Direction::Above),
        ),
        rule(
            "macd_bearish_crossover",
            Action::Sell,
            Category::Oscillator,
            "The signal line crossed over the MACD",
            -2,
            MACD,
            crossover(MACD, MACD_SIGNAL, Direction::Below),
        ),
    ]
}

fn ema_ribbon_rule() -> Rule {
    let [ema8, ema13, ema21, ema55] = [8, 13, 21, 55].map(|p| ema_name(p, PriceSource::Close));
    rule(
        "ema_ribbon_buy_in",
        Action::Buy,
        Category::Average,
        format!("{ema21} crossed over {ema55} while {ema8} is above {ema13}"),
        3,
        &ema21,
        Predicate::All(vec![
            crossover(&ema21, &ema55, Direction::Above),
            position(&ema8, &ema13, Direction::Above),
        ]),
    )
}

fn heikin_ashi_rules() -> Vec<Rule> {
    let close = PriceSource::Close.as_str();
    vec![
        rule(
            "heikin_ashi_no_lower_wick",
            Action::Buy,
            Category::Pattern,
            "Heikin-Ashi bar has no lower wick",
            1,
            close,
            Predicate::NoWick {
                side: WickSide::Lower,
            },
        ),
        rule(
            "heikin_ashi_no_upper_wick",
            Action::Sell,
            Category::Pattern,
            "Heikin-Ashi bar has no upper wick",
            -1,
            close,
            Predicate::NoWick {
                side: WickSide::Upper,
            },
        ),
    ]
}
