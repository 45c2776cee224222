pub mod aggregator;
pub mod conditions;
pub mod config;
pub mod heikin_ashi;
pub mod indicators;
pub mod pipeline;
pub mod rules;
pub mod series;

pub use aggregator::{summarize, Summary};
pub use conditions::{ConditionDelta, ConditionSet, ConditionTracker};
pub use config::SignalConfig;
pub use indicators::{IndicatorEngine, IndicatorSeries, IndicatorSpec, Snapshot};
pub use pipeline::{EvaluationResult, SignalPipeline};
pub use rules::{Evaluation, Predicate, Rule, RuleRegistry};
pub use series::CandleSeries;
