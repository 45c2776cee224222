use serde::Serialize;

use common::{Condition, MarketState};

use crate::conditions::ConditionSet;

/// Reduction of the active condition set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_weight: i64,
    pub market_state: MarketState,
    /// Sorted by name.
    pub active_conditions: Vec<Condition>,
}

/// Sum the active weights and derive the market verdict. Pure: the result
/// depends only on `conditions`. The sum saturates instead of overflowing.
pub fn summarize(conditions: &ConditionSet) -> Summary {
    let mut active_conditions: Vec<Condition> = conditions.iter().cloned().collect();
    active_conditions.sort_by(|a, b| a.name.cmp(&b.name));
    let total_weight = active_conditions
        .iter()
        .fold(0i64, |total, c| total.saturating_add(c.weight));

    Summary {
        total_weight,
        market_state: MarketState::from_weight(total_weight),
        active_conditions,
    }
}
