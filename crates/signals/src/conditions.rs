use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use common::Condition;

use crate::indicators::Snapshot;
use crate::rules::{Evaluation, RuleRegistry};

/// Change to the condition set produced by one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", content = "name", rename_all = "lowercase")]
pub enum ConditionDelta {
    Added(String),
    Updated(String),
    Dropped(String),
}

/// Active conditions keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionSet {
    conditions: HashMap<String, Condition>,
}

/// What `upsert` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Added,
    Updated,
    Unchanged,
}

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite by name. An existing record keeps its original
    /// `created_at`; every other field takes the new value.
    pub fn upsert(&mut self, mut condition: Condition) -> Upsert {
        match self.conditions.get_mut(&condition.name) {
            Some(existing) => {
                condition.created_at = existing.created_at;
                if *existing == condition {
                    Upsert::Unchanged
                } else {
                    *existing = condition;
                    Upsert::Updated
                }
            }
            None => {
                self.conditions.insert(condition.name.clone(), condition);
                Upsert::Added
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Condition> {
        self.conditions.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Condition> {
        self.conditions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.conditions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.values()
    }
}

/// Owns the rule registry and the live condition set.
#[derive(Debug, Clone, Default)]
pub struct ConditionTracker {
    rules: RuleRegistry,
    conditions: ConditionSet,
    /// The set as it stood before the newest bar was first evaluated.
    checkpoint: ConditionSet,
}

impl ConditionTracker {
    pub fn new(rules: RuleRegistry) -> Self {
        Self {
            rules,
            conditions: ConditionSet::new(),
            checkpoint: ConditionSet::new(),
        }
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    pub fn conditions(&self) -> &ConditionSet {
        &self.conditions
    }

    /// Run every rule against the previous and current snapshots of a newly
    /// appended bar.
    ///
    /// A rule that holds upserts its condition, one that does not removes it,
    /// and one with an undefined input leaves it alone. Replaying the same
    /// pair of snapshots yields the same set and no further deltas.
    pub fn evaluate(
        &mut self,
        prev: &Snapshot,
        curr: &Snapshot,
        at: DateTime<Utc>,
    ) -> Vec<ConditionDelta> {
        self.checkpoint = self.conditions.clone();
        let before = self.checkpoint.clone();
        self.apply_rules(prev, curr, at);
        self.changes_since(&before)
    }

    /// Evaluate the newest bar again after it was replaced.
    ///
    /// Conditions first go back to how they stood before that bar was
    /// evaluated, so nothing derived from the replaced bar survives a rule
    /// that now skips. Deltas are reported against the set before this call.
    pub fn reevaluate(
        &mut self,
        prev: &Snapshot,
        curr: &Snapshot,
        at: DateTime<Utc>,
    ) -> Vec<ConditionDelta> {
        let before = std::mem::replace(&mut self.conditions, self.checkpoint.clone());
        self.apply_rules(prev, curr, at);
        self.changes_since(&before)
    }

    fn apply_rules(&mut self, prev: &Snapshot, curr: &Snapshot, at: DateTime<Utc>) {
        for rule in self.rules.rules() {
            match rule.evaluate(prev, curr) {
                Evaluation::Skipped => {}
                Evaluation::Holds { observed } => {
                    self.conditions.upsert(rule.condition(observed, at));
                }
                Evaluation::Clear => {
                    self.conditions.remove(&rule.name);
                }
            }
        }
    }

    /// Deltas from `before` to the current set, in rule order.
    fn changes_since(&self, before: &ConditionSet) -> Vec<ConditionDelta> {
        let mut deltas = Vec::new();
        for rule in self.rules.rules() {
            let name = &rule.name;
            match (before.get(name), self.conditions.get(name)) {
                (None, Some(added)) => {
                    debug!(condition = %name, value = added.observed_value, "Added condition");
                    deltas.push(ConditionDelta::Added(name.clone()));
                }
                (Some(old), Some(new)) if old != new => {
                    deltas.push(ConditionDelta::Updated(name.clone()));
                }
                (Some(_), None) => {
                    debug!(condition = %name, "Dropped condition");
                    deltas.push(ConditionDelta::Dropped(name.clone()));
                }
                _ => {}
            }
        }
        deltas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{STOCH_D, STOCH_K};
    use crate::rules::{Direction, Predicate, Rule};
    use common::{Action, Category};

    fn tracker() -> ConditionTracker {
        ConditionTracker::new(RuleRegistry::new(vec![Rule {
            name: "k_above_d".into(),
            action: Action::Neutral,
            category: Category::Oscillator,
            description: "K above D".into(),
            weight: 1,
            observe: STOCH_K.into(),
            predicate: Predicate::Position {
                a: STOCH_K.into(),
                b: STOCH_D.into(),
                direction: Direction::Above,
            },
        }]))
    }

    fn snap(k: f64, d: f64) -> Snapshot {
        Snapshot::from_pairs(0, &[(STOCH_K, k), (STOCH_D, d)])
    }

    #[test]
    fn add_update_drop_lifecycle() {
        let mut t = tracker();
        let t0 = DateTime::<Utc>::default();
        let t1 = t0 + chrono::Duration::minutes(1);

        let deltas = t.evaluate(&snap(1.0, 2.0), &snap(3.0, 2.0), t0);
        assert_eq!(deltas, vec![ConditionDelta::Added("k_above_d".into())]);

        let deltas = t.evaluate(&snap(3.0, 2.0), &snap(4.0, 2.0), t1);
        assert_eq!(deltas, vec![ConditionDelta::Updated("k_above_d".into())]);
        let cond = t.conditions().get("k_above_d").unwrap();
        assert_eq!(cond.observed_value, 4.0);
        assert_eq!(cond.created_at, t0);

        let deltas = t.evaluate(&snap(4.0, 2.0), &snap(1.0, 2.0), t1);
        assert_eq!(deltas, vec![ConditionDelta::Dropped("k_above_d".into())]);
        assert!(t.conditions().is_empty());
    }

    #[test]
    fn replaying_a_bar_is_idempotent() {
        let mut t = tracker();
        let at = DateTime::<Utc>::default();
        t.evaluate(&snap(1.0, 2.0), &snap(3.0, 2.0), at);
        let once = t.conditions().clone();

        let deltas = t.evaluate(&snap(1.0, 2.0), &snap(3.0, 2.0), at);
        assert!(deltas.is_empty());
        assert_eq!(t.conditions(), &once);
        assert_eq!(t.conditions().len(), 1);
    }

    #[test]
    fn undefined_input_leaves_condition_untouched() {
        let mut t = tracker();
        let at = DateTime::<Utc>::default();
        t.evaluate(&snap(1.0, 2.0), &snap(3.0, 2.0), at);

        let undefined = Snapshot::from_pairs(1, &[(STOCH_D, 2.0)]);
        let deltas = t.evaluate(&snap(3.0, 2.0), &undefined, at);
        assert!(deltas.is_empty());
        assert!(t.conditions().contains("k_above_d"));
    }

    #[test]
    fn replaced_bar_that_now_skips_drops_its_condition() {
        let mut t = tracker();
        let t0 = DateTime::<Utc>::default();
        t.evaluate(&snap(1.0, 2.0), &snap(3.0, 2.0), t0);
        assert!(t.conditions().contains("k_above_d"));

        let undefined = Snapshot::from_pairs(1, &[(STOCH_D, 2.0)]);
        let deltas = t.reevaluate(&snap(1.0, 2.0), &undefined, t0);
        assert_eq!(deltas, vec![ConditionDelta::Dropped("k_above_d".into())]);
        assert!(t.conditions().is_empty());
    }

    #[test]
    fn replacement_keeps_conditions_from_earlier_bars() {
        let mut t = tracker();
        let t0 = DateTime::<Utc>::default();
        let t1 = t0 + chrono::Duration::minutes(1);
        t.evaluate(&snap(1.0, 2.0), &snap(3.0, 2.0), t0);
        t.evaluate(&snap(3.0, 2.0), &snap(4.0, 2.0), t1);

        let undefined = Snapshot::from_pairs(2, &[(STOCH_D, 2.0)]);
        let deltas = t.reevaluate(&snap(3.0, 2.0), &undefined, t1);
        assert_eq!(deltas, vec![ConditionDelta::Updated("k_above_d".into())]);
        let cond = t.conditions().get("k_above_d").unwrap();
        assert_eq!(cond.observed_value, 3.0);
        assert_eq!(cond.created_at, t0);

        // Same replacement again changes nothing.
        assert!(t.reevaluate(&snap(3.0, 2.0), &undefined, t1).is_empty());
    }

    #[test]
    fn removing_absent_condition_is_a_no_op() {
        let mut set = ConditionSet::new();
        assert!(set.remove("missing").is_none());
        assert!(set.is_empty());
    }
}
