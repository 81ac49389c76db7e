//! Context-keyed decision rule learner.
//!
//! A much simpler learner than the bandit: plain frequency counts per
//! `(context, decision)`, with self-pruning of rules that keep failing and
//! have gone stale. Owns its own dirty and pending-delete bookkeeping so the
//! engine can persist it in the same flush pass as the arms.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::domain::models::{rule_id, DecisionRule, RuleContext, RuleVerdict};

/// Result of feeding one outcome to the learner.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleUpdate {
    /// The rule survived and now looks like this.
    Kept(DecisionRule),
    /// The rule met the pruning predicate and was removed.
    Pruned { rule_id: String },
}

impl RuleUpdate {
    pub fn is_pruned(&self) -> bool {
        matches!(self, Self::Pruned { .. })
    }
}

/// In-memory rule store with change tracking.
#[derive(Debug, Default)]
pub struct DecisionRuleLearner {
    rules: HashMap<String, DecisionRule>,
    /// Rule id -> generation of the last change not yet persisted.
    dirty: HashMap<String, u64>,
    /// Rules removed in memory whose stored row still needs deleting.
    pending_deletes: HashSet<String>,
    generation: u64,
}

impl DecisionRuleLearner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create-or-update the rule for `(context, decision)` and apply the
    /// pruning predicate.
    pub fn learn(
        &mut self,
        context: RuleContext,
        decision: &str,
        success: bool,
        now: DateTime<Utc>,
        half_life_days: f64,
    ) -> RuleUpdate {
        let id = rule_id(&context, decision);
        let rule = self
            .rules
            .entry(id.clone())
            .or_insert_with(|| DecisionRule::new(context, decision, now));

        match rule.observe(success, now, half_life_days) {
            RuleVerdict::Keep => {
                let snapshot = rule.clone();
                self.mark_dirty(&id);
                self.pending_deletes.remove(&id);
                RuleUpdate::Kept(snapshot)
            }
            RuleVerdict::Prune => {
                info!(rule_id = %id, "Pruned ineffective decision rule");
                self.remove(&id);
                RuleUpdate::Pruned { rule_id: id }
            }
        }
    }

    /// Highest-effectiveness rule whose context matches exactly and that has
    /// at least `min_attempts` observations.
    pub fn best(&self, context: &RuleContext, min_attempts: u64) -> Option<&DecisionRule> {
        self.rules
            .values()
            .filter(|r| r.attempts >= min_attempts && r.matches(context))
            .max_by(|a, b| {
                a.effectiveness
                    .total_cmp(&b.effectiveness)
                    .then(a.attempts.cmp(&b.attempts))
                    .then(b.rule_id.cmp(&a.rule_id))
            })
    }

    /// Fold a persisted rule into memory. Returns `false` (and schedules the
    /// stored row for deletion) when the merged rule is already prunable.
    pub fn absorb(&mut self, loaded: DecisionRule, now: DateTime<Utc>, half_life_days: f64) -> bool {
        let id = loaded.rule_id.clone();
        let merged = match self.rules.remove(&id) {
            Some(mut existing) => {
                existing.successes += loaded.successes;
                existing.attempts += loaded.attempts;
                existing.effectiveness = if existing.attempts == 0 {
                    0.0
                } else {
                    existing.successes as f64 / existing.attempts as f64
                };
                existing.last_used = existing.last_used.max(loaded.last_used);
                self.mark_dirty(&id);
                existing
            }
            None => loaded,
        };

        if merged.is_prunable_at(now, half_life_days) {
            debug!(rule_id = %id, "Dropping stale decision rule at hydration");
            self.remove(&id);
            return false;
        }
        self.rules.insert(id, merged);
        true
    }

    pub fn get(&self, rule_id: &str) -> Option<&DecisionRule> {
        self.rules.get(rule_id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    pub fn pending_delete_count(&self) -> usize {
        self.pending_deletes.len()
    }

    /// Dirty rules with the generation they were captured at.
    pub fn dirty_snapshot(&self) -> Vec<(DecisionRule, u64)> {
        self.dirty
            .iter()
            .filter_map(|(id, generation)| self.rules.get(id).map(|r| (r.clone(), *generation)))
            .collect()
    }

    pub fn pending_deletes(&self) -> Vec<String> {
        self.pending_deletes.iter().cloned().collect()
    }

    /// Clear the dirty mark if nothing changed since `generation`.
    pub fn mark_clean(&mut self, rule_id: &str, generation: u64) {
        if self.dirty.get(rule_id) == Some(&generation) {
            self.dirty.remove(rule_id);
        }
    }

    /// Forget a completed delete, unless the rule has been re-created since.
    pub fn delete_done(&mut self, rule_id: &str) {
        if !self.rules.contains_key(rule_id) {
            self.pending_deletes.remove(rule_id);
        }
    }

    pub fn clear(&mut self) {
        self.rules.clear();
        self.dirty.clear();
        self.pending_deletes.clear();
    }

    fn mark_dirty(&mut self, rule_id: &str) {
        self.generation += 1;
        self.dirty.insert(rule_id.to_string(), self.generation);
    }

    fn remove(&mut self, rule_id: &str) {
        self.rules.remove(rule_id);
        self.dirty.remove(rule_id);
        self.pending_deletes.insert(rule_id.to_string());
    }
}
