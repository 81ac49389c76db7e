//! Context-keyed decision rules.
//!
//! A rule pairs a flat context (string keys to primitive values) with a
//! decision and tracks how often that decision worked in that context.
//! Contexts are kept in a `BTreeMap`, so their canonical serialisation, and
//! therefore their rule id, does not depend on insertion order.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::decay::recency_weight;
use crate::domain::errors::{DomainError, DomainResult};

/// Pattern type under which rules are persisted.
pub const DECISION_RULE_PATTERN: &str = "decision_rule";

/// A rule needs more attempts than this before it can be pruned.
pub const PRUNE_MIN_ATTEMPTS: u64 = 10;

/// Effectiveness below which a rule counts as failing.
pub const PRUNE_MAX_EFFECTIVENESS: f64 = 0.3;

/// Recency weight below which a rule counts as stale.
pub const PRUNE_MAX_RECENCY: f64 = 0.3;

// ---------------------------------------------------------------------------
// ContextValue / RuleContext
// ---------------------------------------------------------------------------

/// A primitive context value. Nested structures are not representable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ContextValue {
    /// Interpret a command-line style literal: booleans, then integers, then
    /// floats, falling back to text.
    pub fn parse_literal(raw: &str) -> Self {
        if let Ok(b) = raw.parse::<bool>() {
            return Self::Bool(b);
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Self::Integer(i);
        }
        match raw.parse::<f64>() {
            Ok(f) if f.is_finite() => Self::Float(f),
            _ => Self::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ContextValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ContextValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for ContextValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for ContextValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Ordered key-value context a decision was made in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleContext(BTreeMap<String, ContextValue>);

impl RuleContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ContextValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ContextValue)> {
        self.0.iter()
    }

    /// The first key whose value has no canonical form (NaN or an infinite
    /// float), if any. Such contexts cannot be hashed, matched or persisted.
    pub fn non_finite_key(&self) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, v)| matches!(v, ContextValue::Float(f) if !f.is_finite()))
            .map(|(k, _)| k.as_str())
    }

    /// Canonical form: a compact JSON object with keys in byte order.
    pub fn canonical(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    /// Stable 64-bit fingerprint of the canonical form.
    pub fn fingerprint(&self) -> u64 {
        fnv1a64(self.canonical().as_bytes())
    }
}

impl<K, V> FromIterator<(K, V)> for RuleContext
where
    K: Into<String>,
    V: Into<ContextValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// 64-bit FNV-1a.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        h ^= u64::from(*b);
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    h
}

/// Identifier of the rule for `decision` taken in `context`.
pub fn rule_id(context: &RuleContext, decision: &str) -> String {
    format!("{:016x}:{}", context.fingerprint(), decision)
}

// ---------------------------------------------------------------------------
// DecisionRule
// ---------------------------------------------------------------------------

/// Frequency statistics for one `(context, decision)` pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionRule {
    pub rule_id: String,
    pub context: RuleContext,
    pub decision: String,
    pub successes: u64,
    pub attempts: u64,
    pub effectiveness: f64,
    pub last_used: DateTime<Utc>,
}

/// What happened to a rule after an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleVerdict {
    Keep,
    Prune,
}

impl DecisionRule {
    pub fn new(context: RuleContext, decision: impl Into<String>, now: DateTime<Utc>) -> Self {
        let decision = decision.into();
        Self {
            rule_id: rule_id(&context, &decision),
            context,
            decision,
            successes: 0,
            attempts: 0,
            effectiveness: 0.0,
            last_used: now,
        }
    }

    /// Record one outcome.
    ///
    /// Staleness is judged on the idle time *before* this observation, so a
    /// rule that kept failing and then sat unused is pruned on its next
    /// update. Kept rules get `last_used` refreshed.
    pub fn observe(&mut self, success: bool, now: DateTime<Utc>, half_life_days: f64) -> RuleVerdict {
        self.attempts += 1;
        if success {
            self.successes += 1;
        }
        self.effectiveness = self.successes as f64 / self.attempts as f64;

        let recency = recency_weight(Some(self.last_used), now, half_life_days);
        if self.should_prune(recency) {
            return RuleVerdict::Prune;
        }
        self.last_used = self.last_used.max(now);
        RuleVerdict::Keep
    }

    /// Pruning predicate for a given recency weight.
    pub fn should_prune(&self, recency: f64) -> bool {
        self.attempts > PRUNE_MIN_ATTEMPTS
            && self.effectiveness < PRUNE_MAX_EFFECTIVENESS
            && recency < PRUNE_MAX_RECENCY
    }

    /// Pruning predicate evaluated at `now`.
    pub fn is_prunable_at(&self, now: DateTime<Utc>, half_life_days: f64) -> bool {
        self.should_prune(recency_weight(Some(self.last_used), now, half_life_days))
    }

    /// Exact-shape match: same key set, same values.
    pub fn matches(&self, context: &RuleContext) -> bool {
        self.context == *context
    }

    pub fn to_payload(&self) -> DecisionRulePayload {
        DecisionRulePayload {
            context: self.context.clone(),
            decision: self.decision.clone(),
            successes: self.successes,
            attempts: self.attempts,
            last_used_at: self.last_used,
        }
    }
}

/// Persisted form of a decision rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRulePayload {
    pub context: RuleContext,
    pub decision: String,
    pub successes: u64,
    pub attempts: u64,
    pub last_used_at: DateTime<Utc>,
}

impl TryFrom<DecisionRulePayload> for DecisionRule {
    type Error = DomainError;

    fn try_from(payload: DecisionRulePayload) -> DomainResult<Self> {
        if payload.decision.is_empty() {
            return Err(DomainError::SerializationError(
                "decision rule payload has an empty decision".to_string(),
            ));
        }
        let attempts = payload.attempts.max(payload.successes);
        let effectiveness = if attempts == 0 {
            0.0
        } else {
            payload.successes as f64 / attempts as f64
        };
        Ok(Self {
            rule_id: rule_id(&payload.context, &payload.decision),
            context: payload.context,
            decision: payload.decision,
            successes: payload.successes,
            attempts,
            effectiveness,
            last_used: payload.last_used_at,
        })
    }
}
