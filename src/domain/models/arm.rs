//! Strategy arms: one Beta posterior per `(task_type, strategy)` pair.
//!
//! An arm's `distribution` holds evidence as of `evidence_at`. Reads decay
//! that evidence forward to the requested instant; writes first materialise
//! the decay and then apply the conjugate update, so evidence is never
//! decayed twice for the same span of time.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::beta::BetaDistribution;
use super::decay::{decay_factor, elapsed_days};
use crate::domain::errors::{DomainError, DomainResult};

/// Pattern type under which arms are persisted.
pub const STRATEGY_ARM_PATTERN: &str = "strategy_arm";

// ---------------------------------------------------------------------------
// ArmKey
// ---------------------------------------------------------------------------

/// Composite identity of an arm.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArmKey {
    pub task_type: String,
    pub strategy: String,
}

impl ArmKey {
    pub fn new(task_type: impl Into<String>, strategy: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            strategy: strategy.into(),
        }
    }

    /// Key used in the pattern store: both parts with `\` and `:` escaped,
    /// joined by a bare `:`. Distinct arms never share a key.
    pub fn pattern_key(&self) -> String {
        format!(
            "{}:{}",
            escape_key_part(&self.task_type),
            escape_key_part(&self.strategy)
        )
    }
}

fn escape_key_part(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        if matches!(c, '\\' | ':') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl fmt::Display for ArmKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.task_type, self.strategy)
    }
}

// ---------------------------------------------------------------------------
// Outcome diagnostics
// ---------------------------------------------------------------------------

/// Optional numeric measurements attached to an outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

/// One entry of an arm's rolling diagnostic history. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeSample {
    pub success: bool,
    pub recorded_at: DateTime<Utc>,
    pub metrics: OutcomeMetrics,
}

// ---------------------------------------------------------------------------
// Arm
// ---------------------------------------------------------------------------

/// Bandit state for a single strategy within a task type.
#[derive(Debug, Clone)]
pub struct Arm {
    pub key: ArmKey,
    /// Posterior as of `evidence_at`.
    pub distribution: BetaDistribution,
    /// Raw lifetime success count (not decayed).
    pub successes: u64,
    /// Raw lifetime attempt count (not decayed).
    pub attempts: u64,
    pub last_used: DateTime<Utc>,
    /// Instant the stored `distribution` has been decayed to.
    pub evidence_at: DateTime<Utc>,
    pub history: VecDeque<OutcomeSample>,
}

impl Arm {
    /// A fresh arm at the uniform prior.
    pub fn new(key: ArmKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            distribution: BetaDistribution::uniform(),
            successes: 0,
            attempts: 0,
            last_used: now,
            evidence_at: now,
            history: VecDeque::new(),
        }
    }

    /// The posterior as it stands at `now`, without mutating the arm.
    pub fn posterior_at(&self, now: DateTime<Utc>, half_life_days: f64) -> BetaDistribution {
        let factor = decay_factor(elapsed_days(self.evidence_at, now), half_life_days);
        self.distribution.decayed(factor)
    }

    /// Materialise decay up to `now`. Calling this twice with the same `now`
    /// is a no-op the second time.
    pub fn decay_to(&mut self, now: DateTime<Utc>, half_life_days: f64) {
        if now > self.evidence_at {
            self.distribution = self.posterior_at(now, half_life_days);
            self.evidence_at = now;
        }
    }

    /// Apply the conjugate Beta-Bernoulli update for one observed outcome.
    pub fn record(
        &mut self,
        success: bool,
        metrics: OutcomeMetrics,
        now: DateTime<Utc>,
        half_life_days: f64,
        history_capacity: usize,
    ) {
        self.decay_to(now, half_life_days);

        if success {
            self.distribution.alpha += 1.0;
            self.successes += 1;
        } else {
            self.distribution.beta += 1.0;
        }
        self.attempts += 1;
        self.last_used = self.last_used.max(now);

        self.history.push_back(OutcomeSample {
            success,
            recorded_at: now,
            metrics,
        });
        while self.history.len() > history_capacity {
            self.history.pop_front();
        }
    }

    /// Fold another arm's evidence and counters into this one. Both sides are
    /// decayed to `now` first.
    pub fn absorb(&mut self, other: &Self, now: DateTime<Utc>, half_life_days: f64) {
        self.decay_to(now, half_life_days);
        let incoming = other.posterior_at(now, half_life_days);
        self.distribution = self.distribution.combined(&incoming);
        self.successes += other.successes;
        self.attempts += other.attempts;
        self.last_used = self.last_used.max(other.last_used);
    }

    /// Raw lifetime success rate.
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }

    /// Posterior summary at `now`.
    pub fn summary(&self, now: DateTime<Utc>, half_life_days: f64) -> PosteriorSummary {
        let posterior = self.posterior_at(now, half_life_days);
        PosteriorSummary {
            task_type: self.key.task_type.clone(),
            strategy: self.key.strategy.clone(),
            confidence: posterior.confidence(),
            posterior_mean: posterior.mean(),
            posterior_variance: posterior.variance(),
            distribution: posterior,
            total_attempts: self.attempts,
            successes: self.successes,
            success_rate: self.success_rate(),
            last_used: Some(self.last_used),
        }
    }

    /// Serialisable snapshot for the pattern store.
    pub fn to_payload(&self) -> ArmPayload {
        ArmPayload {
            task_type: self.key.task_type.clone(),
            strategy: self.key.strategy.clone(),
            successes: self.successes,
            attempts: self.attempts,
            alpha_minus_one: Some(self.distribution.alpha - 1.0),
            beta_minus_one: Some(self.distribution.beta - 1.0),
            last_used_at: self.last_used,
            evidence_at: Some(self.evidence_at),
        }
    }
}

// ---------------------------------------------------------------------------
// ArmPayload
// ---------------------------------------------------------------------------

/// Persisted form of an arm.
///
/// `alpha_minus_one`/`beta_minus_one` are the lossless encoding. Rows written
/// without them are reconstructed from the raw counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmPayload {
    pub task_type: String,
    pub strategy: String,
    pub successes: u64,
    pub attempts: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha_minus_one: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beta_minus_one: Option<f64>,
    pub last_used_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_at: Option<DateTime<Utc>>,
}

impl TryFrom<ArmPayload> for Arm {
    type Error = DomainError;

    fn try_from(payload: ArmPayload) -> DomainResult<Self> {
        if payload.task_type.is_empty() || payload.strategy.is_empty() {
            return Err(DomainError::SerializationError(
                "arm payload is missing task_type or strategy".to_string(),
            ));
        }

        let failures = payload.attempts.saturating_sub(payload.successes);
        let alpha_minus_one = payload
            .alpha_minus_one
            .unwrap_or(payload.successes as f64);
        let beta_minus_one = payload
            .beta_minus_one
            .unwrap_or(failures.max(1) as f64);

        if !(alpha_minus_one.is_finite() && beta_minus_one.is_finite()) {
            return Err(DomainError::SerializationError(format!(
                "arm payload {}:{} has non-finite shape parameters",
                payload.task_type, payload.strategy
            )));
        }

        Ok(Self {
            key: ArmKey::new(payload.task_type, payload.strategy),
            distribution: BetaDistribution::new(
                1.0 + alpha_minus_one.max(0.0),
                1.0 + beta_minus_one.max(0.0),
            ),
            successes: payload.successes,
            attempts: payload.attempts.max(payload.successes),
            last_used: payload.last_used_at,
            evidence_at: payload.evidence_at.unwrap_or(payload.last_used_at),
            history: VecDeque::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// PosteriorSummary
// ---------------------------------------------------------------------------

/// Posterior summary for one arm, returned after each recorded outcome and
/// by the per-task-type metrics report.
#[derive(Debug, Clone, Serialize)]
pub struct PosteriorSummary {
    pub task_type: String,
    pub strategy: String,
    /// Credible-interval confidence (how sure we are).
    pub confidence: f64,
    /// Expected success rate.
    pub posterior_mean: f64,
    pub posterior_variance: f64,
    pub distribution: BetaDistribution,
    pub total_attempts: u64,
    pub successes: u64,
    pub success_rate: f64,
    pub last_used: Option<DateTime<Utc>>,
}

/// Result of recording an outcome.
pub type UpdateResult = PosteriorSummary;
