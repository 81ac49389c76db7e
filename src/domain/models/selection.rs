//! Selection request options and results.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::beta::BetaDistribution;
use super::counterfactual::ScoredStrategy;

/// Caller-supplied selection options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionOptions {
    /// Use UCB instead of Thompson Sampling.
    #[serde(default)]
    pub deterministic: bool,
}

impl SelectionOptions {
    pub const fn deterministic() -> Self {
        Self { deterministic: true }
    }
}

/// Scoring policy behind a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    Thompson,
    Ucb,
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thompson => f.write_str("thompson"),
            Self::Ucb => f.write_str("ucb"),
        }
    }
}

/// Whether the winner was also the arm believed best.
///
/// Informational only; it never changes the choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMode {
    /// The winner's posterior mean is below the runner-up's.
    Exploration,
    Exploitation,
}

impl fmt::Display for DecisionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exploration => f.write_str("exploration"),
            Self::Exploitation => f.write_str("exploitation"),
        }
    }
}

/// Why a strategy was chosen, e.g. `thompson_exploitation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionReason {
    pub policy: SelectionPolicy,
    pub mode: DecisionMode,
}

impl SelectionReason {
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.policy, self.mode)
    }
}

/// Outcome of a strategy selection.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionResult {
    pub chosen_strategy: String,
    /// Credible-interval confidence of the chosen arm's posterior.
    pub confidence: f64,
    pub reason: SelectionReason,
    /// Recency-adjusted score (Thompson sample or UCB) of the winner.
    pub score: f64,
    pub posterior_mean: f64,
    /// Up to three runners-up, best first.
    pub alternatives: Vec<ScoredStrategy>,
    pub distribution: BetaDistribution,
}

impl SelectionResult {
    pub fn is_exploration(&self) -> bool {
        self.reason.mode == DecisionMode::Exploration
    }
}
