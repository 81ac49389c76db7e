//! Counterfactual decision log.
//!
//! Each selection records what the live policy chose next to what UCB
//! would have chosen from the same candidates. The log is bounded,
//! append-only and purely observational.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Default ring-buffer capacity.
pub const DEFAULT_COUNTERFACTUAL_CAPACITY: usize = 200;

/// Number of most recent decisions used for convergence analysis.
pub const DEFAULT_CONVERGENCE_WINDOW: usize = 50;

/// Agreement rate above which the policies are considered converged.
pub const DEFAULT_CONVERGENCE_THRESHOLD: f64 = 0.85;

/// How many records `recent_choices` returns.
const RECENT_CHOICES: usize = 10;

/// A candidate strategy with the score it received.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredStrategy {
    pub strategy: String,
    pub score: f64,
    pub posterior_mean: f64,
}

/// One logged decision.
#[derive(Debug, Clone, Serialize)]
pub struct CounterfactualRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub task_type: String,
    pub chosen_by_policy: String,
    pub chosen_by_ucb: String,
    pub top_alternative_scores: Vec<ScoredStrategy>,
}

impl CounterfactualRecord {
    pub fn agrees(&self) -> bool {
        self.chosen_by_policy == self.chosen_by_ucb
    }
}

/// Summary of how often the live policy matched UCB recently.
#[derive(Debug, Clone, Serialize)]
pub struct CounterfactualAnalysis {
    /// Decisions inside the analysis window.
    pub sample_size: usize,
    pub thompson_ucb_agreement: f64,
    pub is_converged: bool,
    pub recent_choices: Vec<CounterfactualRecord>,
}

/// Bounded ring buffer of [`CounterfactualRecord`]s.
#[derive(Debug, Clone)]
pub struct CounterfactualLog {
    records: VecDeque<CounterfactualRecord>,
    capacity: usize,
}

impl CounterfactualLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Append a record, evicting the oldest beyond capacity.
    pub fn push(&mut self, record: CounterfactualRecord) {
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &CounterfactualRecord> {
        self.records.iter()
    }

    /// Agreement over the most recent `window` decisions.
    pub fn analysis(&self, window: usize, threshold: f64) -> CounterfactualAnalysis {
        let recent: Vec<&CounterfactualRecord> = self.records.iter().rev().take(window).collect();
        let sample_size = recent.len();
        let agreement = if sample_size == 0 {
            0.0
        } else {
            recent.iter().filter(|r| r.agrees()).count() as f64 / sample_size as f64
        };

        CounterfactualAnalysis {
            sample_size,
            thompson_ucb_agreement: agreement,
            is_converged: sample_size > 0 && agreement > threshold,
            recent_choices: recent.into_iter().take(RECENT_CHOICES).cloned().collect(),
        }
    }
}

impl Default for CounterfactualLog {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTERFACTUAL_CAPACITY)
    }
}
