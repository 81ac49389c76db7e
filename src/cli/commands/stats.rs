//! `tactician stats`

use anyhow::Result;
use serde::Serialize;

use super::open_engine;
use crate::cli::output::{output, percent, CommandOutput};
use crate::domain::models::{Config, CounterfactualAnalysis};
use crate::services::{EngineStats, HydrationStatus};

#[derive(Debug, Serialize)]
pub struct StatsOutput {
    pub stats: EngineStats,
    pub counterfactual: CounterfactualAnalysis,
}

impl CommandOutput for StatsOutput {
    fn to_human(&self) -> String {
        let s = &self.stats;
        let hydration = match &s.hydration {
            HydrationStatus::Completed {
                arms_loaded,
                rules_loaded,
                rows_skipped,
            } => format!("{arms_loaded} arm(s), {rules_loaded} rule(s) loaded, {rows_skipped} skipped"),
            HydrationStatus::Failed { error } => format!("failed: {error}"),
            HydrationStatus::InProgress => "in progress".to_string(),
            HydrationStatus::NotStarted => "not started".to_string(),
        };

        let c = &self.counterfactual;
        [
            format!("Arms: {} across {} task type(s)", s.arms, s.task_types),
            format!("Outcomes: {} ({} successes)", s.total_attempts, s.total_successes),
            format!("Decision rules: {}", s.rules),
            format!("Hydration: {hydration}"),
            format!(
                "Policy agreement: {} over {} decision(s){}",
                percent(c.thompson_ucb_agreement),
                c.sample_size,
                if c.is_converged { " (converged)" } else { "" }
            ),
        ]
        .join("\n")
    }
}

pub async fn execute(config: &Config, json_mode: bool) -> Result<()> {
    let engine = open_engine(config).await?;
    let out = StatsOutput {
        stats: engine.get_stats().await,
        counterfactual: engine.get_counterfactual_analysis().await,
    };

    output(&out, json_mode);
    Ok(())
}
