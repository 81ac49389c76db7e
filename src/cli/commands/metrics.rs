//! `tactician metrics`

use anyhow::Result;
use serde::Serialize;

use super::open_engine;
use crate::cli::output::{list_table, output, percent, CommandOutput};
use crate::domain::models::{Config, PosteriorSummary};

#[derive(Debug, Serialize)]
pub struct MetricsOutput {
    pub task_type: String,
    pub strategies: Vec<PosteriorSummary>,
}

impl CommandOutput for MetricsOutput {
    fn to_human(&self) -> String {
        if self.strategies.is_empty() {
            return format!("No outcomes recorded for task type '{}'.", self.task_type);
        }

        let mut table = list_table(&["strategy", "confidence", "mean", "attempts", "success rate", "last used"]);
        for s in &self.strategies {
            table.add_row(vec![
                s.strategy.clone(),
                percent(s.confidence),
                percent(s.posterior_mean),
                s.total_attempts.to_string(),
                percent(s.success_rate),
                s.last_used
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ]);
        }
        format!("Strategies for '{}':\n{}", self.task_type, table)
    }
}

pub async fn execute(config: &Config, task_type: String, json_mode: bool) -> Result<()> {
    let engine = open_engine(config).await?;
    let strategies = engine.get_decision_metrics(&task_type).await;

    output(&MetricsOutput { task_type, strategies }, json_mode);
    Ok(())
}
