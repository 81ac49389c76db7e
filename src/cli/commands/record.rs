//! `tactician record`

use anyhow::Result;
use serde::Serialize;

use super::{finish, open_engine};
use crate::cli::output::{output, percent, CommandOutput};
use crate::domain::models::{Config, OutcomeMetrics, UpdateResult};

#[derive(Debug, Serialize)]
pub struct RecordOutput {
    pub success: bool,
    #[serde(flatten)]
    pub update: UpdateResult,
}

impl CommandOutput for RecordOutput {
    fn to_human(&self) -> String {
        let u = &self.update;
        [
            format!(
                "Recorded {} for {}/{}",
                if self.success { "success" } else { "failure" },
                u.task_type,
                u.strategy
            ),
            format!(
                "Expected success: {}  (confidence {})",
                percent(u.posterior_mean),
                percent(u.confidence)
            ),
            format!("Attempts: {}  Successes: {}", u.total_attempts, u.successes),
        ]
        .join("\n")
    }
}

pub async fn execute(
    config: &Config,
    task_type: &str,
    strategy: &str,
    success: bool,
    metrics: OutcomeMetrics,
    json_mode: bool,
) -> Result<()> {
    let engine = open_engine(config).await?;
    let update = engine
        .record_outcome(task_type, strategy, success, Some(metrics))
        .await?;
    finish(&engine).await?;

    output(&RecordOutput { success, update }, json_mode);
    Ok(())
}
