//! `tactician choose`

use anyhow::Result;
use serde::Serialize;

use super::{finish, open_engine};
use crate::cli::output::{list_table, output, percent, CommandOutput};
use crate::domain::models::{Config, SelectionOptions, SelectionResult};

#[derive(Debug, Serialize)]
pub struct ChooseOutput {
    pub task_type: String,
    #[serde(flatten)]
    pub selection: SelectionResult,
}

impl CommandOutput for ChooseOutput {
    fn to_human(&self) -> String {
        let s = &self.selection;
        let mut lines = vec![
            format!("Chosen: {}", s.chosen_strategy),
            format!("Reason: {}", s.reason),
            format!(
                "Expected success: {}  (confidence {})",
                percent(s.posterior_mean),
                percent(s.confidence)
            ),
            format!("Posterior: Beta({:.2}, {:.2})", s.distribution.alpha, s.distribution.beta),
        ];

        if !s.alternatives.is_empty() {
            let mut table = list_table(&["alternative", "score", "mean"]);
            for alt in &s.alternatives {
                table.add_row(vec![
                    alt.strategy.clone(),
                    format!("{:.3}", alt.score),
                    percent(alt.posterior_mean),
                ]);
            }
            lines.push(String::new());
            lines.push(table.to_string());
        }

        lines.join("\n")
    }
}

pub async fn execute(
    config: &Config,
    task_type: String,
    strategies: Vec<String>,
    deterministic: bool,
    json_mode: bool,
) -> Result<()> {
    let engine = open_engine(config).await?;
    let selection = engine
        .choose_strategy(&task_type, &strategies, SelectionOptions { deterministic })
        .await?;
    finish(&engine).await?;

    output(&ChooseOutput { task_type, selection }, json_mode);
    Ok(())
}
