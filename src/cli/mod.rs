//! Command-line interface for the strategy engine.

pub mod commands;
pub mod output;
pub mod types;

use anyhow::Result;

use crate::domain::models::{Config, OutcomeMetrics};
use crate::infrastructure::config::ConfigLoader;
pub use types::{Cli, Commands, OutcomeArgs, RuleCommands};

/// Resolve the effective configuration for an invocation.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match cli.config {
        Some(ref path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    if let Some(ref url) = cli.database {
        config.database.url.clone_from(url);
    }
    Ok(config)
}

/// Run the parsed command against `config`.
pub async fn dispatch(command: Commands, config: &Config, json_mode: bool) -> Result<()> {
    match command {
        Commands::Choose {
            task_type,
            strategies,
            deterministic,
        } => commands::choose::execute(config, task_type, strategies, deterministic, json_mode).await,
        Commands::Record {
            task_type,
            strategy,
            outcome,
            duration_ms,
            tokens_used,
            cost,
        } => {
            let metrics = OutcomeMetrics {
                duration_ms,
                tokens_used,
                cost,
            };
            commands::record::execute(config, &task_type, &strategy, outcome.is_success(), metrics, json_mode)
                .await
        }
        Commands::Metrics { task_type } => commands::metrics::execute(config, task_type, json_mode).await,
        Commands::Stats => commands::stats::execute(config, json_mode).await,
        Commands::Rule(rule) => commands::rule::execute(config, rule, json_mode).await,
    }
}

/// Report `err` and exit non-zero.
pub fn handle_error(err: &anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({ "error": format!("{err:#}") });
        println!("{body}");
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1)
}
