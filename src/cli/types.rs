//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tactician")]
#[command(about = "Tactician - adaptive strategy selection engine", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .tactician/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database URL, overriding the configured one
    #[arg(long, global = true)]
    pub database: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Choose a strategy for a task type
    Choose {
        /// Task type the choice is for
        task_type: String,

        /// Candidate strategies, in priority order for ties
        #[arg(required = true)]
        strategies: Vec<String>,

        /// Use UCB instead of Thompson Sampling
        #[arg(short, long)]
        deterministic: bool,
    },

    /// Record the outcome of running a strategy
    Record {
        task_type: String,
        strategy: String,

        #[command(flatten)]
        outcome: OutcomeArgs,

        /// Wall-clock duration of the run
        #[arg(long)]
        duration_ms: Option<u64>,

        /// Tokens consumed by the run
        #[arg(long)]
        tokens_used: Option<u64>,

        /// Monetary cost of the run
        #[arg(long)]
        cost: Option<f64>,
    },

    /// Show per-strategy posteriors for a task type
    Metrics {
        task_type: String,
    },

    /// Show engine statistics and policy convergence
    Stats,

    /// Decision rule commands
    #[command(subcommand)]
    Rule(RuleCommands),
}

#[derive(Subcommand, Debug)]
pub enum RuleCommands {
    /// Record the outcome of a decision taken in a context
    Learn {
        decision: String,

        /// Context entries as key=value (repeatable)
        #[arg(short, long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,

        #[command(flatten)]
        outcome: OutcomeArgs,
    },

    /// Show the best known decision for a context
    Best {
        /// Context entries as key=value (repeatable)
        #[arg(short, long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,
    },
}

/// Exactly one of `--success` / `--failure`.
#[derive(Args, Debug, Clone, Copy)]
#[group(required = true, multiple = false)]
pub struct OutcomeArgs {
    /// The run succeeded
    #[arg(long)]
    pub success: bool,

    /// The run failed
    #[arg(long)]
    pub failure: bool,
}

impl OutcomeArgs {
    pub const fn is_success(self) -> bool {
        self.success && !self.failure
    }
}
