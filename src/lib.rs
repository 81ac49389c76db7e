//! Tactician - adaptive strategy selection
//!
//! Tactician learns which strategy works best for each kind of task. Every
//! `(task_type, strategy)` pair is a Beta-Bernoulli bandit arm; choices are
//! made by Thompson Sampling (or UCB1 when reproducibility matters), outcomes
//! update the posteriors in closed form, and old evidence fades with a
//! configurable half-life. State lives in memory and is flushed in batches to
//! a pattern store.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): posterior math, arms, rules, ports
//! - **Adapters** (`adapters`): SQLite and in-memory pattern stores
//! - **Service Layer** (`services`): the engine, rule learner and flush daemon
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tactician::{EngineConfig, InMemoryPatternRepository, SelectionOptions, StrategyEngine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = StrategyEngine::new(Arc::new(InMemoryPatternRepository::new()), EngineConfig::default());
//!     let choice = engine
//!         .choose_strategy("doc_review", &["risk-first", "sequential"], SelectionOptions::default())
//!         .await?;
//!     engine.record_outcome("doc_review", &choice.chosen_strategy, true, None).await?;
//!     engine.flush().await;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use adapters::memory::InMemoryPatternRepository;
pub use adapters::sqlite::SqlitePatternRepository;
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    BetaDistribution, Config, CounterfactualAnalysis, DatabaseConfig, DecisionRule, EngineConfig,
    LoggingConfig, OutcomeMetrics, PosteriorSummary, RuleContext, SelectionOptions,
    SelectionResult, UpdateResult,
};
pub use domain::ports::{Clock, PatternRepository, StoredPattern};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    DaemonHandle, EngineStats, FlushDaemon, FlushReport, HydrationStatus, RuleUpdate,
    StrategyEngine,
};
