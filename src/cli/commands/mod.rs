//! CLI command implementations.
//!
//! Every command opens the configured store, hydrates the engine, acts, and
//! flushes before printing.

pub mod choose;
pub mod metrics;
pub mod record;
pub mod rule;
pub mod stats;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::warn;

use crate::adapters::sqlite::{initialize_database, PoolConfig, SqlitePatternRepository};
use crate::domain::models::Config;
use crate::services::{HydrationStatus, StrategyEngine};

pub type CliEngine = StrategyEngine<SqlitePatternRepository>;

/// Open the database named in `config` and return a hydrated engine.
pub async fn open_engine(config: &Config) -> Result<CliEngine> {
    let pool = initialize_database(&config.database.url, Some(PoolConfig::from(&config.database)))
        .await
        .with_context(|| format!("Failed to open database at {}", config.database.url))?;

    let engine = StrategyEngine::new(
        Arc::new(SqlitePatternRepository::new(pool)),
        config.engine.clone(),
    );
    if let HydrationStatus::Failed { error } = engine.ensure_hydrated().await {
        warn!(%error, "Continuing without persisted learning state");
    }
    Ok(engine)
}

/// Persist everything the command changed.
pub async fn finish(engine: &CliEngine) -> Result<()> {
    let report = engine.flush().await;
    if !report.is_clean() {
        bail!(
            "Failed to persist {} change(s): {}",
            report.failures,
            report.last_error.unwrap_or_default()
        );
    }
    Ok(())
}
