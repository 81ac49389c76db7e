//! Common test utilities for integration tests
//!
//! Provides shared fixtures and helpers used across multiple integration
//! test files.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use tactician::domain::ports::ManualClock;
use tactician::{EngineConfig, InMemoryPatternRepository, StrategyEngine};

/// Create a temporary directory for test isolation
///
/// Returns a TempDir that will be cleaned up when dropped.
#[allow(dead_code)]
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Create a temporary test database
///
/// Returns the path to a SQLite database file in a temporary directory.
#[allow(dead_code)]
pub fn temp_db_path() -> (TempDir, PathBuf) {
    let dir = temp_dir();
    let db_path = dir.path().join("test.db");
    (dir, db_path)
}

/// A fixed instant so decay is exactly reproducible.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
}

/// Seeded engine over an in-memory store, driven by a manual clock.
#[allow(dead_code)]
pub fn engine_with_clock(
    seed: u64,
) -> (
    StrategyEngine<InMemoryPatternRepository>,
    Arc<InMemoryPatternRepository>,
    Arc<ManualClock>,
) {
    let repo = Arc::new(InMemoryPatternRepository::new());
    let clock = Arc::new(ManualClock::new(epoch()));
    let engine = StrategyEngine::with_clock(
        Arc::clone(&repo),
        EngineConfig::default().with_seed(seed),
        clock.clone(),
    );
    (engine, repo, clock)
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
