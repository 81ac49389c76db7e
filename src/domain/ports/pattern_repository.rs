//! Pattern repository port for durable learning state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;

/// A row of the pattern store.
///
/// The payload is kept as raw JSON text so that the engine can decide, row by
/// row, whether it is usable; one malformed row must not fail a whole load.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPattern {
    pub pattern_type: String,
    pub key: String,
    pub payload: String,
    pub occurrences: u64,
    pub confidence: f64,
    pub updated_at: DateTime<Utc>,
}

/// Repository interface for learned-pattern persistence.
///
/// The engine loads patterns by type one page at a time and upserts by
/// `(pattern_type, key)`. Abstracts the underlying storage backend (SQLite,
/// in-memory, or nothing at all).
#[async_trait]
pub trait PatternRepository: Send + Sync {
    /// Load up to `limit` patterns of `pattern_type` whose confidence is at
    /// least `min_confidence`, skipping the first `offset`. Rows are ordered
    /// most recently updated first, ties broken by key, so consecutive pages
    /// neither overlap nor leave gaps while the store is unchanged.
    async fn load_pattern_page(
        &self,
        pattern_type: &str,
        min_confidence: f64,
        offset: usize,
        limit: usize,
    ) -> DomainResult<Vec<StoredPattern>>;

    /// First page of [`load_pattern_page`](Self::load_pattern_page).
    async fn load_patterns(
        &self,
        pattern_type: &str,
        min_confidence: f64,
        limit: usize,
    ) -> DomainResult<Vec<StoredPattern>> {
        self.load_pattern_page(pattern_type, min_confidence, 0, limit)
            .await
    }

    /// Insert or replace the pattern identified by `(pattern_type, key)`.
    async fn upsert_pattern(
        &self,
        pattern_type: &str,
        key: &str,
        payload: &str,
        occurrences: u64,
        confidence: f64,
    ) -> DomainResult<()>;

    /// Remove the pattern identified by `(pattern_type, key)`. Removing a
    /// missing pattern is not an error.
    async fn delete_pattern(&self, pattern_type: &str, key: &str) -> DomainResult<()>;
}
