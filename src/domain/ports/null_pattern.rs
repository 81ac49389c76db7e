//! Null pattern repository implementation.
//!
//! Used when persistence is disabled but the type system requires a
//! PatternRepository implementation.

use async_trait::async_trait;

use super::{PatternRepository, StoredPattern};
use crate::domain::errors::DomainResult;

/// A no-op pattern repository that stores nothing.
///
/// Every engine backed by this starts cold and forgets on exit.
#[derive(Debug, Clone, Default)]
pub struct NullPatternRepository;

impl NullPatternRepository {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PatternRepository for NullPatternRepository {
    async fn load_pattern_page(
        &self,
        _pattern_type: &str,
        _min_confidence: f64,
        _offset: usize,
        _limit: usize,
    ) -> DomainResult<Vec<StoredPattern>> {
        Ok(Vec::new())
    }

    async fn upsert_pattern(
        &self,
        _pattern_type: &str,
        _key: &str,
        _payload: &str,
        _occurrences: u64,
        _confidence: f64,
    ) -> DomainResult<()> {
        Ok(())
    }

    async fn delete_pattern(&self, _pattern_type: &str, _key: &str) -> DomainResult<()> {
        Ok(())
    }
}
