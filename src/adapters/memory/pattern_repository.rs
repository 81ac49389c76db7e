//! HashMap-backed PatternRepository with switchable failure injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{PatternRepository, StoredPattern};

type PatternKey = (String, String);

#[derive(Debug, Default)]
pub struct InMemoryPatternRepository {
    patterns: RwLock<HashMap<PatternKey, StoredPattern>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    upserts: AtomicUsize,
}

impl InMemoryPatternRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent load fail until switched back.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent upsert and delete fail until switched back.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Store a row exactly as given, bypassing the upsert counter. Lets tests
    /// seed malformed or back-dated rows.
    pub async fn insert_raw(&self, pattern: StoredPattern) {
        let key = (pattern.pattern_type.clone(), pattern.key.clone());
        self.patterns.write().await.insert(key, pattern);
    }

    pub async fn get(&self, pattern_type: &str, key: &str) -> Option<StoredPattern> {
        self.patterns
            .read()
            .await
            .get(&(pattern_type.to_string(), key.to_string()))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.patterns.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.patterns.read().await.is_empty()
    }

    /// Successful upserts since construction.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    fn check_writes(&self) -> DomainResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DomainError::DatabaseError("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PatternRepository for InMemoryPatternRepository {
    async fn load_pattern_page(
        &self,
        pattern_type: &str,
        min_confidence: f64,
        offset: usize,
        limit: usize,
    ) -> DomainResult<Vec<StoredPattern>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DomainError::DatabaseError("injected read failure".to_string()));
        }

        let mut rows: Vec<StoredPattern> = self
            .patterns
            .read()
            .await
            .values()
            .filter(|p| p.pattern_type == pattern_type && p.confidence >= min_confidence)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.key.cmp(&b.key)));
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn upsert_pattern(
        &self,
        pattern_type: &str,
        key: &str,
        payload: &str,
        occurrences: u64,
        confidence: f64,
    ) -> DomainResult<()> {
        self.check_writes()?;

        let updated_at: DateTime<Utc> = Utc::now();
        self.patterns.write().await.insert(
            (pattern_type.to_string(), key.to_string()),
            StoredPattern {
                pattern_type: pattern_type.to_string(),
                key: key.to_string(),
                payload: payload.to_string(),
                occurrences,
                confidence,
                updated_at,
            },
        );
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_pattern(&self, pattern_type: &str, key: &str) -> DomainResult<()> {
        self.check_writes()?;
        self.patterns
            .write()
            .await
            .remove(&(pattern_type.to_string(), key.to_string()));
        Ok(())
    }
}
