//! SQLite implementation of the PatternRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::adapters::sqlite::parse_datetime;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{PatternRepository, StoredPattern};

#[derive(Clone)]
pub struct SqlitePatternRepository {
    pool: SqlitePool,
}

impl SqlitePatternRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PatternRow {
    pattern_type: String,
    pattern_key: String,
    pattern_data: String,
    occurrences: i64,
    confidence: f64,
    updated_at: String,
}

fn row_to_pattern(row: PatternRow) -> DomainResult<StoredPattern> {
    Ok(StoredPattern {
        pattern_type: row.pattern_type,
        key: row.pattern_key,
        payload: row.pattern_data,
        occurrences: u64::try_from(row.occurrences).unwrap_or(0),
        confidence: row.confidence,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}

#[async_trait]
impl PatternRepository for SqlitePatternRepository {
    async fn load_pattern_page(
        &self,
        pattern_type: &str,
        min_confidence: f64,
        offset: usize,
        limit: usize,
    ) -> DomainResult<Vec<StoredPattern>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let rows: Vec<PatternRow> = sqlx::query_as(
            r#"SELECT pattern_type, pattern_key, pattern_data, occurrences, confidence, updated_at
               FROM learned_patterns
               WHERE pattern_type = ? AND confidence >= ?
               ORDER BY updated_at DESC, pattern_key ASC
               LIMIT ? OFFSET ?"#,
        )
        .bind(pattern_type)
        .bind(min_confidence)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_pattern).collect()
    }

    async fn upsert_pattern(
        &self,
        pattern_type: &str,
        key: &str,
        payload: &str,
        occurrences: u64,
        confidence: f64,
    ) -> DomainResult<()> {
        let occurrences = i64::try_from(occurrences)
            .map_err(|_| DomainError::ValidationFailed(format!("occurrence count overflow for {key}")))?;

        sqlx::query(
            r#"INSERT INTO learned_patterns
               (pattern_type, pattern_key, pattern_data, occurrences, confidence, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT (pattern_type, pattern_key) DO UPDATE SET
                   pattern_data = excluded.pattern_data,
                   occurrences = excluded.occurrences,
                   confidence = excluded.confidence,
                   updated_at = excluded.updated_at"#,
        )
        .bind(pattern_type)
        .bind(key)
        .bind(payload)
        .bind(occurrences)
        .bind(confidence)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_pattern(&self, pattern_type: &str, key: &str) -> DomainResult<()> {
        sqlx::query("DELETE FROM learned_patterns WHERE pattern_type = ? AND pattern_key = ?")
            .bind(pattern_type)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
