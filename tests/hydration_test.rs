//! Persistence round-trips: flush from one engine, hydrate another.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::Notify;

use common::{engine_with_clock, epoch, temp_db_path};
use tactician::adapters::sqlite::{create_test_pool, initialize_database};
use tactician::domain::models::{
    rule_id, ArmPayload, DecisionRulePayload, DECISION_RULE_PATTERN, STRATEGY_ARM_PATTERN,
};
use tactician::domain::ports::{ManualClock, PatternRepository};
use tactician::{
    DomainError, DomainResult, EngineConfig, HydrationStatus, InMemoryPatternRepository, RuleContext, SelectionOptions,
    SqlitePatternRepository, StoredPattern, StrategyEngine,
};

/// Holds strategy-arm loads until released, so hydration stays in flight.
#[derive(Default)]
struct GatedRepository {
    inner: InMemoryPatternRepository,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl PatternRepository for GatedRepository {
    async fn load_pattern_page(
        &self,
        pattern_type: &str,
        min_confidence: f64,
        offset: usize,
        limit: usize,
    ) -> DomainResult<Vec<StoredPattern>> {
        if pattern_type == STRATEGY_ARM_PATTERN && offset == 0 {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner
            .load_pattern_page(pattern_type, min_confidence, offset, limit)
            .await
    }

    async fn upsert_pattern(
        &self,
        pattern_type: &str,
        key: &str,
        payload: &str,
        occurrences: u64,
        confidence: f64,
    ) -> DomainResult<()> {
        self.inner
            .upsert_pattern(pattern_type, key, payload, occurrences, confidence)
            .await
    }

    async fn delete_pattern(&self, pattern_type: &str, key: &str) -> DomainResult<()> {
        self.inner.delete_pattern(pattern_type, key).await
    }
}

fn engine_over<R: PatternRepository + 'static>(repo: Arc<R>) -> StrategyEngine<R> {
    StrategyEngine::with_clock(
        repo,
        EngineConfig::default().with_seed(99),
        Arc::new(ManualClock::new(epoch())),
    )
}

#[tokio::test]
async fn test_round_trip_through_memory_store_is_lossless() {
    let (writer, repo, _clock) = engine_with_clock(1);
    for success in [true, true, false, true, false, true, true] {
        writer.record_outcome("extract", "regex", success, None).await.unwrap();
    }
    let before = writer.arm("extract", "regex").await.unwrap();
    assert!(writer.flush().await.is_clean());

    let reader = engine_over(repo);
    let status = reader.ensure_hydrated().await;
    assert_eq!(
        status,
        HydrationStatus::Completed {
            arms_loaded: 1,
            rules_loaded: 0,
            rows_skipped: 0
        }
    );

    let after = reader.arm("extract", "regex").await.unwrap();
    assert!((after.distribution.alpha - before.distribution.alpha).abs() < 1e-6);
    assert!((after.distribution.beta - before.distribution.beta).abs() < 1e-6);
    assert_eq!(after.attempts, before.attempts);
    assert_eq!(after.successes, before.successes);
}

#[tokio::test]
async fn test_round_trip_through_sqlite_file_is_lossless() {
    let (_dir, db_path) = temp_db_path();
    let url = format!("sqlite:{}", db_path.display());

    let pool = initialize_database(&url, None).await.unwrap();
    let writer = engine_over(Arc::new(SqlitePatternRepository::new(pool.clone())));
    for _ in 0..6 {
        writer.record_outcome("doc_review", "risk-first", true, None).await.unwrap();
    }
    writer.record_outcome("doc_review", "sequential", false, None).await.unwrap();
    let context = RuleContext::new().with("court", "ny");
    for success in [true, true, false] {
        writer.learn_decision_rule(context.clone(), "risk-first", success).await.unwrap();
    }
    let report = writer.flush().await;
    assert_eq!(report.arms_written, 2);
    assert_eq!(report.rules_written, 1);
    pool.close().await;

    let pool = initialize_database(&url, None).await.unwrap();
    let reader = engine_over(Arc::new(SqlitePatternRepository::new(pool)));
    reader.ensure_hydrated().await;

    let arm = reader.arm("doc_review", "risk-first").await.unwrap();
    assert!((arm.distribution.alpha - 7.0).abs() < 1e-6);
    assert!((arm.distribution.beta - 1.0).abs() < 1e-6);

    let rule = reader.get_best_rule(&context).await.unwrap();
    assert_eq!(rule.decision, "risk-first");
    assert_eq!(rule.attempts, 3);
    assert!((rule.effectiveness - 2.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_hydration_decays_idle_evidence() {
    let (writer, repo, _clock) = engine_with_clock(2);
    for _ in 0..10 {
        writer.record_outcome("plan", "greedy", true, None).await.unwrap();
    }
    writer.flush().await;

    let clock = Arc::new(ManualClock::new(epoch() + Duration::days(28)));
    let reader = StrategyEngine::with_clock(repo, EngineConfig::default(), clock);
    reader.ensure_hydrated().await;

    // Two half-lives: ten successes count as two and a half.
    let arm = reader.arm("plan", "greedy").await.unwrap();
    assert!((arm.distribution.alpha - 3.5).abs() < 1e-9);
    assert_eq!(arm.attempts, 10);
}

#[tokio::test]
async fn test_malformed_rows_are_skipped() {
    let repo = Arc::new(InMemoryPatternRepository::new());
    let good = ArmPayload {
        task_type: "ocr".to_string(),
        strategy: "tesseract".to_string(),
        successes: 3,
        attempts: 4,
        alpha_minus_one: Some(3.0),
        beta_minus_one: Some(1.0),
        last_used_at: epoch(),
        evidence_at: Some(epoch()),
    };
    repo.insert_raw(StoredPattern {
        pattern_type: STRATEGY_ARM_PATTERN.to_string(),
        key: "ocr:tesseract".to_string(),
        payload: serde_json::to_string(&good).unwrap(),
        occurrences: 4,
        confidence: 0.5,
        updated_at: epoch(),
    })
    .await;
    repo.insert_raw(StoredPattern {
        pattern_type: STRATEGY_ARM_PATTERN.to_string(),
        key: "ocr:broken".to_string(),
        payload: "{\"task_type\": \"ocr\"".to_string(),
        occurrences: 1,
        confidence: 0.1,
        updated_at: epoch(),
    })
    .await;

    let engine = engine_over(Arc::clone(&repo));
    let status = engine.ensure_hydrated().await;

    assert_eq!(
        status,
        HydrationStatus::Completed {
            arms_loaded: 1,
            rules_loaded: 0,
            rows_skipped: 1
        }
    );
    let arm = engine.arm("ocr", "tesseract").await.unwrap();
    assert_eq!(arm.distribution.alpha, 4.0);
    assert_eq!(arm.distribution.beta, 2.0);
}

#[tokio::test]
async fn test_legacy_rows_without_shape_parameters() {
    let repo = Arc::new(InMemoryPatternRepository::new());
    let legacy = serde_json::json!({
        "task_type": "ocr",
        "strategy": "vision",
        "successes": 5,
        "attempts": 5,
        "last_used_at": epoch(),
    });
    repo.insert_raw(StoredPattern {
        pattern_type: STRATEGY_ARM_PATTERN.to_string(),
        key: "ocr:vision".to_string(),
        payload: legacy.to_string(),
        occurrences: 5,
        confidence: 0.5,
        updated_at: epoch(),
    })
    .await;

    let engine = engine_over(repo);
    engine.ensure_hydrated().await;

    // Failures are floored at one when only counts were stored.
    let arm = engine.arm("ocr", "vision").await.unwrap();
    assert_eq!(arm.distribution.alpha, 6.0);
    assert_eq!(arm.distribution.beta, 2.0);
}

#[tokio::test]
async fn test_failed_hydration_is_reported_and_never_blocks_choices() {
    let repo = Arc::new(InMemoryPatternRepository::new());
    repo.fail_reads(true);
    let engine = engine_over(Arc::clone(&repo));

    let result = engine
        .choose_strategy("triage", &["a", "b"], SelectionOptions::default())
        .await
        .unwrap();
    assert!(["a", "b"].contains(&result.chosen_strategy.as_str()));

    let status = engine.ensure_hydrated().await;
    assert!(matches!(status, HydrationStatus::Failed { .. }));
    assert_eq!(engine.hydration_status(), status);

    // Hydration is attempted once only.
    repo.fail_reads(false);
    assert!(matches!(engine.ensure_hydrated().await, HydrationStatus::Failed { .. }));
}

#[tokio::test]
async fn test_missing_table_is_a_cold_start() {
    let pool = create_test_pool().await.unwrap();
    let engine = engine_over(Arc::new(SqlitePatternRepository::new(pool)));

    assert_eq!(
        engine.ensure_hydrated().await,
        HydrationStatus::Completed {
            arms_loaded: 0,
            rules_loaded: 0,
            rows_skipped: 0
        }
    );
}

#[tokio::test]
async fn test_early_outcomes_merge_with_persisted_evidence() {
    let (writer, repo, _clock) = engine_with_clock(3);
    for _ in 0..4 {
        writer.record_outcome("qa", "retrieval", true, None).await.unwrap();
    }
    writer.flush().await;

    // Whether hydration lands before or after this outcome, both are kept.
    let reader = engine_over(Arc::clone(&repo));
    reader.record_outcome("qa", "retrieval", false, None).await.unwrap();
    reader.ensure_hydrated().await;

    let arm = reader.arm("qa", "retrieval").await.unwrap();
    assert_eq!(arm.distribution.alpha, 5.0);
    assert_eq!(arm.distribution.beta, 2.0);
    assert_eq!(arm.attempts, 5);
}

#[tokio::test]
async fn test_pruned_rules_are_deleted_from_the_store() {
    let (engine, repo, clock) = engine_with_clock(4);
    let context = RuleContext::new().with("pages", 300);
    for i in 0..10 {
        engine.learn_decision_rule(context.clone(), "skim", i < 2).await.unwrap();
    }
    engine.flush().await;
    let id = rule_id(&context, "skim");
    assert!(repo.get(DECISION_RULE_PATTERN, &id).await.is_some());

    clock.advance(Duration::days(30));
    engine.learn_decision_rule(context, "skim", false).await.unwrap();
    let report = engine.flush().await;

    assert_eq!(report.rules_deleted, 1);
    assert!(repo.get(DECISION_RULE_PATTERN, &id).await.is_none());
}

#[tokio::test]
async fn test_stale_failing_rules_are_dropped_at_hydration() {
    let repo = Arc::new(InMemoryPatternRepository::new());
    let context = RuleContext::new().with("lang", "cobol");
    let payload = DecisionRulePayload {
        context: context.clone(),
        decision: "rewrite".to_string(),
        successes: 1,
        attempts: 12,
        last_used_at: epoch() - Duration::days(60),
    };
    let id = rule_id(&context, "rewrite");
    repo.insert_raw(StoredPattern {
        pattern_type: DECISION_RULE_PATTERN.to_string(),
        key: id.clone(),
        payload: serde_json::to_string(&payload).unwrap(),
        occurrences: 12,
        confidence: 1.0 / 12.0,
        updated_at: epoch() - Duration::days(60),
    })
    .await;

    let engine = engine_over(Arc::clone(&repo));
    let status = engine.ensure_hydrated().await;
    assert!(matches!(status, HydrationStatus::Completed { rules_loaded: 0, .. }));
    assert!(engine.get_best_rule(&context).await.is_none());

    engine.flush().await;
    assert!(repo.get(DECISION_RULE_PATTERN, &id).await.is_none());
}

#[tokio::test]
async fn test_choices_are_served_while_hydration_is_in_flight() {
    let repo = Arc::new(GatedRepository::default());
    let engine = engine_over(Arc::clone(&repo));

    engine
        .choose_strategy("triage", &["a", "b"], SelectionOptions::default())
        .await
        .unwrap();
    repo.entered.notified().await;

    let result = engine
        .choose_strategy("triage", &["a", "b"], SelectionOptions::default())
        .await
        .unwrap();
    assert!(["a", "b"].contains(&result.chosen_strategy.as_str()));
    assert_eq!(engine.hydration_status(), HydrationStatus::InProgress);

    repo.release.notify_one();
    assert!(matches!(
        engine.ensure_hydrated().await,
        HydrationStatus::Completed { .. }
    ));
}

#[tokio::test]
async fn test_hydration_reads_past_the_first_page() {
    let (writer, repo, _clock) = engine_with_clock(5);
    for strategy in ["s1", "s2", "s3", "s4", "s5"] {
        writer.record_outcome("batch", strategy, true, None).await.unwrap();
    }
    assert!(writer.flush().await.is_clean());

    let mut config = EngineConfig::default().with_seed(5);
    config.hydration_page_size = 2;
    let reader = StrategyEngine::with_clock(repo, config, Arc::new(ManualClock::new(epoch())));

    assert!(matches!(
        reader.ensure_hydrated().await,
        HydrationStatus::Completed { arms_loaded: 5, .. }
    ));
    for strategy in ["s1", "s2", "s3", "s4", "s5"] {
        let arm = reader.arm("batch", strategy).await.unwrap();
        assert_eq!(arm.distribution.alpha, 2.0);
    }
}

#[tokio::test]
async fn test_colons_in_names_keep_arms_apart_in_the_store() {
    let (writer, repo, _clock) = engine_with_clock(6);
    for _ in 0..5 {
        writer.record_outcome("a:b", "c", true, None).await.unwrap();
    }
    for _ in 0..3 {
        writer.record_outcome("a", "b:c", false, None).await.unwrap();
    }
    writer.flush().await;
    assert_eq!(repo.len().await, 2);

    let reader = engine_over(repo);
    assert!(matches!(
        reader.ensure_hydrated().await,
        HydrationStatus::Completed { arms_loaded: 2, .. }
    ));

    let left = reader.arm("a:b", "c").await.unwrap();
    assert_eq!((left.distribution.alpha, left.distribution.beta), (6.0, 1.0));
    let right = reader.arm("a", "b:c").await.unwrap();
    assert_eq!((right.distribution.alpha, right.distribution.beta), (1.0, 4.0));
}

#[tokio::test]
async fn test_non_finite_contexts_are_never_learned_or_stored() {
    let (engine, repo, _clock) = engine_with_clock(7);

    for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let context = RuleContext::new().with("ratio", value);
        let err = engine.learn_decision_rule(context.clone(), "split", true).await.unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
        assert!(engine.get_best_rule(&context).await.is_none());
    }

    assert_eq!(engine.get_stats().await.rules, 0);
    assert_eq!(engine.flush().await.rules_written, 0);
    assert!(repo.is_empty().await);
}
