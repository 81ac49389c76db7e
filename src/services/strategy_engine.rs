//! Adaptive strategy selection engine.
//!
//! A persistent Beta-Bernoulli bandit. Each `(task_type, strategy)` arm holds
//! a Beta posterior that is updated in closed form on every recorded outcome
//! and decays toward the uniform prior with a configurable half-life.
//! Selection uses Thompson Sampling by default and UCB1 when a reproducible
//! choice is needed; every decision also logs what UCB would have picked.
//!
//! ## Durability
//!
//! Memory is authoritative. Outcomes only mark keys dirty; [`flush`] (driven
//! periodically by the [`FlushDaemon`]) writes them to the pattern store in
//! one pass. A failed write leaves the key dirty for the next pass.
//!
//! Hydration from the store runs at most once per engine and never blocks a
//! decision: the first call that needs it spawns it in the background and
//! proceeds on whatever is in memory.
//!
//! [`flush`]: StrategyEngine::flush

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, OnceCell};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    recency_weight, Arm, ArmKey, ArmPayload, BetaDistribution, CounterfactualAnalysis,
    CounterfactualLog, CounterfactualRecord, DecisionMode, DecisionRule, DecisionRulePayload,
    EngineConfig, OutcomeMetrics, PosteriorSummary, RuleContext, ScoredStrategy, SelectionOptions,
    SelectionPolicy, SelectionReason, SelectionResult, UpdateResult, DECISION_RULE_PATTERN,
    STRATEGY_ARM_PATTERN,
};
use crate::domain::ports::{Clock, PatternRepository, StoredPattern, SystemClock};
use crate::services::decision_rules::{DecisionRuleLearner, RuleUpdate};
use crate::services::flush_daemon::{
    DaemonHandle, FlushDaemon, FlushDaemonConfig, FlushDaemonEvent, PeriodicJob,
};

/// Share of a score kept regardless of recency.
const RECENCY_FLOOR: f64 = 0.6;
/// Share of a score scaled by recency.
const RECENCY_SPAN: f64 = 0.4;
/// Runners-up reported with a selection.
const MAX_ALTERNATIVES: usize = 3;

/// Where hydration stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum HydrationStatus {
    NotStarted,
    InProgress,
    Completed {
        arms_loaded: usize,
        rules_loaded: usize,
        rows_skipped: usize,
    },
    /// The store could not be read. The engine carries on from a cold start.
    Failed { error: String },
}

impl HydrationStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// What a flush pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub arms_written: usize,
    pub rules_written: usize,
    pub rules_deleted: usize,
    pub failures: usize,
    pub last_error: Option<String>,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }

    pub fn items(&self) -> u64 {
        (self.arms_written + self.rules_written + self.rules_deleted) as u64
    }
}

/// Engine-wide counters.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub arms: usize,
    pub task_types: usize,
    pub rules: usize,
    pub dirty_arms: usize,
    pub dirty_rules: usize,
    pub pending_rule_deletes: usize,
    pub total_attempts: u64,
    pub total_successes: u64,
    pub counterfactual_samples: usize,
    pub decisions: u64,
    pub explorations: u64,
    /// Share of decisions labelled exploration. Reporting only.
    pub exploration_rate: f64,
    pub hydration: HydrationStatus,
}

struct EngineState {
    arms: HashMap<ArmKey, Arm>,
    /// Arm key -> generation of its last unpersisted change.
    dirty_arms: HashMap<ArmKey, u64>,
    generation: u64,
    rules: DecisionRuleLearner,
    counterfactuals: CounterfactualLog,
    decisions: u64,
    explorations: u64,
    rng: StdRng,
}

impl EngineState {
    fn new(config: &EngineConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            arms: HashMap::new(),
            dirty_arms: HashMap::new(),
            generation: 0,
            rules: DecisionRuleLearner::new(),
            counterfactuals: CounterfactualLog::new(config.counterfactual_capacity),
            decisions: 0,
            explorations: 0,
            rng,
        }
    }

    fn mark_arm_dirty(&mut self, key: &ArmKey) {
        self.generation += 1;
        self.dirty_arms.insert(key.clone(), self.generation);
    }
}

/// One candidate during a selection.
struct Candidate<'a> {
    strategy: &'a str,
    posterior: BetaDistribution,
    /// Recency-adjusted score under the live policy.
    score: f64,
    /// Recency-adjusted UCB score.
    ucb: f64,
}

impl Candidate<'_> {
    fn scored(&self) -> ScoredStrategy {
        ScoredStrategy {
            strategy: self.strategy.to_string(),
            score: self.score,
            posterior_mean: self.posterior.mean(),
        }
    }
}

struct ArmWrite {
    key: ArmKey,
    generation: u64,
    payload: ArmPayload,
    confidence: f64,
}

struct EngineInner<R: PatternRepository + 'static> {
    repository: Arc<R>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<EngineState>,
    hydration: OnceCell<HydrationStatus>,
    hydration_requested: AtomicBool,
    flush_lock: Mutex<()>,
}

/// The bandit engine. Cheap to clone; clones share state.
pub struct StrategyEngine<R: PatternRepository + 'static> {
    inner: Arc<EngineInner<R>>,
}

impl<R: PatternRepository + 'static> Clone for StrategyEngine<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: PatternRepository + 'static> StrategyEngine<R> {
    /// Create an engine backed by `repository`, reading wall-clock time.
    pub fn new(repository: Arc<R>, config: EngineConfig) -> Self {
        Self::with_clock(repository, config, Arc::new(SystemClock))
    }

    pub fn with_clock(repository: Arc<R>, config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                state: Mutex::new(EngineState::new(&config)),
                repository,
                config,
                clock,
                hydration: OnceCell::new(),
                hydration_requested: AtomicBool::new(false),
                flush_lock: Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.inner.repository
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.inner.clock.now()
    }

    fn half_life(&self) -> f64 {
        self.inner.config.half_life_days
    }

    // -----------------------------------------------------------------------
    // Hydration
    // -----------------------------------------------------------------------

    /// Load persisted state if that has not happened yet, and wait for it.
    /// Safe to call any number of times; the store is read at most once.
    pub async fn ensure_hydrated(&self) -> HydrationStatus {
        self.inner.hydration_requested.store(true, Ordering::Release);
        self.inner
            .hydration
            .get_or_init(|| self.hydrate())
            .await
            .clone()
    }

    pub fn hydration_status(&self) -> HydrationStatus {
        match self.inner.hydration.get() {
            Some(status) => status.clone(),
            None if self.inner.hydration_requested.load(Ordering::Acquire) => {
                HydrationStatus::InProgress
            }
            None => HydrationStatus::NotStarted,
        }
    }

    /// Start hydration in the background without waiting for it.
    fn request_hydration(&self) {
        if self.inner.hydration.initialized()
            || self.inner.hydration_requested.swap(true, Ordering::AcqRel)
        {
            return;
        }
        let engine = self.clone();
        tokio::spawn(async move {
            engine.ensure_hydrated().await;
        });
    }

    /// Every row of `pattern_type`, read page by page until a short page.
    async fn load_rows(&self, pattern_type: &str) -> DomainResult<Vec<StoredPattern>> {
        let page_size = self.inner.config.hydration_page_size.max(1);
        let mut rows = Vec::new();
        loop {
            let page = match self
                .inner
                .repository
                .load_pattern_page(pattern_type, 0.0, rows.len(), page_size)
                .await
            {
                Err(e) if e.is_missing_store() => {
                    debug!(pattern_type, "Pattern store not created yet, starting cold");
                    return Ok(Vec::new());
                }
                other => other?,
            };
            let exhausted = page.len() < page_size;
            rows.extend(page);
            if exhausted {
                break;
            }
            debug!(pattern_type, loaded = rows.len(), "Loading next pattern page");
        }
        Ok(rows)
    }

    async fn hydrate(&self) -> HydrationStatus {
        debug!("Hydrating strategy engine");

        let arm_rows = match self.load_rows(STRATEGY_ARM_PATTERN).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Hydration failed, continuing from a cold start");
                return HydrationStatus::Failed {
                    error: e.to_string(),
                };
            }
        };
        let (rule_rows, rule_error) = if self.inner.config.persist_rules {
            match self.load_rows(DECISION_RULE_PATTERN).await {
                Ok(rows) => (rows, None),
                Err(e) => (Vec::new(), Some(e)),
            }
        } else {
            (Vec::new(), None)
        };

        let mut rows_skipped = 0;
        let arms: Vec<Arm> = arm_rows
            .iter()
            .filter_map(|row| match parse_arm(row) {
                Ok(arm) => Some(arm),
                Err(e) => {
                    warn!(key = %row.key, error = %e, "Skipping malformed arm row");
                    rows_skipped += 1;
                    None
                }
            })
            .collect();
        let rules: Vec<DecisionRule> = rule_rows
            .iter()
            .filter_map(|row| match parse_rule(row) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    warn!(key = %row.key, error = %e, "Skipping malformed decision rule row");
                    rows_skipped += 1;
                    None
                }
            })
            .collect();

        let now = self.now();
        let half_life = self.half_life();
        let arms_loaded = arms.len();
        let mut rules_loaded = 0;
        {
            let mut guard = self.inner.state.lock().await;
            let state = &mut *guard;
            for mut loaded in arms {
                loaded.decay_to(now, half_life);
                let key = loaded.key.clone();
                if let Some(existing) = state.arms.get_mut(&key) {
                    existing.absorb(&loaded, now, half_life);
                    state.mark_arm_dirty(&key);
                } else {
                    state.arms.insert(key, loaded);
                }
            }
            for rule in rules {
                if state.rules.absorb(rule, now, half_life) {
                    rules_loaded += 1;
                }
            }
        }

        if let Some(e) = rule_error {
            warn!(error = %e, arms_loaded, "Decision rules could not be hydrated");
            return HydrationStatus::Failed {
                error: e.to_string(),
            };
        }

        info!(arms_loaded, rules_loaded, rows_skipped, "Strategy engine hydrated");
        HydrationStatus::Completed {
            arms_loaded,
            rules_loaded,
            rows_skipped,
        }
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    /// Pick one of `strategies` for `task_type`.
    ///
    /// Duplicate names are considered once, at their first position. An
    /// empty list or task type is rejected.
    pub async fn choose_strategy<S: AsRef<str>>(
        &self,
        task_type: &str,
        strategies: &[S],
        options: SelectionOptions,
    ) -> DomainResult<SelectionResult> {
        if task_type.is_empty() {
            return Err(DomainError::ValidationFailed(
                "task type must not be empty".to_string(),
            ));
        }
        let mut names: Vec<&str> = Vec::with_capacity(strategies.len());
        for s in strategies {
            let s = s.as_ref();
            if s.is_empty() {
                return Err(DomainError::ValidationFailed(
                    "strategy names must not be empty".to_string(),
                ));
            }
            if !names.contains(&s) {
                names.push(s);
            }
        }
        if names.is_empty() {
            return Err(DomainError::ValidationFailed(format!(
                "no candidate strategies given for task type '{task_type}'"
            )));
        }

        self.request_hydration();
        let now = self.now();
        let half_life = self.half_life();

        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let priors: Vec<(BetaDistribution, f64)> = names
            .iter()
            .map(|name| match state.arms.get(&ArmKey::new(task_type, *name)) {
                Some(arm) => (
                    arm.posterior_at(now, half_life),
                    recency_weight(Some(arm.last_used), now, half_life),
                ),
                None => (BetaDistribution::uniform(), recency_weight(None, now, half_life)),
            })
            .collect();
        // The UCB horizon is every trial of the task type, candidate or not.
        let total_trials: f64 = state
            .arms
            .values()
            .filter(|arm| arm.key.task_type == task_type)
            .map(|arm| arm.posterior_at(now, half_life).evidence())
            .sum();

        let candidates: Vec<Candidate<'_>> = names
            .iter()
            .zip(&priors)
            .map(|(name, (posterior, recency))| {
                let adjust = RECENCY_FLOOR + RECENCY_SPAN * recency;
                let ucb = posterior.ucb(total_trials) * adjust;
                let score = if options.deterministic {
                    ucb
                } else {
                    posterior.sample(&mut state.rng) * adjust
                };
                Candidate {
                    strategy: *name,
                    posterior: *posterior,
                    score,
                    ucb,
                }
            })
            .collect();

        // Stable: ties keep input order.
        let mut ranked: Vec<&Candidate<'_>> = candidates.iter().collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut ucb_choice = &candidates[0];
        for candidate in &candidates[1..] {
            if candidate.ucb > ucb_choice.ucb {
                ucb_choice = candidate;
            }
        }

        let winner = ranked[0];
        let mode = match ranked.get(1) {
            Some(runner_up) if winner.posterior.mean() < runner_up.posterior.mean() => {
                DecisionMode::Exploration
            }
            _ => DecisionMode::Exploitation,
        };
        let policy = if options.deterministic {
            SelectionPolicy::Ucb
        } else {
            SelectionPolicy::Thompson
        };
        let reason = SelectionReason { policy, mode };

        state.counterfactuals.push(CounterfactualRecord {
            id: Uuid::new_v4(),
            timestamp: now,
            task_type: task_type.to_string(),
            chosen_by_policy: winner.strategy.to_string(),
            chosen_by_ucb: ucb_choice.strategy.to_string(),
            top_alternative_scores: ranked.iter().take(MAX_ALTERNATIVES).map(|c| c.scored()).collect(),
        });
        state.decisions += 1;
        if mode == DecisionMode::Exploration {
            state.explorations += 1;
        }

        debug!(
            task_type,
            chosen = winner.strategy,
            ucb_choice = ucb_choice.strategy,
            reason = %reason,
            score = winner.score,
            "Strategy selected"
        );

        Ok(SelectionResult {
            chosen_strategy: winner.strategy.to_string(),
            confidence: winner.posterior.confidence(),
            reason,
            score: winner.score,
            posterior_mean: winner.posterior.mean(),
            alternatives: ranked
                .iter()
                .skip(1)
                .take(MAX_ALTERNATIVES)
                .map(|c| c.scored())
                .collect(),
            distribution: winner.posterior,
        })
    }

    // -----------------------------------------------------------------------
    // Outcomes
    // -----------------------------------------------------------------------

    /// Apply the conjugate update for one observed outcome.
    ///
    /// Never touches storage: the arm is only marked dirty.
    pub async fn record_outcome(
        &self,
        task_type: &str,
        strategy: &str,
        success: bool,
        metrics: Option<OutcomeMetrics>,
    ) -> DomainResult<UpdateResult> {
        if task_type.is_empty() || strategy.is_empty() {
            return Err(DomainError::ValidationFailed(
                "task type and strategy must not be empty".to_string(),
            ));
        }

        self.request_hydration();
        let now = self.now();
        let half_life = self.half_life();
        let key = ArmKey::new(task_type, strategy);

        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let arm = state
            .arms
            .entry(key.clone())
            .or_insert_with(|| Arm::new(key.clone(), now));
        arm.record(
            success,
            metrics.unwrap_or_default(),
            now,
            half_life,
            self.inner.config.history_capacity,
        );
        let summary = arm.summary(now, half_life);
        state.mark_arm_dirty(&key);

        debug!(
            arm = %key,
            success,
            posterior_mean = summary.posterior_mean,
            confidence = summary.confidence,
            "Outcome recorded"
        );
        Ok(summary)
    }

    /// Posterior summaries for every arm of `task_type`, most confident first.
    pub async fn get_decision_metrics(&self, task_type: &str) -> Vec<PosteriorSummary> {
        self.request_hydration();
        let now = self.now();
        let half_life = self.half_life();
        let state = self.inner.state.lock().await;

        let mut summaries: Vec<PosteriorSummary> = state
            .arms
            .values()
            .filter(|arm| arm.key.task_type == task_type)
            .map(|arm| arm.summary(now, half_life))
            .collect();
        summaries.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(b.posterior_mean.total_cmp(&a.posterior_mean))
                .then(a.strategy.cmp(&b.strategy))
        });
        summaries
    }

    /// Thompson/UCB agreement over the recent decision window.
    pub async fn get_counterfactual_analysis(&self) -> CounterfactualAnalysis {
        let config = &self.inner.config;
        self.inner
            .state
            .lock()
            .await
            .counterfactuals
            .analysis(config.convergence_window, config.convergence_threshold)
    }

    // -----------------------------------------------------------------------
    // Decision rules
    // -----------------------------------------------------------------------

    /// Record whether `decision` worked in `context`.
    ///
    /// Contexts holding NaN or infinite floats are rejected: they have no
    /// stable rule id and could never be matched or reloaded.
    pub async fn learn_decision_rule(
        &self,
        context: RuleContext,
        decision: &str,
        success: bool,
    ) -> DomainResult<RuleUpdate> {
        if decision.is_empty() {
            return Err(DomainError::ValidationFailed(
                "decision must not be empty".to_string(),
            ));
        }
        if let Some(key) = context.non_finite_key() {
            return Err(DomainError::ValidationFailed(format!(
                "context value for '{key}' must be a finite number"
            )));
        }

        self.request_hydration();
        let now = self.now();
        let half_life = self.half_life();
        let mut state = self.inner.state.lock().await;
        Ok(state.rules.learn(context, decision, success, now, half_life))
    }

    /// Best known decision for exactly this context, if any rule has enough
    /// history. A context with non-finite values never has one.
    pub async fn get_best_rule(&self, context: &RuleContext) -> Option<DecisionRule> {
        self.request_hydration();
        let state = self.inner.state.lock().await;
        state
            .rules
            .best(context, self.inner.config.rule_min_attempts)
            .cloned()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Write every dirty arm and rule to the store now.
    ///
    /// Waits for hydration first so that persisted evidence is never
    /// overwritten by memory-only state. Keys whose write fails, or that
    /// change while the write is in flight, stay dirty.
    pub async fn flush(&self) -> FlushReport {
        let _flushing = self.inner.flush_lock.lock().await;
        self.ensure_hydrated().await;

        let persist_rules = self.inner.config.persist_rules;
        let (arm_writes, rule_writes, rule_deletes) = {
            let mut state = self.inner.state.lock().await;
            let arm_writes: Vec<ArmWrite> = state
                .dirty_arms
                .iter()
                .filter_map(|(key, generation)| {
                    state.arms.get(key).map(|arm| ArmWrite {
                        key: key.clone(),
                        generation: *generation,
                        payload: arm.to_payload(),
                        confidence: arm.distribution.confidence(),
                    })
                })
                .collect();
            let rule_writes = state.rules.dirty_snapshot();
            let rule_deletes = state.rules.pending_deletes();

            if persist_rules {
                (arm_writes, rule_writes, rule_deletes)
            } else {
                for (rule, generation) in &rule_writes {
                    state.rules.mark_clean(&rule.rule_id, *generation);
                }
                for rule_id in &rule_deletes {
                    state.rules.delete_done(rule_id);
                }
                (arm_writes, Vec::new(), Vec::new())
            }
        };

        let mut report = FlushReport::default();
        if arm_writes.is_empty() && rule_writes.is_empty() && rule_deletes.is_empty() {
            return report;
        }

        let repository = &self.inner.repository;
        let mut clean_arms: Vec<(ArmKey, u64)> = Vec::with_capacity(arm_writes.len());
        for write in arm_writes {
            let result = match serde_json::to_string(&write.payload) {
                Ok(payload) => {
                    repository
                        .upsert_pattern(
                            STRATEGY_ARM_PATTERN,
                            &write.key.pattern_key(),
                            &payload,
                            write.payload.attempts,
                            write.confidence,
                        )
                        .await
                }
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(()) => {
                    report.arms_written += 1;
                    clean_arms.push((write.key, write.generation));
                }
                Err(e) => {
                    warn!(arm = %write.key, error = %e, "Failed to persist arm");
                    report.failures += 1;
                    report.last_error = Some(e.to_string());
                }
            }
        }

        let mut clean_rules: Vec<(String, u64)> = Vec::with_capacity(rule_writes.len());
        for (rule, generation) in rule_writes {
            let result = match serde_json::to_string(&rule.to_payload()) {
                Ok(payload) => {
                    repository
                        .upsert_pattern(
                            DECISION_RULE_PATTERN,
                            &rule.rule_id,
                            &payload,
                            rule.attempts,
                            rule.effectiveness,
                        )
                        .await
                }
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(()) => {
                    report.rules_written += 1;
                    clean_rules.push((rule.rule_id, generation));
                }
                Err(e) => {
                    warn!(rule_id = %rule.rule_id, error = %e, "Failed to persist decision rule");
                    report.failures += 1;
                    report.last_error = Some(e.to_string());
                }
            }
        }

        let mut deleted: HashSet<String> = HashSet::new();
        for rule_id in rule_deletes {
            match repository.delete_pattern(DECISION_RULE_PATTERN, &rule_id).await {
                Ok(()) => {
                    report.rules_deleted += 1;
                    deleted.insert(rule_id);
                }
                Err(e) => {
                    warn!(rule_id = %rule_id, error = %e, "Failed to delete pruned decision rule");
                    report.failures += 1;
                    report.last_error = Some(e.to_string());
                }
            }
        }

        {
            let mut guard = self.inner.state.lock().await;
            let state = &mut *guard;
            for (key, generation) in clean_arms {
                if state.dirty_arms.get(&key) == Some(&generation) {
                    state.dirty_arms.remove(&key);
                }
            }
            for (rule_id, generation) in clean_rules {
                state.rules.mark_clean(&rule_id, generation);
            }
            for rule_id in &deleted {
                state.rules.delete_done(rule_id);
            }
        }

        if report.is_clean() {
            info!(
                arms = report.arms_written,
                rules = report.rules_written,
                deleted = report.rules_deleted,
                "Flushed learning state"
            );
        } else {
            warn!(
                failures = report.failures,
                arms = report.arms_written,
                rules = report.rules_written,
                "Flush incomplete, failed keys stay dirty"
            );
        }
        report
    }

    /// Adapt this engine to the periodic flush daemon.
    pub fn flush_job(&self) -> FlushJob<R> {
        FlushJob {
            engine: self.clone(),
        }
    }

    /// Start flushing every `flush_interval_ms`.
    pub fn spawn_flush_daemon(&self) -> (DaemonHandle, mpsc::Receiver<FlushDaemonEvent>) {
        let config = FlushDaemonConfig::with_interval(self.inner.config.flush_interval());
        FlushDaemon::new(self.flush_job(), config).start()
    }

    /// Stop the daemon and drain whatever is still dirty.
    pub async fn shutdown(&self, daemon: DaemonHandle) -> FlushReport {
        daemon.stop();
        daemon.join().await;
        self.flush().await
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub async fn get_stats(&self) -> EngineStats {
        let hydration = self.hydration_status();
        let state = self.inner.state.lock().await;

        let task_types: HashSet<&str> = state.arms.keys().map(|k| k.task_type.as_str()).collect();
        let exploration_rate = if state.decisions == 0 {
            0.0
        } else {
            state.explorations as f64 / state.decisions as f64
        };

        EngineStats {
            arms: state.arms.len(),
            task_types: task_types.len(),
            rules: state.rules.len(),
            dirty_arms: state.dirty_arms.len(),
            dirty_rules: state.rules.dirty_count(),
            pending_rule_deletes: state.rules.pending_delete_count(),
            total_attempts: state.arms.values().map(|a| a.attempts).sum(),
            total_successes: state.arms.values().map(|a| a.successes).sum(),
            counterfactual_samples: state.counterfactuals.len(),
            decisions: state.decisions,
            explorations: state.explorations,
            exploration_rate,
            hydration,
        }
    }

    /// Read-only view of one arm's posterior and diagnostics.
    pub async fn arm(&self, task_type: &str, strategy: &str) -> Option<Arm> {
        self.inner
            .state
            .lock()
            .await
            .arms
            .get(&ArmKey::new(task_type, strategy))
            .cloned()
    }

    /// Forget everything held in memory. Stored rows are untouched and
    /// hydration is not repeated.
    pub async fn reset(&self) {
        let mut state = self.inner.state.lock().await;
        state.arms.clear();
        state.dirty_arms.clear();
        state.rules.clear();
        state.counterfactuals.clear();
        state.decisions = 0;
        state.explorations = 0;
        info!("Strategy engine state reset");
    }
}

fn parse_arm(row: &StoredPattern) -> DomainResult<Arm> {
    let payload: ArmPayload = serde_json::from_str(&row.payload)?;
    Arm::try_from(payload)
}

fn parse_rule(row: &StoredPattern) -> DomainResult<DecisionRule> {
    let payload: DecisionRulePayload = serde_json::from_str(&row.payload)?;
    DecisionRule::try_from(payload)
}

/// [`PeriodicJob`] that flushes a [`StrategyEngine`].
pub struct FlushJob<R: PatternRepository + 'static> {
    engine: StrategyEngine<R>,
}

#[async_trait]
impl<R: PatternRepository + 'static> PeriodicJob for FlushJob<R> {
    fn name(&self) -> &str {
        "strategy_flush"
    }

    async fn run_once(&self) -> DomainResult<u64> {
        let report = self.engine.flush().await;
        if report.is_clean() {
            Ok(report.items())
        } else {
            Err(DomainError::PersistenceUnavailable(
                report
                    .last_error
                    .unwrap_or_else(|| format!("{} writes failed", report.failures)),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryPatternRepository;
    use crate::domain::ports::{ManualClock, NullPatternRepository};
    use chrono::{Duration, Utc};

    fn engine() -> StrategyEngine<InMemoryPatternRepository> {
        StrategyEngine::new(
            Arc::new(InMemoryPatternRepository::new()),
            EngineConfig::default().with_seed(7),
        )
    }

    #[tokio::test]
    async fn test_empty_strategy_list_is_rejected() {
        let engine = engine();
        let empty: [&str; 0] = [];
        let err = engine
            .choose_strategy("draft_memo", &empty, SelectionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_empty_task_type_is_rejected_everywhere() {
        let engine = engine();
        let err = engine
            .choose_strategy("", &["a"], SelectionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
        assert!(matches!(
            engine.record_outcome("", "a", true, None).await,
            Err(DomainError::ValidationFailed(_))
        ));
        assert_eq!(engine.get_stats().await.decisions, 0);
    }

    #[tokio::test]
    async fn test_ucb_horizon_counts_non_candidate_arms() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let engine = StrategyEngine::with_clock(
            Arc::new(InMemoryPatternRepository::new()),
            EngineConfig::default(),
            clock,
        );
        for _ in 0..2 {
            engine.record_outcome("t", "a", true, None).await.unwrap();
        }
        for _ in 0..20 {
            engine.record_outcome("t", "c", false, None).await.unwrap();
        }
        engine.record_outcome("other", "x", true, None).await.unwrap();

        let result = engine
            .choose_strategy("t", &["a"], SelectionOptions::deterministic())
            .await
            .unwrap();
        let expected = BetaDistribution::new(3.0, 1.0).ucb(22.0);
        assert!((result.score - expected).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_single_candidate_is_exploitation() {
        let engine = engine();
        let result = engine
            .choose_strategy("draft_memo", &["only"], SelectionOptions::default())
            .await
            .unwrap();
        assert_eq!(result.chosen_strategy, "only");
        assert_eq!(result.reason.mode, DecisionMode::Exploitation);
        assert!(result.alternatives.is_empty());
    }

    #[tokio::test]
    async fn test_duplicates_are_considered_once() {
        let engine = engine();
        let result = engine
            .choose_strategy("t", &["a", "a", "b"], SelectionOptions::deterministic())
            .await
            .unwrap();
        assert_eq!(result.alternatives.len(), 1);
    }

    #[tokio::test]
    async fn test_deterministic_ties_keep_input_order() {
        let engine = engine();
        for _ in 0..5 {
            let result = engine
                .choose_strategy("t", &["first", "second", "third"], SelectionOptions::deterministic())
                .await
                .unwrap();
            assert_eq!(result.chosen_strategy, "first");
            assert_eq!(result.reason.policy, SelectionPolicy::Ucb);
        }
    }

    #[tokio::test]
    async fn test_record_outcome_marks_dirty_and_flush_cleans() {
        let repo = Arc::new(InMemoryPatternRepository::new());
        let engine = StrategyEngine::new(repo.clone(), EngineConfig::default());

        engine.record_outcome("t", "a", true, None).await.unwrap();
        assert_eq!(engine.get_stats().await.dirty_arms, 1);

        let report = engine.flush().await;
        assert_eq!(report.arms_written, 1);
        assert_eq!(engine.get_stats().await.dirty_arms, 0);
        assert!(repo.get(STRATEGY_ARM_PATTERN, "t:a").await.is_some());

        // Nothing left to do.
        assert_eq!(engine.flush().await, FlushReport::default());
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_keys_dirty() {
        let repo = Arc::new(InMemoryPatternRepository::new());
        let engine = StrategyEngine::new(repo.clone(), EngineConfig::default());
        engine.record_outcome("t", "a", false, None).await.unwrap();

        repo.fail_writes(true);
        let report = engine.flush().await;
        assert_eq!(report.failures, 1);
        assert_eq!(engine.get_stats().await.dirty_arms, 1);
        assert!(engine.flush_job().run_once().await.is_err());

        repo.fail_writes(false);
        assert!(engine.flush().await.is_clean());
        assert_eq!(engine.get_stats().await.dirty_arms, 0);
    }

    #[tokio::test]
    async fn test_exploration_label_when_lower_mean_wins() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let engine = StrategyEngine::with_clock(
            Arc::new(NullPatternRepository::new()),
            EngineConfig::default().with_seed(11),
            clock,
        );
        engine.record_outcome("t", "good", true, None).await.unwrap();
        engine.record_outcome("t", "bad", false, None).await.unwrap();

        for _ in 0..200 {
            let result = engine
                .choose_strategy("t", &["good", "bad"], SelectionOptions::default())
                .await
                .unwrap();
            assert_eq!(result.is_exploration(), result.chosen_strategy == "bad");
        }
        let stats = engine.get_stats().await;
        assert_eq!(stats.decisions, 200);
        assert!(stats.explorations > 0);
        assert!(stats.exploration_rate < 0.5);
    }

    #[tokio::test]
    async fn test_reset_clears_memory_but_not_hydration() {
        let engine = engine();
        engine.ensure_hydrated().await;
        engine.record_outcome("t", "a", true, None).await.unwrap();
        engine
            .choose_strategy("t", &["a"], SelectionOptions::default())
            .await
            .unwrap();

        engine.reset().await;

        let stats = engine.get_stats().await;
        assert_eq!(stats.arms, 0);
        assert_eq!(stats.decisions, 0);
        assert_eq!(stats.counterfactual_samples, 0);
        assert!(stats.hydration.is_finished());
    }

    #[tokio::test]
    async fn test_decay_applies_between_outcomes() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let engine = StrategyEngine::with_clock(
            Arc::new(NullPatternRepository::new()),
            EngineConfig::default(),
            clock.clone(),
        );
        for _ in 0..4 {
            engine.record_outcome("t", "a", true, None).await.unwrap();
        }
        clock.advance(Duration::days(14));
        let summary = engine.record_outcome("t", "a", true, None).await.unwrap();

        // 4 successes halved, plus the new one.
        assert!((summary.distribution.alpha - 4.0).abs() < 1e-9);
        assert!((summary.distribution.beta - 1.0).abs() < 1e-9);
        assert_eq!(summary.total_attempts, 5);
    }
}
