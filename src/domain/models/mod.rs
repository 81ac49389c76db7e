//! Domain models for the strategy selection engine.

pub mod arm;
pub mod beta;
pub mod config;
pub mod counterfactual;
pub mod decay;
pub mod decision_rule;
pub mod selection;

pub use arm::{
    Arm, ArmKey, ArmPayload, OutcomeMetrics, OutcomeSample, PosteriorSummary, UpdateResult,
    STRATEGY_ARM_PATTERN,
};
pub use beta::{
    beta_confidence, beta_mean, beta_ucb, beta_variance, sample_beta, sample_gamma, sample_normal,
    BetaDistribution,
};
pub use config::{Config, DatabaseConfig, EngineConfig, LoggingConfig};
pub use counterfactual::{
    CounterfactualAnalysis, CounterfactualLog, CounterfactualRecord, ScoredStrategy,
};
pub use decay::{decay_factor, elapsed_days, recency_weight, DEFAULT_HALF_LIFE_DAYS};
pub use decision_rule::{
    rule_id, ContextValue, DecisionRule, DecisionRulePayload, RuleContext, RuleVerdict,
    DECISION_RULE_PATTERN,
};
pub use selection::{
    DecisionMode, SelectionOptions, SelectionPolicy, SelectionReason, SelectionResult,
};
