pub mod decision_rules;
pub mod flush_daemon;
pub mod strategy_engine;

pub use decision_rules::{DecisionRuleLearner, RuleUpdate};
pub use flush_daemon::{
    DaemonHandle, DaemonStatus, FlushDaemon, FlushDaemonConfig, FlushDaemonEvent, PeriodicJob,
    StopReason,
};
pub use strategy_engine::{EngineStats, FlushJob, FlushReport, HydrationStatus, StrategyEngine};
