use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::counterfactual::{
    DEFAULT_CONVERGENCE_THRESHOLD, DEFAULT_CONVERGENCE_WINDOW, DEFAULT_COUNTERFACTUAL_CAPACITY,
};
use super::decay::DEFAULT_HALF_LIFE_DAYS;

/// Main configuration structure for Tactician
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Strategy engine tuning
    #[serde(default)]
    pub engine: EngineConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Strategy engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Evidence half-life in days
    #[serde(default = "default_half_life_days")]
    pub half_life_days: f64,

    /// Interval between batched flushes, in milliseconds
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Per-arm rolling diagnostic history length
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Counterfactual ring buffer length
    #[serde(default = "default_counterfactual_capacity")]
    pub counterfactual_capacity: usize,

    /// Decisions considered by the convergence analysis
    #[serde(default = "default_convergence_window")]
    pub convergence_window: usize,

    /// Agreement rate above which Thompson and UCB count as converged
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f64,

    /// Rows read per page while hydrating a pattern type
    #[serde(default = "default_hydration_page_size")]
    pub hydration_page_size: usize,

    /// Minimum attempts before a decision rule is recommended
    #[serde(default = "default_rule_min_attempts")]
    pub rule_min_attempts: u64,

    /// Persist decision rules alongside arms
    #[serde(default = "default_true")]
    pub persist_rules: bool,

    /// Seed for the sampling RNG; OS entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

const fn default_half_life_days() -> f64 {
    DEFAULT_HALF_LIFE_DAYS
}

const fn default_flush_interval_ms() -> u64 {
    5_000
}

const fn default_history_capacity() -> usize {
    50
}

const fn default_counterfactual_capacity() -> usize {
    DEFAULT_COUNTERFACTUAL_CAPACITY
}

const fn default_convergence_window() -> usize {
    DEFAULT_CONVERGENCE_WINDOW
}

const fn default_convergence_threshold() -> f64 {
    DEFAULT_CONVERGENCE_THRESHOLD
}

const fn default_hydration_page_size() -> usize {
    1_000
}

const fn default_rule_min_attempts() -> u64 {
    3
}

const fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            half_life_days: default_half_life_days(),
            flush_interval_ms: default_flush_interval_ms(),
            history_capacity: default_history_capacity(),
            counterfactual_capacity: default_counterfactual_capacity(),
            convergence_window: default_convergence_window(),
            convergence_threshold: default_convergence_threshold(),
            hydration_page_size: default_hydration_page_size(),
            rule_min_attempts: default_rule_min_attempts(),
            persist_rules: default_true(),
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Flush interval as a `Duration`.
    pub const fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Same configuration with a fixed sampling seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// `SQLite` connection URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "sqlite:.tactician/tactician.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when absent
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation policy for file logs: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
