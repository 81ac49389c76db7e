use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid half_life_days: {0}. Must be positive and finite")]
    InvalidHalfLife(f64),

    #[error("Invalid {0}: must be at least 1")]
    ZeroCapacity(&'static str),

    #[error("Invalid convergence_threshold: {0}. Must be in (0, 1]")]
    InvalidConvergenceThreshold(f64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Database URL cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .tactician/config.yaml (project config)
    /// 3. .tactician/local.yaml (project local overrides, optional)
    /// 4. Environment variables (TACTICIAN_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment()
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring env overrides
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("TACTICIAN_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".tactician/config.yaml"))
            .merge(Yaml::file(".tactician/local.yaml"))
            .merge(Env::prefixed("TACTICIAN_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let engine = &config.engine;

        if !(engine.half_life_days.is_finite() && engine.half_life_days > 0.0) {
            return Err(ConfigError::InvalidHalfLife(engine.half_life_days));
        }

        for (name, value) in [
            ("history_capacity", engine.history_capacity),
            ("counterfactual_capacity", engine.counterfactual_capacity),
            ("convergence_window", engine.convergence_window),
            ("hydration_page_size", engine.hydration_page_size),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroCapacity(name));
            }
        }
        if engine.flush_interval_ms == 0 {
            return Err(ConfigError::ZeroCapacity("flush_interval_ms"));
        }

        if !(engine.convergence_threshold > 0.0 && engine.convergence_threshold <= 1.0) {
            return Err(ConfigError::InvalidConvergenceThreshold(
                engine.convergence_threshold,
            ));
        }

        // Validate database config
        if config.database.url.trim().is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        // Validate logging config
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!((config.engine.half_life_days - 14.0).abs() < f64::EPSILON);
        assert_eq!(config.engine.flush_interval_ms, 5_000);
        assert_eq!(config.engine.convergence_window, 50);
        assert_eq!(config.database.url, "sqlite:.tactician/tactician.db");
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
engine:
  half_life_days: 7.5
  flush_interval_ms: 1000
  persist_rules: false
  seed: 42
database:
  url: sqlite:/custom/path.db
  max_connections: 2
logging:
  level: debug
  format: json
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert!((config.engine.half_life_days - 7.5).abs() < f64::EPSILON);
        assert_eq!(config.engine.flush_interval_ms, 1000);
        assert!(!config.engine.persist_rules);
        assert_eq!(config.engine.seed, Some(42));
        assert_eq!(config.engine.history_capacity, 50, "unset fields keep defaults");
        assert_eq!(config.database.url, "sqlite:/custom/path.db");
        assert_eq!(config.database.max_connections, 2);
        assert_eq!(config.logging.format, "json");

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_half_life() {
        let mut config = Config::default();
        config.engine.half_life_days = 0.0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidHalfLife(_))
        ));

        config.engine.half_life_days = f64::NAN;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidHalfLife(_))
        ));
    }

    #[test]
    fn test_validate_zero_capacity() {
        let mut config = Config::default();
        config.engine.counterfactual_capacity = 0;

        match ConfigLoader::validate(&config) {
            Err(ConfigError::ZeroCapacity(name)) => assert_eq!(name, "counterfactual_capacity"),
            other => panic!("Expected ZeroCapacity error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_convergence_threshold() {
        let mut config = Config::default();
        config.engine.convergence_threshold = 1.5;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidConvergenceThreshold(_))
        ));

        config.engine.convergence_threshold = 1.0;
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidLogLevel(level)) => assert_eq!(level, "invalid"),
            _ => panic!("Expected InvalidLogLevel error"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogFormat(_))
        ));
    }

    #[test]
    fn test_validate_empty_database_url() {
        let mut config = Config::default();
        config.database.url = String::new();

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyDatabasePath)
        ));
    }

    #[test]
    fn test_validate_zero_max_connections() {
        let mut config = Config::default();
        config.database.max_connections = 0;

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxConnections(0))
        ));
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "engine:\n  rule_min_attempts: 5\nlogging:\n  level: warn").unwrap();
        file.flush().unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.engine.rule_min_attempts, 5);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_load_from_file_rejects_invalid_values() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "engine:\n  half_life_days: -3").unwrap();
        file.flush().unwrap();

        assert!(ConfigLoader::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_hierarchical_merging() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "engine:\n  half_life_days: 10\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "engine:\n  half_life_days: 21\nlogging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert!((config.engine.half_life_days - 21.0).abs() < f64::EPSILON, "Override should win");
        assert_eq!(
            config.logging.level, "debug",
            "Override should win for nested fields"
        );
        assert_eq!(
            config.logging.format, "json",
            "Base value should persist when not overridden"
        );
    }
}
