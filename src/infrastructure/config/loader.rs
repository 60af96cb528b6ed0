//! Layered configuration loading and validation.

use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid concurrency: {0}. Must be between 1 and 64")]
    InvalidConcurrency(usize),

    #[error("Invalid threshold: {0}. Must be within [0, 1]")]
    InvalidThreshold(f64),

    #[error("Invalid top_k: {0}. Must be at least 1")]
    InvalidTopK(u32),

    #[error("Invalid chunk_size: {0}. Must be at least 1")]
    InvalidChunkSize(u32),

    #[error("Invalid max_iterations: {0}. Must be at least 1")]
    InvalidMaxIterations(u32),

    #[error("Invalid target_judge: {0}. Must be within (0, 100]")]
    InvalidTarget(f64),

    #[error("Invalid rate limit: {0}. Must be positive")]
    InvalidRateLimit(u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid timeout for {0}: must be at least 1 second")]
    InvalidTimeout(&'static str),

    #[error("Engine binary path cannot be empty")]
    EmptyEngineBinary,

    #[error("Project name cannot be empty")]
    EmptyProject,

    #[error("No categories selected for evaluation")]
    NoCategories,

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .ragtune/config.yaml (project config)
    /// 3. .ragtune/local.yaml (local overrides, optional)
    /// 4. Environment variables (RAGTUNE_* prefix, `__` separates nesting)
    pub fn load() -> Result<Config> {
        Self::extract(Self::base())
    }

    /// Load configuration with an explicit file layered above the project
    /// files and below the environment.
    pub fn load_with(path: Option<&Path>) -> Result<Config> {
        match path {
            None => Self::load(),
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                let figment = Figment::new()
                    .merge(Serialized::defaults(Config::default()))
                    .merge(Yaml::file(".ragtune/config.yaml"))
                    .merge(Yaml::file(".ragtune/local.yaml"))
                    .merge(Yaml::file(path))
                    .merge(Env::prefixed("RAGTUNE_").split("__"));
                Self::extract(figment)
                    .with_context(|| format!("Failed to load config from {}", path.display()))
            }
        }
    }

    /// Load configuration from a specific file, ignoring project files and
    /// the environment
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn base() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".ragtune/config.yaml"))
            .merge(Yaml::file(".ragtune/local.yaml"))
            .merge(Env::prefixed("RAGTUNE_").split("__"))
    }

    fn extract(figment: Figment) -> Result<Config> {
        let config: Config = figment
            .extract()
            .context("Failed to extract configuration from figment")?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.engine.binary.as_os_str().is_empty() {
            return Err(ConfigError::EmptyEngineBinary);
        }
        if config.engine.project.trim().is_empty() {
            return Err(ConfigError::EmptyProject);
        }

        let timeouts = &config.engine.timeouts;
        for (name, secs) in [
            ("ask", timeouts.ask_secs),
            ("add", timeouts.add_secs),
            ("embed", timeouts.embed_secs),
            ("graph", timeouts.graph_secs),
            ("forget", timeouts.forget_secs),
            ("build", config.engine.build.timeout_secs),
            ("llm", config.llm.timeout_secs),
            ("ceiling", config.llm.ceiling_timeout_secs),
            ("item", config.eval.item_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::InvalidTimeout(name));
            }
        }

        if config.eval.concurrency == 0 || config.eval.concurrency > 64 {
            return Err(ConfigError::InvalidConcurrency(config.eval.concurrency));
        }
        if config.eval.categories.is_empty() {
            return Err(ConfigError::NoCategories);
        }
        if config.eval.max_per_category == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "max_per_category must be at least 1 when set".to_string(),
            ));
        }

        let tuning = &config.tuning;
        if !(0.0..=1.0).contains(&tuning.threshold) {
            return Err(ConfigError::InvalidThreshold(tuning.threshold));
        }
        if tuning.top_k == 0 {
            return Err(ConfigError::InvalidTopK(tuning.top_k));
        }
        if tuning.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(tuning.chunk_size));
        }
        if tuning.max_iterations == 0 {
            return Err(ConfigError::InvalidMaxIterations(tuning.max_iterations));
        }
        if tuning.target_judge <= 0.0 || tuning.target_judge > 100.0 {
            return Err(ConfigError::InvalidTarget(tuning.target_judge));
        }

        let strategies = &tuning.strategies;
        if !(0.0..=1.0).contains(&strategies.threshold_floor) {
            return Err(ConfigError::InvalidThreshold(strategies.threshold_floor));
        }
        if strategies.threshold_step <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "threshold_step must be positive".to_string(),
            ));
        }
        if strategies.top_k_step == 0 || strategies.top_k_ceiling == 0 {
            return Err(ConfigError::InvalidTopK(strategies.top_k_step.min(strategies.top_k_ceiling)));
        }
        if strategies.chunk_size_to == 0 {
            return Err(ConfigError::InvalidChunkSize(strategies.chunk_size_to));
        }
        if strategies.reindex_every == 0 {
            return Err(ConfigError::ValidationFailed(
                "reindex_every must be at least 1".to_string(),
            ));
        }

        if config.llm.rate_limit.requests_per_second == 0 {
            return Err(ConfigError::InvalidRateLimit(
                config.llm.rate_limit.requests_per_second,
            ));
        }
        let retry = &config.llm.retry;
        if retry.initial_backoff_ms >= retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                retry.initial_backoff_ms,
                retry.max_backoff_ms,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::LogFormat;
    use crate::domain::models::qa::Category;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engine.project, "Personal");
        assert!((config.tuning.threshold - 0.15).abs() < f64::EPSILON);
        assert_eq!(config.tuning.top_k, 12);
        assert_eq!(config.tuning.max_iterations, 6);
        assert_eq!(config.eval.categories.len(), 6);
        assert!(!config.eval.categories.contains(&Category::Questions));
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
engine:
  binary: /opt/engram/bin/engram
  project: Work
  timeouts:
    ask_secs: 45
eval:
  categories: [bugs, patterns]
  max_per_category: 5
  concurrency: 8
tuning:
  threshold: 0.2
  target_judge: 20.0
  strategies:
    top_k_ceiling: 32
logging:
  level: debug
  format: json
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.engine.project, "Work");
        assert_eq!(config.engine.timeouts.ask_secs, 45);
        assert_eq!(config.engine.timeouts.embed_secs, 300);
        assert_eq!(config.eval.categories, vec![Category::Bugs, Category::Patterns]);
        assert_eq!(config.eval.max_per_category, Some(5));
        assert_eq!(config.tuning.strategies.top_k_ceiling, 32);
        assert_eq!(config.tuning.strategies.top_k_step, 4);
        assert_eq!(config.logging.format, LogFormat::Json);

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_unknown_category_rejected() {
        let yaml = "eval:\n  categories: [bugs, gossip]\n";
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn test_validate_concurrency_bounds() {
        let mut config = Config::default();
        config.eval.concurrency = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidConcurrency(0))
        ));

        config.eval.concurrency = 65;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidConcurrency(65))
        ));
    }

    #[test]
    fn test_validate_threshold_range() {
        let mut config = Config::default();
        config.tuning.threshold = 1.5;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.engine.timeouts.embed_secs = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidTimeout("embed"))
        ));
    }

    #[test]
    fn test_validate_invalid_backoff() {
        let mut config = Config::default();
        config.llm.retry.initial_backoff_ms = 10_000;
        config.llm.retry.max_backoff_ms = 1_000;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBackoff(10_000, 1_000))
        ));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_validate_empty_categories() {
        let mut config = Config::default();
        config.eval.categories.clear();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::NoCategories)
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "tuning:\n  top_k: 16\n  max_iterations: 3").unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.tuning.top_k, 16);
        assert_eq!(config.tuning.max_iterations, 3);
        assert_eq!(config.tuning.chunk_size, 1000);
    }

    #[test]
    fn test_load_from_invalid_file_fails_validation() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "eval:\n  concurrency: 0").unwrap();

        assert!(ConfigLoader::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "engine:\n  project: FromFile\ntuning:\n  top_k: 16").unwrap();

        temp_env::with_vars(
            [
                ("RAGTUNE_ENGINE__PROJECT", Some("FromEnv")),
                ("RAGTUNE_TUNING__MAX_ITERATIONS", Some("2")),
            ],
            || {
                let config = ConfigLoader::load_with(Some(file.path())).unwrap();
                assert_eq!(config.engine.project, "FromEnv");
                assert_eq!(config.tuning.max_iterations, 2);
                assert_eq!(config.tuning.top_k, 16);
            },
        );
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = ConfigLoader::load_with(Some(Path::new("/nonexistent/ragtune.yaml")));
        assert!(result.is_err());
    }
}
