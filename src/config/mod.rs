//! Configuration management for autocache
//!
//! Supports configuration via:
//! 1. Config file (~/.config/autocache/config.toml)
//! 2. Environment variables (ANTHROPIC_API_KEY, AUTOCACHE_STRATEGY, etc.)
//! 3. CLI arguments (override file/env settings)

use crate::cache::{Strategy, DEFAULT_STABILITY_SIGNALS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to initialize token estimator: {0}")]
    Estimator(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Anthropic Messages API endpoint
    pub upstream: UpstreamSettings,

    /// Breakpoint planning
    pub planner: PlannerSettings,

    pub logging: LoggingSettings,
}

/// Upstream endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    /// API key (can also use ANTHROPIC_API_KEY env var)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL; requests go to `{base_url}/v1/messages`
    pub base_url: String,

    /// Value of the `anthropic-version` header
    pub anthropic_version: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.anthropic.com".to_string(),
            anthropic_version: "2023-06-01".to_string(),
            timeout_secs: 300,
        }
    }
}

/// Which token estimator the planner uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    /// Character ratio, see `chars_per_token`
    #[default]
    Heuristic,
    /// BPE count with the cl100k_base vocabulary
    Tiktoken,
}

/// Planner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    /// conservative, moderate or aggressive
    pub strategy: Strategy,

    pub token_estimator: EstimatorKind,

    /// Only used by the heuristic estimator
    pub chars_per_token: usize,

    /// Case-insensitive phrases marking content as stable
    pub stability_signals: Vec<String>,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            token_estimator: EstimatorKind::default(),
            chars_per_token: 4,
            stability_signals: DEFAULT_STABILITY_SIGNALS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// trace, debug, info, warn or error. `RUST_LOG` takes precedence.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Get default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("autocache")
            .join("config.toml")
    }

    /// Load config from default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path())
    }

    /// Load config from specific path. A missing file yields defaults.
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default().with_env_overrides());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;

        Ok(config.with_env_overrides())
    }

    /// Apply environment variable overrides
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.upstream.api_key = Some(key);
        }
        if let Some(url) = lookup("ANTHROPIC_BASE_URL") {
            self.upstream.base_url = url;
        }
        if let Some(value) = lookup("AUTOCACHE_STRATEGY") {
            match value.parse::<Strategy>() {
                Ok(strategy) => self.planner.strategy = strategy,
                Err(e) => tracing::warn!("ignoring AUTOCACHE_STRATEGY: {}", e),
            }
        }
        if let Some(level) = lookup("AUTOCACHE_LOG_LEVEL") {
            self.logging.level = level;
        }

        self
    }

    /// Save config to default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::default_path())
    }

    /// Save config to specific path
    pub fn save_to(&self, path: PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Validate configuration. An absent API key is only an error when
    /// forwarding, see [`Config::require_api_key`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.upstream.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "upstream.base_url must be an http(s) URL, got '{}'",
                self.upstream.base_url
            )));
        }

        if self.upstream.anthropic_version.trim().is_empty() {
            return Err(ConfigError::MissingRequired(
                "upstream.anthropic_version".to_string(),
            ));
        }

        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "upstream.timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.planner.chars_per_token == 0 {
            return Err(ConfigError::Invalid(
                "planner.chars_per_token must be greater than zero".to_string(),
            ));
        }

        if self
            .planner
            .stability_signals
            .iter()
            .all(|s| s.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "planner.stability_signals must contain at least one phrase".to_string(),
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Get API key (from config or env)
    pub fn api_key(&self) -> Option<String> {
        self.upstream
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .filter(|key| !key.is_empty())
    }

    pub fn require_api_key(&self) -> Result<String, ConfigError> {
        self.api_key().ok_or_else(|| {
            ConfigError::MissingRequired(
                "API key (set upstream.api_key or ANTHROPIC_API_KEY)".to_string(),
            )
        })
    }

    /// Generate example config content
    pub fn example() -> String {
        let example = Config::default();
        toml::to_string_pretty(&example).unwrap_or_default()
    }
}

/// Builder for creating Config programmatically
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.upstream.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.upstream.base_url = url.into();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.upstream.timeout_secs = secs;
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.config.planner.strategy = strategy;
        self
    }

    pub fn token_estimator(mut self, kind: EstimatorKind) -> Self {
        self.config.planner.token_estimator = kind;
        self
    }

    pub fn stability_signals<I, S>(mut self, signals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.planner.stability_signals = signals.into_iter().map(Into::into).collect();
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.upstream.base_url, "https://api.anthropic.com");
        assert_eq!(config.upstream.anthropic_version, "2023-06-01");
        assert_eq!(config.planner.strategy, Strategy::Moderate);
        assert_eq!(config.planner.token_estimator, EstimatorKind::Heuristic);
        assert_eq!(config.planner.chars_per_token, 4);
        assert!(config
            .planner
            .stability_signals
            .iter()
            .any(|s| s == "you are"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .api_key("test-key")
            .strategy(Strategy::Aggressive)
            .token_estimator(EstimatorKind::Tiktoken)
            .stability_signals(["system manual:"])
            .build();

        assert_eq!(config.upstream.api_key, Some("test-key".to_string()));
        assert_eq!(config.api_key(), Some("test-key".to_string()));
        assert_eq!(config.planner.strategy, Strategy::Aggressive);
        assert_eq!(config.planner.token_estimator, EstimatorKind::Tiktoken);
        assert_eq!(config.planner.stability_signals, vec!["system manual:"]);
    }

    #[test]
    fn test_example_config() {
        let example = Config::example();
        assert!(example.contains("[upstream]"));
        assert!(example.contains("[planner]"));
        assert!(example.contains("strategy = \"moderate\""));
        assert!(example.contains("token_estimator = \"heuristic\""));
        assert!(!example.contains("api_key"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [planner]
            strategy = "conservative"
            "#,
        )
        .unwrap();

        assert_eq!(config.planner.strategy, Strategy::Conservative);
        assert_eq!(config.planner.chars_per_token, 4);
        assert_eq!(config.upstream.timeout_secs, 300);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_unknown_strategy_fails_to_parse() {
        let result: Result<Config, _> = toml::from_str("[planner]\nstrategy = \"reckless\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = ConfigBuilder::new()
            .base_url("http://localhost:8080")
            .timeout_secs(30)
            .strategy(Strategy::Conservative)
            .log_level("debug")
            .build();
        config.save_to(path.clone()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let loaded: Config = toml::from_str(&content).unwrap();
        assert_eq!(loaded.upstream.base_url, "http://localhost:8080");
        assert_eq!(loaded.upstream.timeout_secs, 30);
        assert_eq!(loaded.planner.strategy, Strategy::Conservative);
        assert_eq!(loaded.logging.level, "debug");
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.upstream.timeout_secs, 300);
    }

    #[test]
    fn test_load_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[planner\nstrategy = ").unwrap();

        assert!(matches!(
            Config::load_from(path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("ANTHROPIC_API_KEY", "sk-env"),
            ("ANTHROPIC_BASE_URL", "http://proxy:9000"),
            ("AUTOCACHE_STRATEGY", "Aggressive"),
            ("AUTOCACHE_LOG_LEVEL", "warn"),
        ]
        .into_iter()
        .collect();

        let config = Config::default().with_overrides(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.upstream.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.upstream.base_url, "http://proxy:9000");
        assert_eq!(config.planner.strategy, Strategy::Aggressive);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_invalid_strategy_override_is_ignored() {
        let config = ConfigBuilder::new()
            .strategy(Strategy::Conservative)
            .build()
            .with_overrides(|name| (name == "AUTOCACHE_STRATEGY").then(|| "yolo".to_string()));
        assert_eq!(config.planner.strategy, Strategy::Conservative);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_url = ConfigBuilder::new().base_url("api.anthropic.com").build();
        assert!(matches!(bad_url.validate(), Err(ConfigError::Invalid(_))));

        let zero_timeout = ConfigBuilder::new().timeout_secs(0).build();
        assert!(zero_timeout.validate().is_err());

        let no_signals = ConfigBuilder::new().stability_signals(["  "]).build();
        assert!(no_signals.validate().is_err());

        let bad_level = ConfigBuilder::new().log_level("loud").build();
        assert!(bad_level.validate().is_err());

        let mut zero_ratio = Config::default();
        zero_ratio.planner.chars_per_token = 0;
        assert!(zero_ratio.validate().is_err());
    }
}
