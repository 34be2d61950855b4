//! Configuration loading.
//!
//! Loads from `./config.toml` (or `$BROKERBOT_CONFIG_PATH`); environment
//! variables override file values, file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Language service settings (`[llm]`).
    pub llm: LlmConfig,
    /// Filesystem paths (`[paths]`).
    pub paths: PathsConfig,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: LogLevelConfig,
}

impl BrokerConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$BROKERBOT_CONFIG_PATH` or `./config.toml`.
    /// A missing file is not an error; defaults apply.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML string into config (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error on invalid TOML.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: BrokerConfig =
            toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let path = Self::config_path_with(|key| std::env::var(key).ok());
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(BrokerConfig::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    /// Resolve config path using a custom env resolver (for testing).
    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env("BROKERBOT_CONFIG_PATH")
            .map_or_else(|| PathBuf::from("config.toml"), PathBuf::from)
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function for testability.
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("BROKERBOT_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = env("BROKERBOT_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = env("BROKERBOT_LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = env("BROKERBOT_LOGS_DIR") {
            self.paths.logs_dir = v;
        }
        if let Some(v) = env("BROKERBOT_LOG_LEVEL") {
            self.log_level.0 = v;
        }
    }
}

/// Default tracing filter, newtyped so the field can default sensibly.
#[derive(Debug, Clone, Deserialize)]
pub struct LogLevelConfig(pub String);

impl Default for LogLevelConfig {
    fn default() -> Self {
        Self("info".to_owned())
    }
}

/// Language service configuration (`[llm]`).
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API root, e.g. `https://api.openai.com`.
    pub base_url: String,
    /// Model name for both the analysis and drafting calls.
    pub model: String,
    /// API key. Required for `run`; usually supplied via
    /// `BROKERBOT_LLM_API_KEY`.
    pub api_key: Option<String>,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "__REDACTED__"))
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_owned(),
            model: "gpt-4o-mini".to_owned(),
            api_key: None,
        }
    }
}

/// Filesystem paths (`[paths]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory for rotated JSON log files.
    pub logs_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            logs_dir: "logs".to_owned(),
        }
    }
}
