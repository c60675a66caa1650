//! Configuration management for askdb.
//!
//! Handles loading configuration from TOML files and environment variables:
//! the target database, the LLM provider, the correction-loop ceiling and
//! retry policy, prompt rules, and the feedback log location.

use crate::error::{AskError, Result};
use crate::llm::prompt::{default_rules, AmbiguityRule};
use crate::llm::LlmProvider;
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default retry ceiling of the correction loop.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Main configuration structure for askdb.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Database URL (e.g. `sqlite://data/test_db.sqlite`).
    #[serde(default)]
    pub database_url: Option<String>,

    /// LLM provider configuration.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Correction loop settings.
    #[serde(default)]
    pub correction: CorrectionConfig,

    /// Prompt composition settings.
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Feedback log settings.
    #[serde(default)]
    pub feedback: FeedbackConfig,
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// LLM provider: "openai" or "mock".
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name (e.g., "gpt-3.5-turbo", "gpt-4o").
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default)]
    pub temperature: f32,

    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds (0 disables it).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: 0.0,
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// Parses the configured provider name.
    pub fn provider(&self) -> Result<LlmProvider> {
        self.provider
            .parse()
            .map_err(|e: String| AskError::config(format!("llm.provider: {e}")))
    }
}

/// Correction loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionConfig {
    /// Maximum number of execution attempts per question.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay policy between a failed attempt and the next correction.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry: RetryConfig::default(),
        }
    }
}

/// Prompt composition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// SQL dialect named in the prompts.
    #[serde(default = "default_dialect")]
    pub dialect: String,

    /// Row limit suggested to the model unless the user asks otherwise.
    #[serde(default = "default_row_limit")]
    pub row_limit: u32,

    /// Language of the final answer.
    #[serde(default = "default_answer_language")]
    pub answer_language: String,

    /// Ambiguity-resolution rules embedded in the generation prompt.
    #[serde(default = "default_rules")]
    pub rules: Vec<AmbiguityRule>,
}

fn default_dialect() -> String {
    "SQLite".to_string()
}

fn default_row_limit() -> u32 {
    5
}

fn default_answer_language() -> String {
    "English".to_string()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            dialect: default_dialect(),
            row_limit: default_row_limit(),
            answer_language: default_answer_language(),
            rules: default_rules(),
        }
    }
}

/// Feedback log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// Append-only feedback log path; an empty string disables logging.
    #[serde(default = "default_feedback_log_path")]
    pub log_path: PathBuf,
}

fn default_feedback_log_path() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("askdb")
        .join("feedback_logs.jsonl")
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            log_path: default_feedback_log_path(),
        }
    }
}

impl FeedbackConfig {
    /// Returns the log path, or `None` when logging is disabled.
    pub fn log_file(&self) -> Option<&Path> {
        (!self.log_path.as_os_str().is_empty()).then_some(self.log_path.as_path())
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("askdb")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    ///
    /// A missing file yields the default configuration.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AskError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            AskError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment variables (`ASKDB_DATABASE_URL`, `OPENAI_MODEL`) as overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("ASKDB_DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            self.llm.model = model;
        }
    }

    /// Checks values that serde cannot constrain.
    pub fn validate(&self) -> Result<()> {
        if self.correction.max_attempts == 0 {
            return Err(AskError::config(
                "correction.max_attempts must be at least 1",
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(AskError::config(format!(
                "llm.temperature must be between 0 and 2, got {}",
                self.llm.temperature
            )));
        }
        self.llm.provider()?;
        if self.prompt.rules.iter().any(|r| r.pattern.trim().is_empty()) {
            return Err(AskError::config("prompt.rules entries need a non-empty pattern"));
        }
        Ok(())
    }
}
