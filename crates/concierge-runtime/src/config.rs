//! Runtime configuration.
//!
//! Loaded from YAML or JSON and validated on load:
//!
//! ```yaml
//! stages:
//!   render:
//!     model: claude-sonnet-4-5
//!     temperature: 0.7
//!     timeout: 20s
//!     fallback_model: claude-haiku-4-5
//! retrieval:
//!   top_k: 5
//!   cache_ttl: 10m
//! guardrail:
//!   disable_cooldown: 30m
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use concierge_core::guardrail::{GuardrailConfig, GuardrailConfigError};
use concierge_core::{RequestContext, SafetyCategory};

use crate::providers::CompletionConfig;

/// Context key that routes a render retry away from the failing variant.
pub const RENDER_FALLBACK_FLAG: &str = "render_fallback";

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid guardrail config: {0}")]
    Guardrail(#[from] GuardrailConfigError),

    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Model settings for one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_timeout", with = "concierge_core::duration")]
    pub timeout: Duration,

    /// Model used when the request context carries the render-fallback flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_model: Option<String>,
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl StageConfig {
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            max_tokens: default_max_tokens(),
            temperature,
            timeout: default_timeout(),
            fallback_model: None,
        }
    }

    pub fn with_fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = Some(model.into());
        self
    }

    pub fn completion(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
        }
    }

    /// Completion settings targeted by the request context.
    pub fn completion_for(&self, context: &RequestContext) -> CompletionConfig {
        let mut config = self.completion();
        if context.is_flagged(RENDER_FALLBACK_FLAG) {
            if let Some(model) = &self.fallback_model {
                config.model = model.clone();
            }
        }
        config
    }
}

/// Per-stage model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagesConfig {
    pub triage: StageConfig,
    pub policy: StageConfig,
    pub provider: StageConfig,
    pub scheduling: StageConfig,
    pub render: StageConfig,
    pub judge_accuracy: StageConfig,
    pub judge_coherence: StageConfig,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            triage: StageConfig::new("claude-haiku-4-5", 0.0),
            policy: StageConfig::new("claude-sonnet-4-5", 0.3),
            provider: StageConfig::new("claude-sonnet-4-5", 0.3),
            scheduling: StageConfig::new("claude-haiku-4-5", 0.7),
            render: StageConfig::new("claude-sonnet-4-5", 0.7)
                .with_fallback_model("claude-haiku-4-5"),
            judge_accuracy: StageConfig::new("claude-sonnet-4-5", 0.0),
            judge_coherence: StageConfig::new("claude-sonnet-4-5", 0.0),
        }
    }
}

/// Retrieval settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Passages requested per query
    pub top_k: usize,

    /// How long a memoised retrieval stays valid
    #[serde(with = "concierge_core::duration")]
    pub cache_ttl: Duration,

    pub cache_capacity: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            cache_ttl: Duration::from_secs(600),
            cache_capacity: 1_000,
        }
    }
}

/// Backoff for transient generation failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: usize,

    #[serde(with = "concierge_core::duration")]
    pub min_delay: Duration,

    #[serde(with = "concierge_core::duration")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            min_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

/// Callback slot generation for the scheduling specialist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Calendar days to look ahead, starting tomorrow
    pub days_ahead: u32,

    /// Most slots offered in one answer
    pub max_slots: usize,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            days_ahead: 7,
            max_slots: 10,
        }
    }
}

/// Local screen over rendered text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub categories: Vec<SafetyCategory>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            categories: SafetyCategory::defaults(),
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub stages: StagesConfig,
    pub retrieval: RetrievalConfig,
    pub retry: RetryConfig,
    pub scheduling: SchedulingConfig,
    pub safety: SafetyConfig,
    pub guardrail: GuardrailConfig,
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.guardrail.validate()?;

        let stages = [
            ("triage", &self.stages.triage),
            ("policy", &self.stages.policy),
            ("provider", &self.stages.provider),
            ("scheduling", &self.stages.scheduling),
            ("render", &self.stages.render),
            ("judge_accuracy", &self.stages.judge_accuracy),
            ("judge_coherence", &self.stages.judge_coherence),
        ];
        for (name, stage) in stages {
            if stage.model.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "stage '{}' has no model",
                    name
                )));
            }
            if stage.max_tokens == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "stage '{}' max_tokens must be positive",
                    name
                )));
            }
        }

        if self.retrieval.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.top_k must be at least 1".to_string(),
            ));
        }
        if self.scheduling.max_slots == 0 {
            return Err(ConfigError::ValidationError(
                "scheduling.max_slots must be at least 1".to_string(),
            ));
        }
        if self.retry.min_delay > self.retry.max_delay {
            return Err(ConfigError::ValidationError(
                "retry.min_delay exceeds retry.max_delay".to_string(),
            ));
        }

        Ok(())
    }
}
