//! Guardrail thresholds and cooldowns.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::sample::GuardrailMetric;

/// Errors from guardrail configuration validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GuardrailConfigError {
    #[error("{metric} {tier} threshold {value} is outside [0, 1]")]
    OutOfRange {
        metric: GuardrailMetric,
        tier: &'static str,
        value: f64,
    },

    #[error("{metric} warning threshold {warning} is stricter than critical threshold {critical}")]
    InvertedTiers {
        metric: GuardrailMetric,
        warning: f64,
        critical: f64,
    },

    #[error("Invalid window: {0}")]
    InvalidWindow(String),
}

/// Critical and warning thresholds for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricTiers {
    pub critical: f64,
    pub warning: f64,
}

impl MetricTiers {
    pub const fn new(critical: f64, warning: f64) -> Self {
        Self { critical, warning }
    }
}

/// Two-tier thresholds for every monitored metric.
///
/// Accuracy, grounding and relevance are floors; toxicity and error rate
/// are ceilings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailThresholds {
    pub min_accuracy: MetricTiers,
    pub min_grounding: MetricTiers,
    pub min_relevance: MetricTiers,
    pub max_toxicity: MetricTiers,
    pub max_error_rate: MetricTiers,
}

impl Default for GuardrailThresholds {
    fn default() -> Self {
        Self {
            min_accuracy: MetricTiers::new(0.5, 0.7),
            min_grounding: MetricTiers::new(0.3, 0.5),
            min_relevance: MetricTiers::new(0.3, 0.5),
            max_toxicity: MetricTiers::new(0.7, 0.5),
            max_error_rate: MetricTiers::new(0.5, 0.2),
        }
    }
}

impl GuardrailThresholds {
    pub fn tiers(&self, metric: GuardrailMetric) -> MetricTiers {
        match metric {
            GuardrailMetric::Accuracy => self.min_accuracy,
            GuardrailMetric::Grounding => self.min_grounding,
            GuardrailMetric::Relevance => self.min_relevance,
            GuardrailMetric::Toxicity => self.max_toxicity,
            GuardrailMetric::ErrorRate => self.max_error_rate,
        }
    }
}

/// Cutoffs for judging a single sample on the bypass path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BypassCutoffs {
    /// Accuracy at or below this is catastrophic
    pub max_accuracy: f64,

    /// Toxicity at or above this is catastrophic
    pub min_toxicity: f64,
}

impl Default for BypassCutoffs {
    fn default() -> Self {
        Self {
            max_accuracy: 0.2,
            min_toxicity: 0.8,
        }
    }
}

/// Full monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    /// Samples retained in the rolling window
    pub window_size: usize,

    /// Most recent samples each aggregate looks at
    pub evaluation_span: usize,

    /// Values a metric needs in the span before it is judged
    pub min_samples: usize,

    pub thresholds: GuardrailThresholds,

    /// Minimum time between two emitted warnings
    #[serde(with = "crate::duration")]
    pub warning_cooldown: Duration,

    /// Minimum time between two disable actions
    #[serde(with = "crate::duration")]
    pub disable_cooldown: Duration,

    pub bypass: BypassCutoffs,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            window_size: 50,
            evaluation_span: 5,
            min_samples: 3,
            thresholds: GuardrailThresholds::default(),
            warning_cooldown: Duration::from_secs(5 * 60),
            disable_cooldown: Duration::from_secs(30 * 60),
            bypass: BypassCutoffs::default(),
        }
    }
}

impl GuardrailConfig {
    /// Set both cooldowns to zero.
    pub fn without_cooldowns(mut self) -> Self {
        self.warning_cooldown = Duration::ZERO;
        self.disable_cooldown = Duration::ZERO;
        self
    }

    pub fn validate(&self) -> Result<(), GuardrailConfigError> {
        if self.window_size == 0 {
            return Err(GuardrailConfigError::InvalidWindow(
                "window_size must be at least 1".to_string(),
            ));
        }
        if self.evaluation_span == 0 || self.evaluation_span > self.window_size {
            return Err(GuardrailConfigError::InvalidWindow(format!(
                "evaluation_span {} must be between 1 and window_size {}",
                self.evaluation_span, self.window_size
            )));
        }
        if self.min_samples == 0 || self.min_samples > self.evaluation_span {
            return Err(GuardrailConfigError::InvalidWindow(format!(
                "min_samples {} must be between 1 and evaluation_span {}",
                self.min_samples, self.evaluation_span
            )));
        }

        for metric in GuardrailMetric::ALL {
            let tiers = self.thresholds.tiers(metric);
            for (tier, value) in [("critical", tiers.critical), ("warning", tiers.warning)] {
                if !(0.0..=1.0).contains(&value) {
                    return Err(GuardrailConfigError::OutOfRange { metric, tier, value });
                }
            }

            let inverted = if metric.is_ceiling() {
                tiers.warning > tiers.critical
            } else {
                tiers.warning < tiers.critical
            };
            if inverted {
                return Err(GuardrailConfigError::InvertedTiers {
                    metric,
                    warning: tiers.warning,
                    critical: tiers.critical,
                });
            }
        }

        Ok(())
    }
}
