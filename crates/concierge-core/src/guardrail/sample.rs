//! Quality samples fed to the monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A metric the monitor aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailMetric {
    Accuracy,
    Grounding,
    Relevance,
    Toxicity,
    ErrorRate,
}

impl GuardrailMetric {
    pub const ALL: [GuardrailMetric; 5] = [
        GuardrailMetric::Accuracy,
        GuardrailMetric::Grounding,
        GuardrailMetric::Relevance,
        GuardrailMetric::Toxicity,
        GuardrailMetric::ErrorRate,
    ];

    /// True when higher values are worse.
    pub fn is_ceiling(&self) -> bool {
        matches!(self, GuardrailMetric::Toxicity | GuardrailMetric::ErrorRate)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GuardrailMetric::Accuracy => "accuracy",
            GuardrailMetric::Grounding => "grounding",
            GuardrailMetric::Relevance => "relevance",
            GuardrailMetric::Toxicity => "toxicity",
            GuardrailMetric::ErrorRate => "error_rate",
        }
    }
}

impl fmt::Display for GuardrailMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One graded response as the monitor sees it.
///
/// Scores are optional: a metric that was not computed for a response is
/// left out of that metric's aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailSample {
    pub timestamp: DateTime<Utc>,
    pub accuracy: Option<f64>,
    pub grounding: Option<f64>,
    pub relevance: Option<f64>,
    pub toxicity: Option<f64>,
    pub error_occurred: bool,
    pub response_time_ms: Option<u64>,
}

impl GuardrailSample {
    /// An empty, successful sample.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            accuracy: None,
            grounding: None,
            relevance: None,
            toxicity: None,
            error_occurred: false,
            response_time_ms: None,
        }
    }

    /// A sample recording a grading failure.
    pub fn error(timestamp: DateTime<Utc>) -> Self {
        Self {
            error_occurred: true,
            ..Self::new(timestamp)
        }
    }

    pub fn with_accuracy(mut self, score: f64) -> Self {
        self.accuracy = Some(score);
        self
    }

    pub fn with_grounding(mut self, score: f64) -> Self {
        self.grounding = Some(score);
        self
    }

    pub fn with_relevance(mut self, score: f64) -> Self {
        self.relevance = Some(score);
        self
    }

    pub fn with_toxicity(mut self, score: f64) -> Self {
        self.toxicity = Some(score);
        self
    }

    pub fn with_response_time_ms(mut self, ms: u64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }

    /// Score for a per-sample metric. Error rate is a window property, so
    /// this reports 1.0 or 0.0 for it.
    pub fn metric(&self, metric: GuardrailMetric) -> Option<f64> {
        match metric {
            GuardrailMetric::Accuracy => self.accuracy,
            GuardrailMetric::Grounding => self.grounding,
            GuardrailMetric::Relevance => self.relevance,
            GuardrailMetric::Toxicity => self.toxicity,
            GuardrailMetric::ErrorRate => Some(if self.error_occurred { 1.0 } else { 0.0 }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_sample_has_no_scores() {
        let sample = GuardrailSample::error(Utc::now());
        assert!(sample.error_occurred);
        assert_eq!(sample.metric(GuardrailMetric::Accuracy), None);
        assert_eq!(sample.metric(GuardrailMetric::ErrorRate), Some(1.0));
    }

    #[test]
    fn test_ceiling_metrics() {
        assert!(GuardrailMetric::Toxicity.is_ceiling());
        assert!(GuardrailMetric::ErrorRate.is_ceiling());
        assert!(!GuardrailMetric::Accuracy.is_ceiling());
    }
}
