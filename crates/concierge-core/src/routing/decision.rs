//! The routing decision and the escalation rule.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::parser::{parse_classifier_output, ClassifierPayload};
use crate::types::{QueryCategory, SpecialistId};

/// Below this confidence a request always goes to a live agent.
pub const ESCALATION_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Outcome of classification, after the escalation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Category the request is dispatched on
    pub category: QueryCategory,

    /// What the classifier chose before any override
    pub classified_category: Option<QueryCategory>,

    /// Confidence in [0, 1]
    pub confidence: f64,

    pub escalation: bool,

    #[serde(default)]
    pub extracted_context: Map<String, JsonValue>,

    #[serde(default)]
    pub reasoning: String,

    /// The classifier output could not be used
    #[serde(default)]
    pub parse_failed: bool,
}

impl RoutingDecision {
    /// Build a decision from raw classifier text. Never fails: unusable
    /// output becomes the fail-safe decision.
    pub fn from_classifier_output(text: &str) -> Self {
        match parse_classifier_output(text) {
            Ok(payload) => Self::from_payload(payload),
            Err(e) => {
                tracing::warn!(error = %e, "Classifier output unusable, routing to live agent");
                Self::fail_safe(e.to_string())
            }
        }
    }

    pub fn from_payload(payload: ClassifierPayload) -> Self {
        Self {
            category: payload.query_type,
            classified_category: Some(payload.query_type),
            confidence: payload.confidence_score.clamp(0.0, 1.0),
            escalation: payload.escalation_needed,
            extracted_context: payload.extracted_context,
            reasoning: payload.reasoning,
            parse_failed: false,
        }
        .apply_escalation_rule()
    }

    /// Confidence 0, escalated to a live agent.
    pub fn fail_safe(reason: impl Into<String>) -> Self {
        Self {
            category: QueryCategory::ScheduleAgent,
            classified_category: None,
            confidence: 0.0,
            escalation: true,
            extracted_context: Map::new(),
            reasoning: format!(
                "Failed to classify query, routing to live agent: {}",
                reason.into()
            ),
            parse_failed: true,
        }
    }

    /// Force the scheduling category when confidence is too low.
    ///
    /// Applied exactly once, after classification and before dispatch.
    pub fn apply_escalation_rule(mut self) -> Self {
        if self.confidence < ESCALATION_CONFIDENCE_THRESHOLD {
            self.category = QueryCategory::ScheduleAgent;
            self.escalation = true;
        }
        self
    }

    pub fn specialist(&self) -> SpecialistId {
        self.category.specialist()
    }

    /// The escalation rule replaced the classifier's category.
    pub fn was_overridden(&self) -> bool {
        self.classified_category
            .map(|c| c != self.category)
            .unwrap_or(false)
    }
}
