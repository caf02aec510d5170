//! Parsing of the classifier's structured output.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

use super::schema::validate_routing_payload;
use crate::json::extract_json_object;
use crate::types::QueryCategory;

/// Why a classifier response could not be used.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RoutingParseError {
    #[error("No JSON object found in classifier output")]
    NoJson,

    #[error("Classifier output failed schema validation: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("Failed to decode classifier payload: {0}")]
    Decode(String),
}

/// Payload the classifier is asked to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierPayload {
    pub query_type: QueryCategory,

    pub confidence_score: f64,

    #[serde(default)]
    pub extracted_context: Map<String, JsonValue>,

    #[serde(default)]
    pub escalation_needed: bool,

    #[serde(default)]
    pub reasoning: String,
}

/// Extract, validate and decode a classifier response.
pub fn parse_classifier_output(text: &str) -> Result<ClassifierPayload, RoutingParseError> {
    let value = extract_json_object(text).ok_or(RoutingParseError::NoJson)?;
    validate_routing_payload(&value).map_err(RoutingParseError::Schema)?;
    serde_json::from_value(value).map_err(|e| RoutingParseError::Decode(e.to_string()))
}
