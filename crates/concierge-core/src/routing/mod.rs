//! Classification output handling.
//!
//! Classifier text is extracted, validated against an embedded JSON Schema
//! and turned into a [`RoutingDecision`]. The escalation rule is applied
//! here so every caller sees the same routing.

mod decision;
mod parser;
mod schema;

pub use decision::{RoutingDecision, ESCALATION_CONFIDENCE_THRESHOLD};
pub use parser::{parse_classifier_output, ClassifierPayload, RoutingParseError};
pub use schema::validate_routing_payload;
