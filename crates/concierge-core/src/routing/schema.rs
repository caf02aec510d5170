//! JSON Schema validation for classifier output.
//!
//! The classifier's payload is checked against
//! schemas/routing_decision.schema.json before it is deserialized.

use std::sync::OnceLock;

const ROUTING_SCHEMA_JSON: &str = include_str!("../../../../schemas/routing_decision.schema.json");

static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn get_validator() -> Result<&'static jsonschema::Validator, String> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(ROUTING_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result.as_ref().map_err(Clone::clone)
}

/// Validate a classifier payload, returning every violation.
pub fn validate_routing_payload(payload: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e])?;

    let errors: Vec<String> = validator
        .iter_errors(payload)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_compiles() {
        assert!(get_validator().is_ok());
    }

    #[test]
    fn test_minimal_payload_valid() {
        let payload = json!({"query_type": "policy_question", "confidence_score": 0.9});
        assert!(validate_routing_payload(&payload).is_ok());
    }

    #[test]
    fn test_unknown_category_invalid() {
        let payload = json!({"query_type": "billing", "confidence_score": 0.9});
        assert!(validate_routing_payload(&payload).is_err());
    }

    #[test]
    fn test_missing_confidence_invalid() {
        let payload = json!({"query_type": "provider_lookup"});
        let errors = validate_routing_payload(&payload).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_confidence_out_of_range_invalid() {
        let payload = json!({"query_type": "provider_lookup", "confidence_score": 1.5});
        assert!(validate_routing_payload(&payload).is_err());
    }
}
