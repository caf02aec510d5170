//! Parsing of grader answers into per-metric scores.

use serde_json::Value;
use thiserror::Error;

use concierge_core::{extract_json_object, MetricScore};

/// Why a grader answer could not be turned into a score.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradeParseError {
    #[error("no JSON object in grader output")]
    NoJson,

    #[error("missing score")]
    MissingScore,

    #[error("score is not numeric: {0}")]
    NonNumericScore(String),
}

/// Parse `{score, reasoning, issues}` out of free-form grader output.
///
/// The score is clamped into [0, 1] and compared against `threshold`. A score
/// given as a numeric string is accepted.
pub fn parse_grade(text: &str, threshold: f64) -> Result<MetricScore, GradeParseError> {
    let payload = extract_json_object(text).ok_or(GradeParseError::NoJson)?;

    let score = match payload.get("score") {
        None | Some(Value::Null) => return Err(GradeParseError::MissingScore),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| GradeParseError::NonNumericScore(n.to_string()))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| GradeParseError::NonNumericScore(s.clone()))?,
        Some(other) => return Err(GradeParseError::NonNumericScore(other.to_string())),
    };

    if !score.is_finite() {
        return Err(GradeParseError::NonNumericScore(score.to_string()));
    }

    let reasoning = payload
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let issues = payload
        .get("issues")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(MetricScore::graded(score, threshold, reasoning, issues))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_grade() {
        let text = "Here is my grade:\n```json\n{\"score\": 0.85, \"reasoning\": \"Matches the documents\", \"issues\": []}\n```";
        let grade = parse_grade(text, 0.8).unwrap();
        assert_eq!(grade.score, 0.85);
        assert!(grade.passed);
        assert_eq!(grade.reasoning, "Matches the documents");
        assert!(grade.issues.is_empty());
    }

    #[test]
    fn test_below_threshold_fails() {
        let grade = parse_grade(r#"{"score": 0.75, "issues": ["copay amount wrong"]}"#, 0.8).unwrap();
        assert!(!grade.passed);
        assert_eq!(grade.issues, vec!["copay amount wrong".to_string()]);
        assert_eq!(grade.reasoning, "");
    }

    #[test]
    fn test_out_of_range_clamped() {
        assert_eq!(parse_grade(r#"{"score": 1.7}"#, 0.7).unwrap().score, 1.0);
        assert_eq!(parse_grade(r#"{"score": -2}"#, 0.7).unwrap().score, 0.0);
    }

    #[test]
    fn test_numeric_string_accepted() {
        let grade = parse_grade(r#"{"score": " 0.9 "}"#, 0.7).unwrap();
        assert_eq!(grade.score, 0.9);
    }

    #[test]
    fn test_non_numeric_score_rejected() {
        assert!(matches!(
            parse_grade(r#"{"score": "excellent"}"#, 0.7),
            Err(GradeParseError::NonNumericScore(_))
        ));
        assert!(matches!(
            parse_grade(r#"{"score": [1]}"#, 0.7),
            Err(GradeParseError::NonNumericScore(_))
        ));
    }

    #[test]
    fn test_missing_score_and_prose() {
        assert_eq!(
            parse_grade(r#"{"reasoning": "fine"}"#, 0.7),
            Err(GradeParseError::MissingScore)
        );
        assert_eq!(
            parse_grade("The response is great, 9/10.", 0.7),
            Err(GradeParseError::NoJson)
        );
    }
}
