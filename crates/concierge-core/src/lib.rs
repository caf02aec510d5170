//! # concierge-core
//!
//! Deterministic building blocks of the Concierge support pipeline.
//!
//! This crate never calls a model. It owns:
//! - the request data model and routing decisions, including the
//!   confidence-gated escalation rule
//! - the request-scoped, read-once grading result cache
//! - the guardrail monitor that decides when the feature should be withdrawn
//! - the local safety screen applied to rendered responses
//!
//! ## Example
//!
//! ```rust,ignore
//! use concierge_core::{RoutingDecision, QueryCategory};
//!
//! let decision = RoutingDecision::from_classifier_output(
//!     r#"{"query_type": "policy_question", "confidence_score": 0.4}"#,
//! );
//! assert_eq!(decision.category, QueryCategory::ScheduleAgent);
//! assert!(decision.escalation);
//! ```

pub mod cache;
pub mod clock;
pub mod duration;
pub mod guardrail;
pub mod json;
pub mod routing;
pub mod safety;
pub mod types;

pub use cache::ResultCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use guardrail::{
    CheckPath, GuardrailConfig, GuardrailConfigError, GuardrailDecision, GuardrailMetric,
    GuardrailMonitor, GuardrailSample, MetricsSummary, MitigationOutcome, Severity,
};
pub use json::extract_json_object;
pub use routing::{RoutingDecision, RoutingParseError, ESCALATION_CONFIDENCE_THRESHOLD};
pub use safety::{PatternSafetyFilter, SafetyCategory, SafetyVerdict};
pub use types::{
    AgentOutput, EvaluationResult, EvaluationStatus, GradingReport, MetricScore, QueryCategory,
    Request, RequestContext, RequestId, RetrievedDocument, SpecialistId, TokenUsage,
    ACCURACY_PASS_THRESHOLD, COHERENCE_PASS_THRESHOLD,
};
