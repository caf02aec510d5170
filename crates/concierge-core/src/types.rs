//! Core data model shared by every stage of the pipeline.
//!
//! These types carry no behaviour beyond construction helpers. They are
//! produced by one stage and read (never mutated) by the stages after it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::guardrail::MitigationOutcome;

/// Score an accuracy grade must reach to pass.
pub const ACCURACY_PASS_THRESHOLD: f64 = 0.8;

/// Score a coherence grade must reach to pass.
pub const COHERENCE_PASS_THRESHOLD: f64 = 0.7;

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Attribute mapping attached to a request.
///
/// Used for personalization and for configuration targeting. Keys are kept
/// ordered so prompts built from the context are reproducible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestContext(BTreeMap<String, JsonValue>);

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    /// String value for `key`, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(JsonValue::as_str)
    }

    /// True when `key` holds the boolean `true`.
    pub fn is_flagged(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(JsonValue::Bool(true)))
    }

    /// Merge extracted fields into this context. Incoming keys win.
    pub fn merge(&mut self, extracted: &Map<String, JsonValue>) {
        for (key, value) in extracted {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.0.iter()
    }

    /// Pretty JSON rendering for prompt templates.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

impl FromIterator<(String, JsonValue)> for RequestContext {
    fn from_iter<I: IntoIterator<Item = (String, JsonValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A customer query entering the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,

    /// Raw user text
    pub query: String,

    /// Targeting and personalization attributes
    pub context: RequestContext,

    pub created_at: DateTime<Utc>,
}

impl Request {
    pub fn new(
        query: impl Into<String>,
        context: RequestContext,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RequestId::new(),
            query: query.into(),
            context,
            created_at,
        }
    }
}

/// Category assigned by classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryCategory {
    PolicyQuestion,
    ProviderLookup,
    ScheduleAgent,
}

impl QueryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryCategory::PolicyQuestion => "policy_question",
            QueryCategory::ProviderLookup => "provider_lookup",
            QueryCategory::ScheduleAgent => "schedule_agent",
        }
    }

    /// The specialist that handles this category.
    pub fn specialist(&self) -> SpecialistId {
        match self {
            QueryCategory::PolicyQuestion => SpecialistId::Policy,
            QueryCategory::ProviderLookup => SpecialistId::Provider,
            QueryCategory::ScheduleAgent => SpecialistId::Scheduling,
        }
    }
}

impl fmt::Display for QueryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed set of domain specialists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistId {
    Policy,
    Provider,
    Scheduling,
}

impl SpecialistId {
    pub const ALL: [SpecialistId; 3] = [
        SpecialistId::Policy,
        SpecialistId::Provider,
        SpecialistId::Scheduling,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialistId::Policy => "policy",
            SpecialistId::Provider => "provider",
            SpecialistId::Scheduling => "scheduling",
        }
    }
}

impl fmt::Display for SpecialistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpecialistId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "policy" | "policy_specialist" | "policy_agent" => Ok(SpecialistId::Policy),
            "provider" | "provider_specialist" | "provider_agent" => Ok(SpecialistId::Provider),
            "scheduling" | "scheduler" | "scheduler_specialist" | "scheduler_agent" => {
                Ok(SpecialistId::Scheduling)
            }
            other => Err(format!("unknown specialist: '{}'", other)),
        }
    }
}

/// Token usage reported by a model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,

    /// Tokens in the completion
    pub completion_tokens: u32,

    /// Tokens read from a provider-side prompt cache
    #[serde(default)]
    pub cache_read_tokens: u32,

    /// Tokens written to a provider-side prompt cache
    #[serde(default)]
    pub cache_creation_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            ..Default::default()
        }
    }

    /// Total tokens used.
    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }

    /// Sum of two usage records, saturating at `u32::MAX`.
    pub fn combined(&self, other: &TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens.saturating_add(other.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_add(other.completion_tokens),
            cache_read_tokens: self.cache_read_tokens.saturating_add(other.cache_read_tokens),
            cache_creation_tokens: self
                .cache_creation_tokens
                .saturating_add(other.cache_creation_tokens),
        }
    }
}

/// A reference passage returned by retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub content: String,
    pub relevance_score: f64,
}

impl RetrievedDocument {
    pub fn new(content: impl Into<String>, relevance_score: f64) -> Self {
        Self {
            content: content.into(),
            relevance_score,
        }
    }
}

/// What a specialist produced for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    pub specialist: SpecialistId,

    /// Raw response text, before rendering
    pub text: String,

    pub usage: TokenUsage,

    /// Wall time spent in the generation call
    pub latency_ms: u64,

    /// Model identifier reported by the generation collaborator
    pub model: String,

    /// Reference passages the answer was grounded on
    #[serde(default)]
    pub documents: Vec<RetrievedDocument>,
}

impl AgentOutput {
    /// Number of reference documents the specialist consulted.
    pub fn retrieved_count(&self) -> usize {
        self.documents.len()
    }
}

/// Grade for a single metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricScore {
    /// Score in [0, 1]
    pub score: f64,
    pub passed: bool,
    pub reasoning: String,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl MetricScore {
    /// Build a score, clamping into [0, 1] and applying `threshold`.
    pub fn graded(score: f64, threshold: f64, reasoning: impl Into<String>, issues: Vec<String>) -> Self {
        let score = score.clamp(0.0, 1.0);
        Self {
            score,
            passed: score >= threshold,
            reasoning: reasoning.into(),
            issues,
        }
    }

    /// A zero, failing score for a metric that could not be graded.
    pub fn failed(reasoning: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            passed: false,
            reasoning: reasoning.into(),
            issues: Vec::new(),
        }
    }
}

/// Output of the Judge for one graded response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub accuracy: MetricScore,
    pub coherence: MetricScore,

    /// Logical AND of the per-metric pass flags
    pub overall_passed: bool,

    pub judge_model: String,

    /// Combined usage of both grading calls
    pub usage: TokenUsage,
}

impl EvaluationResult {
    pub fn new(
        accuracy: MetricScore,
        coherence: MetricScore,
        judge_model: impl Into<String>,
        usage: TokenUsage,
    ) -> Self {
        let overall_passed = accuracy.passed && coherence.passed;
        Self {
            accuracy,
            coherence,
            overall_passed,
            judge_model: judge_model.into(),
            usage,
        }
    }
}

/// What lands in the result cache once a grading job finishes.
///
/// Either `evaluation` or `error` is set. A report with an error carries no
/// scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingReport {
    pub request_id: RequestId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// What the guardrail did with this grade
    pub mitigation: MitigationOutcome,

    pub completed_at: DateTime<Utc>,
}

impl GradingReport {
    pub fn graded(
        request_id: RequestId,
        evaluation: EvaluationResult,
        mitigation: MitigationOutcome,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            evaluation: Some(evaluation),
            error: None,
            mitigation,
            completed_at,
        }
    }

    pub fn failed(
        request_id: RequestId,
        error: impl Into<String>,
        mitigation: MitigationOutcome,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            evaluation: None,
            error: Some(error.into()),
            mitigation,
            completed_at,
        }
    }

    pub fn accuracy_score(&self) -> Option<f64> {
        self.evaluation.as_ref().map(|e| e.accuracy.score)
    }

    pub fn coherence_score(&self) -> Option<f64> {
        self.evaluation.as_ref().map(|e| e.coherence.score)
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Status of a request's grading as seen by a poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", content = "report", rename_all = "snake_case")]
pub enum EvaluationStatus {
    /// Never created, or already consumed
    Unknown,
    /// Grading scheduled but not finished
    Pending,
    /// Finished; the entry has been removed by this read
    Ready(GradingReport),
}

impl EvaluationStatus {
    pub fn is_unknown(&self) -> bool {
        matches!(self, EvaluationStatus::Unknown)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, EvaluationStatus::Pending)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, EvaluationStatus::Ready(_))
    }

    pub fn into_report(self) -> Option<GradingReport> {
        match self {
            EvaluationStatus::Ready(report) => Some(report),
            _ => None,
        }
    }
}
