//! Token usage accounting across the stages of one request.

use serde::{Deserialize, Serialize};

use crate::providers::TokenUsage;

/// Accumulated model usage for a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub total_tokens: u32,

    /// Prompt/input tokens
    pub prompt_tokens: u32,

    /// Completion/output tokens
    pub completion_tokens: u32,

    /// Number of model calls that reported usage
    pub llm_calls: u32,

    /// Estimated cost in USD
    pub estimated_cost: f64,

    /// Calls that read from the provider-side prompt cache
    pub cache_hits: u32,

    pub cache_creation_tokens: u32,

    pub cache_read_tokens: u32,
}

impl LlmUsage {
    /// Add token usage from one model call.
    pub fn add(&mut self, usage: &TokenUsage, model: &str) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(usage.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(usage.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(usage.total());
        self.llm_calls = self.llm_calls.saturating_add(1);
        self.cache_creation_tokens = self.cache_creation_tokens.saturating_add(usage.cache_creation_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(usage.cache_read_tokens);

        if usage.cache_read_tokens > 0 {
            self.cache_hits = self.cache_hits.saturating_add(1);
        }

        self.estimated_cost += estimate_cost(usage, model);
    }

    /// Fold another request-stage total into this one.
    pub fn merge(&mut self, other: &LlmUsage) {
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.llm_calls = self.llm_calls.saturating_add(other.llm_calls);
        self.estimated_cost += other.estimated_cost;
        self.cache_hits = self.cache_hits.saturating_add(other.cache_hits);
        self.cache_creation_tokens = self.cache_creation_tokens.saturating_add(other.cache_creation_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(other.cache_read_tokens);
    }
}

/// Estimated USD cost of one call, by model family.
pub fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
    // Per million tokens: input, output, cache write, cache read
    let (input_rate, output_rate, cache_write_rate, cache_read_rate) = match model {
        m if m.contains("sonnet-4-5") => (3.0, 15.0, 3.75, 0.3),
        m if m.contains("opus-4-5") => (5.0, 25.0, 6.25, 0.5),
        m if m.contains("haiku-4-5") => (1.0, 5.0, 1.25, 0.1),
        m if m.contains("gpt-4o-mini") => (0.15, 0.6, 0.0, 0.0),
        m if m.contains("gpt-4o") => (2.5, 10.0, 0.0, 0.0),
        _ => (3.0, 15.0, 3.75, 0.3),
    };

    let per_million = |tokens: u32, rate: f64| (tokens as f64 / 1_000_000.0) * rate;

    per_million(usage.prompt_tokens, input_rate)
        + per_million(usage.completion_tokens, output_rate)
        + per_million(usage.cache_creation_tokens, cache_write_rate)
        + per_million(usage.cache_read_tokens, cache_read_rate)
}
