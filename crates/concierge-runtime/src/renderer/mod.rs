//! Response rendering.
//!
//! Rewrites a specialist's answer into the house voice. Output that a
//! safety check intercepts walks down a fixed ladder of fallback tiers,
//! each tried at most once, ending in a fixed apology.

mod fallback;

use std::sync::Arc;
use std::time::Instant;

use concierge_core::{
    AgentOutput, PatternSafetyFilter, QueryCategory, RequestContext, RequestId, SafetyVerdict,
};

pub use fallback::{
    AttemptResult, Exhaustion, RenderAttempt, RenderTier, APOLOGY_TEXT, SAFE_DEFAULT_MODEL,
};

use crate::config::{RetryConfig, RuntimeConfig, StageConfig, RENDER_FALLBACK_FLAG};
use crate::grading::{GradingJob, GradingPipeline};
use crate::prompts;
use crate::providers::{complete_with_retry, ChatMessage, CompletionConfig, LlmProvider, ProviderError};
use crate::usage::LlmUsage;

/// Everything the renderer needs about one request.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub request_id: RequestId,
    pub query: &'a str,
    pub category: Option<QueryCategory>,
    pub output: &'a AgentOutput,
    pub context: &'a RequestContext,
}

/// The rendered text and how it was obtained.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub text: String,

    /// Tier that produced `text`
    pub tier: RenderTier,

    /// Every tier tried, in order
    pub attempts: Vec<RenderAttempt>,

    pub usage: LlmUsage,

    pub grading_scheduled: bool,
}

pub struct Renderer {
    provider: Arc<dyn LlmProvider>,
    stage: StageConfig,
    retry: RetryConfig,
    filter: PatternSafetyFilter,
    grading: Option<GradingPipeline>,
}

impl Renderer {
    pub fn new(provider: Arc<dyn LlmProvider>, stage: StageConfig, retry: RetryConfig) -> Self {
        Self {
            provider,
            stage,
            retry,
            filter: PatternSafetyFilter::default(),
            grading: None,
        }
    }

    pub fn from_config(provider: Arc<dyn LlmProvider>, config: &RuntimeConfig) -> Self {
        Self::new(provider, config.stages.render.clone(), config.retry.clone())
            .with_filter(PatternSafetyFilter::new(config.safety.categories.clone()))
    }

    pub fn with_filter(mut self, filter: PatternSafetyFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Grade every model-rendered response through `grading`.
    pub fn with_grading(mut self, grading: GradingPipeline) -> Self {
        self.grading = Some(grading);
        self
    }

    /// Render a specialist answer. Never fails.
    pub async fn render(&self, request: &RenderRequest<'_>) -> RenderOutcome {
        let started = Instant::now();
        let customer_name = request.context.get_str("name").unwrap_or("there");
        let message = prompts::render_user_message(
            customer_name,
            request.query,
            request.category,
            &request.output.text,
        );

        let mut attempts = Vec::with_capacity(RenderTier::LADDER.len() + 1);
        let mut usage = LlmUsage::default();

        for (i, tier) in RenderTier::LADDER.into_iter().enumerate() {
            match self.attempt(tier, &message, request.context, &mut usage).await {
                Ok(text) => {
                    attempts.push(RenderAttempt::succeeded(tier));
                    if tier != RenderTier::Primary {
                        tracing::info!(request_id = %request.request_id, tier = %tier, "Render recovered on fallback tier");
                    }
                    return self.finish(request, text, tier, attempts, usage, started);
                }
                Err(why) => {
                    let next = RenderTier::LADDER
                        .get(i + 1)
                        .copied()
                        .unwrap_or(RenderTier::Apology);
                    tracing::warn!(
                        request_id = %request.request_id,
                        tier = %tier,
                        next = %next,
                        reason = %why,
                        "Render tier exhausted"
                    );
                    attempts.push(RenderAttempt::exhausted(tier, why));
                }
            }
        }

        tracing::error!(
            request_id = %request.request_id,
            attempts = attempts.len(),
            "All render tiers exhausted, returning apology"
        );
        attempts.push(RenderAttempt::succeeded(RenderTier::Apology));
        self.finish(
            request,
            APOLOGY_TEXT.to_string(),
            RenderTier::Apology,
            attempts,
            usage,
            started,
        )
    }

    /// System prompt and completion settings for a model-backed tier.
    fn tier_call(&self, tier: RenderTier, context: &RequestContext) -> Option<(&'static str, CompletionConfig)> {
        match tier {
            RenderTier::Primary => Some((
                prompts::RENDER_SYSTEM_PROMPT,
                self.stage.completion_for(context),
            )),
            RenderTier::FallbackContext => {
                let flagged = context.clone().with(RENDER_FALLBACK_FLAG, true);
                Some((
                    prompts::RENDER_SYSTEM_PROMPT,
                    self.stage.completion_for(&flagged),
                ))
            }
            RenderTier::SafeDefault => Some((
                prompts::SAFE_DEFAULT_SYSTEM_PROMPT,
                CompletionConfig {
                    model: SAFE_DEFAULT_MODEL.to_string(),
                    max_tokens: self.stage.max_tokens,
                    temperature: 0.0,
                    timeout: self.stage.timeout,
                },
            )),
            RenderTier::Apology => None,
        }
    }

    async fn attempt(
        &self,
        tier: RenderTier,
        message: &str,
        context: &RequestContext,
        usage: &mut LlmUsage,
    ) -> Result<String, Exhaustion> {
        let Some((system_prompt, config)) = self.tier_call(tier, context) else {
            return Err(Exhaustion::Empty);
        };
        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(message),
        ];

        let response = match complete_with_retry(self.provider.as_ref(), &messages, &config, &self.retry).await {
            Ok(response) => response,
            Err(ProviderError::ContentFiltered(reason)) => {
                return Err(Exhaustion::Intercepted { reason })
            }
            Err(e) => {
                return Err(Exhaustion::Failed {
                    error: e.to_string(),
                })
            }
        };
        usage.add(&response.usage, &response.model);

        if response.content.trim().is_empty() {
            return Err(Exhaustion::Empty);
        }
        match self.filter.check(&response.content) {
            SafetyVerdict::Clear => Ok(response.content),
            SafetyVerdict::Intercepted { reason, .. } => Err(Exhaustion::Intercepted { reason }),
        }
    }

    fn finish(
        &self,
        request: &RenderRequest<'_>,
        text: String,
        tier: RenderTier,
        attempts: Vec<RenderAttempt>,
        usage: LlmUsage,
        started: Instant,
    ) -> RenderOutcome {
        let grading_scheduled = match (&self.grading, tier.is_model_backed()) {
            (Some(grading), true) => {
                let render_ms = started.elapsed().as_millis() as u64;
                let job = GradingJob::new(
                    request.request_id,
                    request.query,
                    request.output.documents.clone(),
                    text.clone(),
                )
                .with_context(request.context.clone())
                .with_response_time_ms(request.output.latency_ms + render_ms);
                grading.schedule(job)
            }
            _ => false,
        };

        RenderOutcome {
            text,
            tier,
            attempts,
            usage,
            grading_scheduled,
        }
    }
}
