//! Classification stage.

use std::sync::Arc;

use concierge_core::{RequestContext, RoutingDecision, TokenUsage};

use crate::config::{RetryConfig, StageConfig};
use crate::prompts;
use crate::providers::{complete_with_retry, ChatMessage, LlmProvider};

/// A routing decision plus what it cost to produce.
#[derive(Debug, Clone)]
pub struct Classification {
    pub decision: RoutingDecision,
    pub usage: TokenUsage,
    /// Model that served the call, if it succeeded
    pub model: Option<String>,
}

/// Sends the triage prompt and turns the answer into a routing decision.
///
/// Never fails: a provider error or unusable output yields the fail-safe
/// decision.
pub struct Classifier {
    provider: Arc<dyn LlmProvider>,
    stage: StageConfig,
    retry: RetryConfig,
}

impl Classifier {
    pub fn new(provider: Arc<dyn LlmProvider>, stage: StageConfig, retry: RetryConfig) -> Self {
        Self {
            provider,
            stage,
            retry,
        }
    }

    pub async fn classify(&self, query: &str, context: &RequestContext) -> Classification {
        let messages = vec![
            ChatMessage::system(prompts::TRIAGE_SYSTEM_PROMPT),
            ChatMessage::user(prompts::triage_user_message(context, query)),
        ];
        let config = self.stage.completion_for(context);

        match complete_with_retry(self.provider.as_ref(), &messages, &config, &self.retry).await {
            Ok(response) => Classification {
                decision: RoutingDecision::from_classifier_output(&response.content),
                usage: response.usage,
                model: Some(response.model),
            },
            Err(e) => {
                tracing::warn!(
                    provider = self.provider.name(),
                    error = %e,
                    "Classification call failed, routing to live agent"
                );
                Classification {
                    decision: RoutingDecision::fail_safe(e.to_string()),
                    usage: TokenUsage::default(),
                    model: None,
                }
            }
        }
    }
}
