//! Grading of a rendered response.
//!
//! Two independent grading calls run concurrently: accuracy against the
//! reference documents and coherence of the text alone. A failure in one
//! sub-call only zeroes that metric.

mod parser;

use std::sync::Arc;
use thiserror::Error;

use concierge_core::{
    EvaluationResult, MetricScore, RequestContext, RetrievedDocument, TokenUsage,
    ACCURACY_PASS_THRESHOLD, COHERENCE_PASS_THRESHOLD,
};

pub use parser::{parse_grade, GradeParseError};

use crate::config::{RetryConfig, RuntimeConfig, StageConfig};
use crate::prompts;
use crate::providers::{complete_with_retry, ChatMessage, CompletionResponse, LlmProvider, ProviderError};

/// Errors from the judge.
#[derive(Error, Debug, Clone)]
pub enum JudgeError {
    #[error("All grading calls failed (accuracy: {accuracy}; coherence: {coherence})")]
    AllSubcallsFailed { accuracy: String, coherence: String },
}

/// Model-backed grader.
pub struct Judge {
    provider: Arc<dyn LlmProvider>,
    accuracy: StageConfig,
    coherence: StageConfig,
    retry: RetryConfig,
}

impl Judge {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        accuracy: StageConfig,
        coherence: StageConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            provider,
            accuracy,
            coherence,
            retry,
        }
    }

    pub fn from_config(provider: Arc<dyn LlmProvider>, config: &RuntimeConfig) -> Self {
        Self::new(
            provider,
            config.stages.judge_accuracy.clone(),
            config.stages.judge_coherence.clone(),
            config.retry.clone(),
        )
    }

    /// Grade `output` for the question `query`.
    ///
    /// Returns `Err` only when neither sub-call reached the grader.
    pub async fn evaluate(
        &self,
        query: &str,
        documents: &[RetrievedDocument],
        output: &str,
        context: &RequestContext,
    ) -> Result<EvaluationResult, JudgeError> {
        let references = prompts::format_reference_documents(documents);
        let accuracy_message = prompts::judge_accuracy_user_message(query, &references, output);
        let coherence_message = prompts::judge_coherence_user_message(output);

        let (accuracy, coherence) = tokio::join!(
            self.call(
                &self.accuracy,
                prompts::JUDGE_ACCURACY_SYSTEM_PROMPT,
                accuracy_message,
                context
            ),
            self.call(
                &self.coherence,
                prompts::JUDGE_COHERENCE_SYSTEM_PROMPT,
                coherence_message,
                context
            ),
        );

        if let (Err(a), Err(c)) = (&accuracy, &coherence) {
            tracing::warn!(
                provider = self.provider.name(),
                accuracy_error = %a,
                coherence_error = %c,
                "Both grading calls failed"
            );
            return Err(JudgeError::AllSubcallsFailed {
                accuracy: a.to_string(),
                coherence: c.to_string(),
            });
        }

        // Judge model: whichever sub-call answered, accuracy first
        let judge_model = match (&accuracy, &coherence) {
            (Ok(r), _) | (Err(_), Ok(r)) => r.model.clone(),
            (Err(_), Err(_)) => self.accuracy.model.clone(),
        };

        let mut usage = TokenUsage::default();
        let accuracy = grade("accuracy", accuracy, ACCURACY_PASS_THRESHOLD, &mut usage);
        let coherence = grade("coherence", coherence, COHERENCE_PASS_THRESHOLD, &mut usage);

        Ok(EvaluationResult::new(accuracy, coherence, judge_model, usage))
    }

    async fn call(
        &self,
        stage: &StageConfig,
        system_prompt: &str,
        user_message: String,
        context: &RequestContext,
    ) -> Result<CompletionResponse, ProviderError> {
        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_message),
        ];
        let config = stage.completion_for(context);
        complete_with_retry(self.provider.as_ref(), &messages, &config, &self.retry).await
    }
}

fn grade(
    metric: &'static str,
    response: Result<CompletionResponse, ProviderError>,
    threshold: f64,
    usage: &mut TokenUsage,
) -> MetricScore {
    match response {
        Ok(response) => {
            *usage = usage.combined(&response.usage);
            match parse_grade(&response.content, threshold) {
                Ok(score) => score,
                Err(e) => {
                    tracing::warn!(metric, error = %e, "Grader output unparseable, scoring zero");
                    MetricScore::failed(format!("Parse error: {}", e))
                }
            }
        }
        Err(e) => {
            tracing::warn!(metric, error = %e, "Grading call failed, scoring zero");
            MetricScore::failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::CompletionConfig;
    use async_trait::async_trait;

    /// Answers by system prompt so each sub-call can be scripted.
    struct GraderProvider {
        accuracy: Result<String, ProviderError>,
        coherence: Result<String, ProviderError>,
    }

    #[async_trait]
    impl LlmProvider for GraderProvider {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            let reply = if messages[0].content == prompts::JUDGE_ACCURACY_SYSTEM_PROMPT {
                &self.accuracy
            } else {
                &self.coherence
            };
            reply.clone().map(|content| CompletionResponse {
                content,
                usage: TokenUsage::new(300, 40),
                model: config.model.clone(),
            })
        }

        fn name(&self) -> &str {
            "grader"
        }
    }

    fn judge(
        accuracy: Result<&str, ProviderError>,
        coherence: Result<&str, ProviderError>,
    ) -> Judge {
        let provider = GraderProvider {
            accuracy: accuracy.map(str::to_string),
            coherence: coherence.map(str::to_string),
        };
        let mut config = RuntimeConfig::default();
        config.retry = RetryConfig::disabled();
        Judge::from_config(Arc::new(provider), &config)
    }

    fn docs() -> Vec<RetrievedDocument> {
        vec![RetrievedDocument::new("Specialist copay is $40.", 0.92)]
    }

    #[tokio::test]
    async fn test_both_metrics_pass() {
        let judge = judge(
            Ok(r#"{"score": 0.9, "reasoning": "accurate"}"#),
            Ok(r#"{"score": 0.8, "reasoning": "clear"}"#),
        );
        let result = judge
            .evaluate("copay?", &docs(), "Your copay is $40.", &RequestContext::new())
            .await
            .unwrap();

        assert!(result.accuracy.passed);
        assert!(result.coherence.passed);
        assert!(result.overall_passed);
        assert_eq!(result.judge_model, "claude-sonnet-4-5");
        assert_eq!(result.usage.total(), 680);
    }

    #[tokio::test]
    async fn test_accuracy_parse_failure_keeps_coherence() {
        let judge = judge(
            Ok("I think it is mostly right."),
            Ok(r#"{"score": 0.75, "reasoning": "well structured"}"#),
        );
        let result = judge
            .evaluate("copay?", &docs(), "Your copay is $40.", &RequestContext::new())
            .await
            .unwrap();

        assert!(!result.accuracy.passed);
        assert_eq!(result.accuracy.score, 0.0);
        assert!(result.accuracy.reasoning.starts_with("Parse error"));
        assert_eq!(result.coherence.score, 0.75);
        assert!(result.coherence.passed);
        assert!(!result.overall_passed);
    }

    #[tokio::test]
    async fn test_one_transport_failure_scores_zero() {
        let judge = judge(
            Ok(r#"{"score": 0.95}"#),
            Err(ProviderError::AuthError),
        );
        let result = judge
            .evaluate("copay?", &docs(), "Your copay is $40.", &RequestContext::new())
            .await
            .unwrap();

        assert!(result.accuracy.passed);
        assert_eq!(result.coherence.score, 0.0);
        assert_eq!(result.coherence.reasoning, "Authentication failed");
        assert_eq!(result.usage.total(), 340);
    }

    #[tokio::test]
    async fn test_both_transport_failures_is_error() {
        let judge = judge(
            Err(ProviderError::HttpError("connection refused".to_string())),
            Err(ProviderError::HttpError("connection refused".to_string())),
        );
        let err = judge
            .evaluate("copay?", &[], "Your copay is $40.", &RequestContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeError::AllSubcallsFailed { .. }));
    }
}
