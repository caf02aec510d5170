//! Retry with exponential backoff for transient provider failures.

use backon::{ExponentialBuilder, Retryable};
use std::time::Duration;

use super::{ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError};
use crate::config::RetryConfig;

/// Run a completion, retrying transient failures.
///
/// Each attempt is bounded by `config.timeout`. Permanent failures
/// (authentication, bad request, content filtering) return immediately.
pub async fn complete_with_retry(
    provider: &dyn LlmProvider,
    messages: &[ChatMessage],
    config: &CompletionConfig,
    retry: &RetryConfig,
) -> Result<CompletionResponse, ProviderError> {
    let backoff = ExponentialBuilder::default()
        .with_min_delay(retry.min_delay)
        .with_max_delay(retry.max_delay)
        .with_max_times(retry.max_retries);

    let attempt = || async {
        match tokio::time::timeout(config.timeout, provider.complete(messages.to_vec(), config)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(config.timeout)),
        }
    };

    attempt
        .retry(backoff)
        .sleep(tokio::time::sleep)
        .when(ProviderError::is_transient)
        .notify(|err: &ProviderError, delay: Duration| {
            tracing::warn!(
                provider = provider.name(),
                model = %config.model,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "Transient provider failure, retrying"
            );
        })
        .await
}
