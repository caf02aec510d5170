//! Plumbing shared by the specialists.

use std::sync::Arc;
use std::time::Instant;

use concierge_core::{AgentOutput, RequestContext, RetrievedDocument, SpecialistId};

use super::traits::AgentError;
use crate::cache::{RetrievalCache, RetrievalKey};
use crate::config::{RetryConfig, StageConfig};
use crate::providers::{complete_with_retry, ChatMessage, LlmProvider};
use crate::retrieval::{RetrievalFilters, Retriever};

/// Generation settings for one specialist.
#[derive(Clone)]
pub struct Generation {
    pub provider: Arc<dyn LlmProvider>,
    pub stage: StageConfig,
    pub retry: RetryConfig,
}

impl Generation {
    pub fn new(provider: Arc<dyn LlmProvider>, stage: StageConfig, retry: RetryConfig) -> Self {
        Self {
            provider,
            stage,
            retry,
        }
    }

    /// Call the model and package the answer as an [`AgentOutput`].
    pub async fn answer(
        &self,
        specialist: SpecialistId,
        system_prompt: &str,
        user_message: String,
        context: &RequestContext,
        documents: Vec<RetrievedDocument>,
    ) -> Result<AgentOutput, AgentError> {
        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_message),
        ];
        let config = self.stage.completion_for(context);

        let started = Instant::now();
        let response =
            complete_with_retry(self.provider.as_ref(), &messages, &config, &self.retry).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        Ok(AgentOutput {
            specialist,
            text: response.content,
            usage: response.usage,
            latency_ms,
            model: response.model,
            documents,
        })
    }
}

/// Retrieval with memoisation.
#[derive(Clone)]
pub struct KnowledgeBase {
    pub retriever: Arc<dyn Retriever>,
    pub cache: Arc<RetrievalCache>,
    pub top_k: usize,
}

impl KnowledgeBase {
    pub fn new(retriever: Arc<dyn Retriever>, cache: Arc<RetrievalCache>, top_k: usize) -> Self {
        Self {
            retriever,
            cache,
            top_k,
        }
    }

    /// Fetch passages for a query. A retrieval error is logged and treated
    /// as an empty result.
    pub async fn lookup(
        &self,
        specialist: SpecialistId,
        query: &str,
        filters: &RetrievalFilters,
    ) -> Vec<RetrievedDocument> {
        let key = RetrievalKey::new(specialist, query, filters);
        if let Some(documents) = self.cache.get(&key).await {
            tracing::debug!(specialist = %specialist, hits = documents.len(), "Retrieval cache hit");
            return documents;
        }

        match self.retriever.retrieve(query, filters, self.top_k).await {
            Ok(documents) => {
                self.cache.insert(key, documents.clone()).await;
                documents
            }
            Err(e) => {
                tracing::warn!(
                    specialist = %specialist,
                    retriever = self.retriever.name(),
                    error = %e,
                    "Retrieval failed, continuing without reference documents"
                );
                Vec::new()
            }
        }
    }
}
