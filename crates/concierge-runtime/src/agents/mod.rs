//! Specialist dispatch.
//!
//! The routing topology is fixed: one specialist per category. Policy and
//! provider specialists consult the knowledge base; scheduling does not.

mod common;
mod policy;
mod provider;
mod scheduling;
mod traits;

use std::sync::Arc;

use concierge_core::{Clock, QueryCategory, SpecialistId};

pub use common::{Generation, KnowledgeBase};
pub use policy::PolicySpecialist;
pub use provider::ProviderSpecialist;
pub use scheduling::{available_slots, CallbackSlot, SchedulingSpecialist, ESCALATION_NOTE};
pub use traits::{AgentError, Specialist, SpecialistRequest};

use crate::cache::RetrievalCache;
use crate::config::{RuntimeConfig, StageConfig};
use crate::providers::LlmProvider;
use crate::retrieval::Retriever;

/// Fixed mapping from category to specialist.
#[derive(Clone)]
pub struct DispatchTable {
    policy: Arc<dyn Specialist>,
    provider: Arc<dyn Specialist>,
    scheduling: Arc<dyn Specialist>,
}

impl DispatchTable {
    pub fn new(
        policy: Arc<dyn Specialist>,
        provider: Arc<dyn Specialist>,
        scheduling: Arc<dyn Specialist>,
    ) -> Self {
        Self {
            policy,
            provider,
            scheduling,
        }
    }

    /// The standard specialists over one provider and one retriever.
    pub fn standard(
        llm: Arc<dyn LlmProvider>,
        retriever: Arc<dyn Retriever>,
        config: &RuntimeConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Arc::new(RetrievalCache::from_config(&config.retrieval));
        let knowledge = KnowledgeBase::new(retriever, cache, config.retrieval.top_k);
        let generation = |stage: &StageConfig| {
            Generation::new(llm.clone(), stage.clone(), config.retry.clone())
        };

        Self::new(
            Arc::new(PolicySpecialist::new(
                generation(&config.stages.policy),
                knowledge.clone(),
            )),
            Arc::new(ProviderSpecialist::new(
                generation(&config.stages.provider),
                knowledge,
            )),
            Arc::new(SchedulingSpecialist::new(
                generation(&config.stages.scheduling),
                config.scheduling.clone(),
                clock,
            )),
        )
    }

    pub fn get(&self, id: SpecialistId) -> &Arc<dyn Specialist> {
        match id {
            SpecialistId::Policy => &self.policy,
            SpecialistId::Provider => &self.provider,
            SpecialistId::Scheduling => &self.scheduling,
        }
    }

    pub fn for_category(&self, category: QueryCategory) -> &Arc<dyn Specialist> {
        self.get(category.specialist())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ChatMessage, CompletionConfig, CompletionResponse, ProviderError};
    use crate::retrieval::{RetrievalError, RetrievalFilters};
    use async_trait::async_trait;
    use concierge_core::{
        AgentOutput, ManualClock, RequestContext, RequestId, RetrievedDocument, TokenUsage,
    };
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Named(SpecialistId);

    #[async_trait]
    impl Specialist for Named {
        fn id(&self) -> SpecialistId {
            self.0
        }

        async fn handle(&self, _request: &SpecialistRequest<'_>) -> Result<AgentOutput, AgentError> {
            Ok(AgentOutput {
                specialist: self.0,
                text: String::new(),
                usage: TokenUsage::default(),
                latency_ms: 0,
                model: "none".to_string(),
                documents: Vec::new(),
            })
        }
    }

    /// Echoes nothing useful but remembers the last user message.
    #[derive(Default)]
    struct RecordingProvider {
        last_user: Mutex<String>,
    }

    #[async_trait]
    impl LlmProvider for RecordingProvider {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            if let Some(user) = messages.iter().find(|m| m.role == "user") {
                *self.last_user.lock() = user.content.clone();
            }
            Ok(CompletionResponse {
                content: "specialist answer".to_string(),
                usage: TokenUsage::new(200, 50),
                model: config.model.clone(),
            })
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct FixedRetriever {
        result: Result<Vec<RetrievedDocument>, RetrievalError>,
        calls: AtomicU32,
    }

    impl FixedRetriever {
        fn new(result: Result<Vec<RetrievedDocument>, RetrievalError>) -> Self {
            Self {
                result,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn retrieve(
            &self,
            _query: &str,
            _filters: &RetrievalFilters,
            _top_k: usize,
        ) -> Result<Vec<RetrievedDocument>, RetrievalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn standard_table(
        retriever: Arc<FixedRetriever>,
    ) -> (DispatchTable, Arc<RecordingProvider>) {
        let llm = Arc::new(RecordingProvider::default());
        let mut config = RuntimeConfig::default();
        config.retry = crate::config::RetryConfig::disabled();
        let table = DispatchTable::standard(
            llm.clone(),
            retriever,
            &config,
            Arc::new(ManualClock::default()),
        );
        (table, llm)
    }

    fn request<'a>(query: &'a str, context: &'a RequestContext, escalated: bool) -> SpecialistRequest<'a> {
        SpecialistRequest {
            request_id: RequestId::new(),
            query,
            context,
            escalated,
        }
    }

    #[tokio::test]
    async fn test_policy_carries_documents_and_caches_retrieval() {
        let docs = vec![RetrievedDocument::new("Specialist copay: $40", 0.88)];
        let retriever = Arc::new(FixedRetriever::new(Ok(docs.clone())));
        let (table, llm) = standard_table(retriever.clone());
        let context = RequestContext::new().with("policy_id", "TH-PPO-7");

        let specialist = table.get(SpecialistId::Policy);
        let output = specialist
            .handle(&request("What is my specialist copay?", &context, false))
            .await
            .unwrap();
        assert_eq!(output.specialist, SpecialistId::Policy);
        assert_eq!(output.documents, docs);
        assert_eq!(output.model, "claude-sonnet-4-5");
        assert!(llm.last_user.lock().contains("Specialist copay: $40"));

        specialist
            .handle(&request("What is my specialist copay?", &context, false))
            .await
            .unwrap();
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retrieval_error_treated_as_not_found() {
        let retriever = Arc::new(FixedRetriever::new(Err(RetrievalError::Unavailable(
            "index offline".to_string(),
        ))));
        let (table, llm) = standard_table(retriever);
        let context = RequestContext::new();

        let output = table
            .get(SpecialistId::Provider)
            .handle(&request("Find a dermatologist", &context, false))
            .await
            .unwrap();
        assert!(output.documents.is_empty());
        assert!(llm.last_user.lock().contains(crate::prompts::NOT_FOUND_TEXT));
    }

    #[tokio::test]
    async fn test_scheduling_skips_retrieval_and_notes_escalation() {
        let retriever = Arc::new(FixedRetriever::new(Ok(Vec::new())));
        let (table, llm) = standard_table(retriever.clone());
        let context = RequestContext::new();

        let output = table
            .get(SpecialistId::Scheduling)
            .handle(&request("I need to talk to someone", &context, true))
            .await
            .unwrap();
        assert!(output.text.ends_with(ESCALATION_NOTE));
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 0);
        assert!(llm.last_user.lock().contains("Available Time Slots"));
    }

    #[test]
    fn test_categories_map_to_their_specialist() {
        let table = DispatchTable::new(
            Arc::new(Named(SpecialistId::Policy)),
            Arc::new(Named(SpecialistId::Provider)),
            Arc::new(Named(SpecialistId::Scheduling)),
        );

        assert_eq!(
            table.for_category(QueryCategory::PolicyQuestion).id(),
            SpecialistId::Policy
        );
        assert_eq!(
            table.for_category(QueryCategory::ProviderLookup).id(),
            SpecialistId::Provider
        );
        assert_eq!(
            table.for_category(QueryCategory::ScheduleAgent).id(),
            SpecialistId::Scheduling
        );
    }
}
