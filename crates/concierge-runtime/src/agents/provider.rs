//! Provider specialist: in-network doctor and facility lookup.

use async_trait::async_trait;

use concierge_core::{AgentOutput, RequestContext, SpecialistId};

use super::common::{Generation, KnowledgeBase};
use super::traits::{AgentError, Specialist, SpecialistRequest};
use crate::prompts;
use crate::retrieval::RetrievalFilters;

const FILTER_KEYS: [&str; 3] = ["specialty", "location", "network"];

pub struct ProviderSpecialist {
    generation: Generation,
    knowledge: KnowledgeBase,
}

impl ProviderSpecialist {
    pub fn new(generation: Generation, knowledge: KnowledgeBase) -> Self {
        Self {
            generation,
            knowledge,
        }
    }

    fn filters(context: &RequestContext) -> RetrievalFilters {
        FILTER_KEYS
            .iter()
            .fold(RetrievalFilters::new(), |filters, key| {
                filters.with_opt(*key, context.get_str(key))
            })
    }

    /// Query with the specialty and location spelled out.
    fn retrieval_query(query: &str, filters: &RetrievalFilters) -> String {
        let qualifiers: Vec<String> = ["specialty", "location"]
            .iter()
            .filter_map(|key| filters.get(key).map(|v| format!("{}: {}", key, v)))
            .collect();

        if qualifiers.is_empty() {
            query.to_string()
        } else {
            format!("{} ({})", query, qualifiers.join(", "))
        }
    }
}

#[async_trait]
impl Specialist for ProviderSpecialist {
    fn id(&self) -> SpecialistId {
        SpecialistId::Provider
    }

    async fn handle(&self, request: &SpecialistRequest<'_>) -> Result<AgentOutput, AgentError> {
        let filters = Self::filters(request.context);
        let search = Self::retrieval_query(request.query, &filters);

        let documents = self.knowledge.lookup(self.id(), &search, &filters).await;
        tracing::debug!(
            request_id = %request.request_id,
            documents = documents.len(),
            "Provider records retrieved"
        );

        let message = prompts::specialist_user_message(
            request.context,
            "Provider Records",
            &prompts::format_knowledge(&documents),
            request.query,
        );

        self.generation
            .answer(
                self.id(),
                prompts::PROVIDER_SYSTEM_PROMPT,
                message,
                request.context,
                documents,
            )
            .await
    }
}
