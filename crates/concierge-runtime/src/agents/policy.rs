//! Policy specialist: coverage, benefits and claims questions.

use async_trait::async_trait;

use concierge_core::{AgentOutput, SpecialistId};

use super::common::{Generation, KnowledgeBase};
use super::traits::{AgentError, Specialist, SpecialistRequest};
use crate::prompts;
use crate::retrieval::RetrievalFilters;

pub struct PolicySpecialist {
    generation: Generation,
    knowledge: KnowledgeBase,
}

impl PolicySpecialist {
    pub fn new(generation: Generation, knowledge: KnowledgeBase) -> Self {
        Self {
            generation,
            knowledge,
        }
    }

    /// Retrieval query, scoped to the policy when one is known.
    fn retrieval_query(query: &str, policy_id: Option<&str>) -> String {
        match policy_id {
            Some(id) => format!("Policy {}: {}", id, query),
            None => query.to_string(),
        }
    }
}

#[async_trait]
impl Specialist for PolicySpecialist {
    fn id(&self) -> SpecialistId {
        SpecialistId::Policy
    }

    async fn handle(&self, request: &SpecialistRequest<'_>) -> Result<AgentOutput, AgentError> {
        let policy_id = request.context.get_str("policy_id");
        let filters = RetrievalFilters::new().with_opt("policy_id", policy_id);
        let search = Self::retrieval_query(request.query, policy_id);

        let documents = self.knowledge.lookup(self.id(), &search, &filters).await;
        tracing::debug!(
            request_id = %request.request_id,
            documents = documents.len(),
            "Policy documents retrieved"
        );

        let message = prompts::specialist_user_message(
            request.context,
            "Policy Information",
            &prompts::format_knowledge(&documents),
            request.query,
        );

        self.generation
            .answer(
                self.id(),
                prompts::POLICY_SYSTEM_PROMPT,
                message,
                request.context,
                documents,
            )
            .await
    }
}
