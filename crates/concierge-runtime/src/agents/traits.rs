//! Specialist trait and common types.

use async_trait::async_trait;
use thiserror::Error;

use concierge_core::{AgentOutput, RequestContext, RequestId, SpecialistId};

use crate::providers::ProviderError;

/// Errors from specialists.
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    #[error("Generation failed: {0}")]
    Provider(#[from] ProviderError),
}

/// What a specialist gets to work with.
#[derive(Debug, Clone, Copy)]
pub struct SpecialistRequest<'a> {
    pub request_id: RequestId,
    pub query: &'a str,

    /// Request context after classification merges
    pub context: &'a RequestContext,

    /// Classification asked for a live agent
    pub escalated: bool,
}

/// A domain specialist: `(query, context) -> AgentOutput`.
///
/// Specialists share no mutable state and have no side effects beyond the
/// calls they make.
#[async_trait]
pub trait Specialist: Send + Sync {
    fn id(&self) -> SpecialistId;

    async fn handle(&self, request: &SpecialistRequest<'_>) -> Result<AgentOutput, AgentError>;
}
