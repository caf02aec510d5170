//! Request orchestration.
//!
//! `Start -> Classify -> Dispatch -> [Render] -> End`. Classification runs
//! once, the escalation override is applied before dispatch, and grading is
//! scheduled by the renderer without being awaited.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use concierge_core::{
    AgentOutput, Clock, EvaluationStatus, GuardrailMonitor, Request, RequestContext, RequestId,
    ResultCache, RoutingDecision, SpecialistId, SystemClock,
};

use crate::agents::{DispatchTable, SpecialistRequest};
use crate::classifier::Classifier;
use crate::config::{ConfigError, RuntimeConfig};
use crate::control_plane::{ControlPlane, InMemoryControlPlane, MetricEvent};
use crate::grading::GradingPipeline;
use crate::guardrail::{GuardrailController, GuardrailStatus};
use crate::judge::Judge;
use crate::providers::LlmProvider;
use crate::renderer::{RenderRequest, RenderTier, Renderer};
use crate::retrieval::Retriever;
use crate::usage::LlmUsage;

/// Returned to the customer when the specialist call fails.
pub const DEGRADED_RESPONSE: &str =
    "I'm sorry, I couldn't complete your request right now. Please try again or contact customer support.";

/// Where the pipeline stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "specialist", rename_all = "snake_case")]
pub enum Mode {
    /// Dispatch, render, grade
    Full,

    /// Stop after whichever specialist ran
    Auto,

    /// Stop after dispatch; the dispatched specialist must be this one
    Isolate(SpecialistId),
}

impl Mode {
    pub fn renders(&self) -> bool {
        matches!(self, Mode::Full)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Full => f.write_str("full"),
            Mode::Auto => f.write_str("auto"),
            Mode::Isolate(id) => write!(f, "isolate:{}", id),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    /// `full`, `auto`, or a specialist name for isolation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Mode::Full),
            "auto" => Ok(Mode::Auto),
            other => other.parse::<SpecialistId>().map(Mode::Isolate),
        }
    }
}

/// Errors from the orchestrator.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Isolation mode expected the {expected} specialist but {dispatched} ran")]
    IsolationMismatch {
        expected: SpecialistId,
        dispatched: SpecialistId,
        output: Box<AgentOutput>,
    },
}

/// Everything `handle` produced for one request.
#[derive(Debug, Clone)]
pub struct HandleOutcome {
    pub request_id: RequestId,

    /// Text for the customer
    pub response: String,

    pub routing: RoutingDecision,

    /// Empty when the specialist failed
    pub agent_outputs: Vec<AgentOutput>,

    pub mode: Mode,

    /// Request context after merging classified entities
    pub context: RequestContext,

    /// Set only when rendering ran
    pub render_tier: Option<RenderTier>,

    pub grading_scheduled: bool,

    /// True when the customer got the degraded fallback text
    pub degraded: bool,

    pub usage: LlmUsage,
}

pub struct Orchestrator {
    classifier: Classifier,
    dispatch: DispatchTable,
    renderer: Renderer,
    grading: GradingPipeline,
    control_plane: Arc<dyn ControlPlane>,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn builder(llm: Arc<dyn LlmProvider>, retriever: Arc<dyn Retriever>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(llm, retriever)
    }

    /// Run one request through the pipeline.
    ///
    /// Never waits on grading. Classification and specialist failures are
    /// absorbed into the outcome; the only error is an isolation mismatch.
    pub async fn handle(
        &self,
        query: &str,
        context: RequestContext,
        mode: Mode,
    ) -> Result<HandleOutcome, RuntimeError> {
        let mut request = Request::new(query, context, self.clock.now());
        let mut usage = LlmUsage::default();

        // Classify
        let classification = self.classifier.classify(&request.query, &request.context).await;
        if let Some(model) = &classification.model {
            usage.add(&classification.usage, model);
        }
        let routing = classification.decision;
        tracing::info!(
            request_id = %request.id,
            category = %routing.category,
            confidence = routing.confidence,
            escalation = routing.escalation,
            overridden = routing.was_overridden(),
            parse_failed = routing.parse_failed,
            mode = %mode,
            "Routing decision"
        );
        request.context.merge(&routing.extracted_context);

        // Dispatch
        let specialist = self.dispatch.for_category(routing.category);
        let dispatched = specialist.id();
        let specialist_request = SpecialistRequest {
            request_id: request.id,
            query: &request.query,
            context: &request.context,
            escalated: routing.escalation,
        };

        let output = match specialist.handle(&specialist_request).await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(
                    request_id = %request.id,
                    specialist = %dispatched,
                    error = %e,
                    "Specialist failed, returning degraded response"
                );
                self.control_plane.track_metric(MetricEvent::SpecialistFailure {
                    request_id: request.id,
                    specialist: dispatched,
                    error: e.to_string(),
                });
                return Ok(HandleOutcome {
                    request_id: request.id,
                    response: DEGRADED_RESPONSE.to_string(),
                    routing,
                    agent_outputs: Vec::new(),
                    mode,
                    context: request.context,
                    render_tier: None,
                    grading_scheduled: false,
                    degraded: true,
                    usage,
                });
            }
        };
        usage.add(&output.usage, &output.model);

        match mode {
            Mode::Isolate(expected) if expected != dispatched => {
                tracing::warn!(
                    request_id = %request.id,
                    expected = %expected,
                    dispatched = %dispatched,
                    "Isolation target did not run"
                );
                return Err(RuntimeError::IsolationMismatch {
                    expected,
                    dispatched,
                    output: Box::new(output),
                });
            }
            Mode::Isolate(_) | Mode::Auto => {
                return Ok(HandleOutcome {
                    request_id: request.id,
                    response: output.text.clone(),
                    routing,
                    agent_outputs: vec![output],
                    mode,
                    context: request.context,
                    render_tier: None,
                    grading_scheduled: false,
                    degraded: false,
                    usage,
                });
            }
            Mode::Full => {}
        }

        // Render
        let rendered = self
            .renderer
            .render(&RenderRequest {
                request_id: request.id,
                query: &request.query,
                category: Some(routing.category),
                output: &output,
                context: &request.context,
            })
            .await;
        usage.merge(&rendered.usage);

        Ok(HandleOutcome {
            request_id: request.id,
            response: rendered.text,
            routing,
            agent_outputs: vec![output],
            mode,
            context: request.context,
            render_tier: Some(rendered.tier),
            grading_scheduled: rendered.grading_scheduled,
            degraded: false,
            usage,
        })
    }

    /// Grading status for a request; a ready result is consumed.
    pub fn evaluation_status(&self, request_id: RequestId) -> EvaluationStatus {
        self.grading.cache().poll(request_id)
    }

    pub async fn guardrail_status(&self) -> GuardrailStatus {
        self.grading.controller().status().await
    }

    pub fn guardrail(&self) -> &Arc<GuardrailController> {
        self.grading.controller()
    }

    pub fn grading(&self) -> &GradingPipeline {
        &self.grading
    }
}

/// Wires the pipeline from collaborators and configuration.
pub struct OrchestratorBuilder {
    llm: Arc<dyn LlmProvider>,
    retriever: Arc<dyn Retriever>,
    judge_llm: Option<Arc<dyn LlmProvider>>,
    control_plane: Option<Arc<dyn ControlPlane>>,
    clock: Option<Arc<dyn Clock>>,
    dispatch: Option<DispatchTable>,
    cache: Option<Arc<ResultCache>>,
    config: RuntimeConfig,
}

impl OrchestratorBuilder {
    pub fn new(llm: Arc<dyn LlmProvider>, retriever: Arc<dyn Retriever>) -> Self {
        Self {
            llm,
            retriever,
            judge_llm: None,
            control_plane: None,
            clock: None,
            dispatch: None,
            cache: None,
            config: RuntimeConfig::default(),
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Separate grading model collaborator. Defaults to the main one.
    pub fn judge_provider(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.judge_llm = Some(llm);
        self
    }

    pub fn control_plane(mut self, control_plane: Arc<dyn ControlPlane>) -> Self {
        self.control_plane = Some(control_plane);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the standard specialists.
    pub fn dispatch(mut self, dispatch: DispatchTable) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Share a result cache with other components.
    pub fn result_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Validates the configuration before wiring anything.
    pub fn build(self) -> Result<Orchestrator, ConfigError> {
        let config = self.config;
        config.validate()?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let control_plane = self
            .control_plane
            .unwrap_or_else(|| Arc::new(InMemoryControlPlane::new()));
        let cache = self.cache.unwrap_or_default();

        let monitor = Arc::new(GuardrailMonitor::new(config.guardrail.clone(), clock.clone())?);
        let controller = Arc::new(GuardrailController::new(monitor, control_plane.clone()));
        let judge_llm = self.judge_llm.unwrap_or_else(|| self.llm.clone());
        let judge = Arc::new(Judge::from_config(judge_llm, &config));
        let grading = GradingPipeline::new(judge, controller, cache, clock.clone());

        let dispatch = self.dispatch.unwrap_or_else(|| {
            DispatchTable::standard(self.llm.clone(), self.retriever.clone(), &config, clock.clone())
        });

        Ok(Orchestrator {
            classifier: Classifier::new(
                self.llm.clone(),
                config.stages.triage.clone(),
                config.retry.clone(),
            ),
            dispatch,
            renderer: Renderer::from_config(self.llm, &config).with_grading(grading.clone()),
            grading,
            control_plane,
            clock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_str() {
        assert_eq!("full".parse::<Mode>(), Ok(Mode::Full));
        assert_eq!(" AUTO ".parse::<Mode>(), Ok(Mode::Auto));
        assert_eq!(
            "provider_agent".parse::<Mode>(),
            Ok(Mode::Isolate(SpecialistId::Provider))
        );
        assert!("billing".parse::<Mode>().is_err());
    }

    #[test]
    fn test_only_full_renders() {
        assert!(Mode::Full.renders());
        assert!(!Mode::Auto.renders());
        assert!(!Mode::Isolate(SpecialistId::Policy).renders());
    }

    #[test]
    fn test_mode_serialization() {
        let json = serde_json::to_value(Mode::Isolate(SpecialistId::Scheduling)).unwrap();
        assert_eq!(json["mode"], "isolate");
        assert_eq!(json["specialist"], "scheduling");
        assert_eq!(Mode::Isolate(SpecialistId::Policy).to_string(), "isolate:policy");
    }
}
