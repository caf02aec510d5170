//! # concierge-runtime
//!
//! Model-backed orchestration for Concierge.
//!
//! Every call to a collaborator lives here: classification, the domain
//! specialists, rendering with its fallback ladder, background grading and
//! the guardrail controller that withdraws the feature through the control
//! plane. The decision logic itself is in `concierge-core`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use concierge_runtime::{Mode, Orchestrator, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_yaml_file("concierge.yaml")?;
//! let orchestrator = Orchestrator::builder(llm, retriever)
//!     .config(config)
//!     .control_plane(control_plane)
//!     .build()?;
//!
//! let outcome = orchestrator
//!     .handle("What is my specialist copay?", context, Mode::Full)
//!     .await?;
//! println!("{}", outcome.response);
//!
//! // later, from a status endpoint
//! let status = orchestrator.evaluation_status(outcome.request_id);
//! ```

pub mod agents;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod control_plane;
pub mod grading;
pub mod guardrail;
pub mod judge;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod renderer;
pub mod retrieval;
pub mod usage;

pub use agents::{AgentError, DispatchTable, Specialist, SpecialistRequest};
pub use cache::RetrievalCache;
pub use classifier::{Classification, Classifier};
pub use config::{ConfigError, RuntimeConfig, StageConfig, RENDER_FALLBACK_FLAG};
pub use control_plane::{
    ControlPlane, ControlPlaneError, FlagVersion, InMemoryControlPlane, MetricEvent,
};
pub use grading::{poll_with_ceiling, GradingJob, GradingPipeline, PollOutcome};
pub use guardrail::{FlagSource, GuardrailController, GuardrailStatus};
pub use judge::{Judge, JudgeError};
pub use orchestrator::{HandleOutcome, Mode, Orchestrator, OrchestratorBuilder, RuntimeError};
pub use providers::{ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError};
pub use renderer::{RenderOutcome, RenderRequest, RenderTier, Renderer};
pub use retrieval::{RetrievalError, RetrievalFilters, Retriever};
pub use usage::LlmUsage;
