//! External feature-toggle control plane.
//!
//! Only the guardrail controller calls `disable`/`enable`. Metric events
//! are fire-and-forget and may be sent from anywhere.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

use concierge_core::{RequestId, SpecialistId};

/// Errors from the control plane.
#[derive(Error, Debug, Clone)]
pub enum ControlPlaneError {
    #[error("Control plane unreachable: {0}")]
    Unreachable(String),

    #[error("Control plane rejected the change: {0}")]
    Rejected(String),
}

/// Opaque version returned by a flag change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagVersion(pub String);

impl fmt::Display for FlagVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metric signals sent alongside normal traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MetricEvent {
    /// A specialist call failed and the customer got a degraded answer
    SpecialistFailure {
        request_id: RequestId,
        specialist: SpecialistId,
        error: String,
    },

    /// Judge scores for one graded response
    Judgment {
        request_id: RequestId,
        accuracy: f64,
        coherence: f64,
        passed: bool,
    },
}

/// Remote toggle for the feature under guard.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Turn the feature off, recording `comment` in the audit trail.
    async fn disable(&self, comment: &str) -> Result<FlagVersion, ControlPlaneError>;

    async fn enable(&self, comment: &str) -> Result<FlagVersion, ControlPlaneError>;

    async fn is_enabled(&self) -> Result<bool, ControlPlaneError>;

    /// Record a metric event. Never blocks and never fails.
    fn track_metric(&self, event: MetricEvent);
}

/// Audit entries and metric events kept by [`InMemoryControlPlane`] by default.
pub const DEFAULT_HISTORY: usize = 256;

#[derive(Debug)]
struct InMemoryState {
    enabled: bool,
    version: u64,
    audit: VecDeque<String>,
    events: VecDeque<MetricEvent>,
    unreachable: bool,
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, capacity: usize, item: T) {
    if capacity == 0 {
        return;
    }
    while buffer.len() >= capacity {
        buffer.pop_front();
    }
    buffer.push_back(item);
}

/// In-process control plane for embedding without a remote toggle.
///
/// Keeps the most recent audit entries and metric events, dropping the
/// oldest once `history` is reached.
#[derive(Debug)]
pub struct InMemoryControlPlane {
    state: Mutex<InMemoryState>,
    history: usize,
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }

    pub fn with_history(history: usize) -> Self {
        Self {
            state: Mutex::new(InMemoryState {
                enabled: true,
                version: 0,
                audit: VecDeque::new(),
                events: VecDeque::new(),
                unreachable: false,
            }),
            history,
        }
    }

    /// Make every flag call fail, as if the remote were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    pub fn audit_log(&self) -> Vec<String> {
        self.state.lock().audit.iter().cloned().collect()
    }

    pub fn events(&self) -> Vec<MetricEvent> {
        self.state.lock().events.iter().cloned().collect()
    }

    fn set_enabled(&self, enabled: bool, comment: &str) -> Result<FlagVersion, ControlPlaneError> {
        let mut state = self.state.lock();
        if state.unreachable {
            return Err(ControlPlaneError::Unreachable(
                "in-memory control plane marked unreachable".to_string(),
            ));
        }
        state.enabled = enabled;
        state.version += 1;
        push_bounded(&mut state.audit, self.history, comment.to_string());
        Ok(FlagVersion(format!("v{}", state.version)))
    }
}

impl Default for InMemoryControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn disable(&self, comment: &str) -> Result<FlagVersion, ControlPlaneError> {
        self.set_enabled(false, comment)
    }

    async fn enable(&self, comment: &str) -> Result<FlagVersion, ControlPlaneError> {
        self.set_enabled(true, comment)
    }

    async fn is_enabled(&self) -> Result<bool, ControlPlaneError> {
        let state = self.state.lock();
        if state.unreachable {
            return Err(ControlPlaneError::Unreachable(
                "in-memory control plane marked unreachable".to_string(),
            ));
        }
        Ok(state.enabled)
    }

    fn track_metric(&self, event: MetricEvent) {
        tracing::debug!(event = ?event, "Metric event");
        let mut state = self.state.lock();
        push_bounded(&mut state.events, self.history, event);
    }
}
