//! Monitor verdicts and what the caller did with them.

use serde::{Deserialize, Serialize};

/// How bad the current window looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Healthy,
    Warning,
    Critical,
}

/// Which evaluation a sample goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckPath {
    /// Aggregate over the rolling window
    Window,
    /// Judge the single sample on its own
    Bypass,
}

/// Result of a disable check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailDecision {
    pub should_disable: bool,
    pub severity: Severity,
    pub reason: String,
}

impl GuardrailDecision {
    pub(crate) fn disable(reason: String) -> Self {
        Self {
            should_disable: true,
            severity: Severity::Critical,
            reason,
        }
    }

    pub(crate) fn hold(severity: Severity, reason: String) -> Self {
        Self {
            should_disable: false,
            severity,
            reason,
        }
    }

    /// Tuple form: `(should_disable, reason)`.
    pub fn as_tuple(&self) -> (bool, &str) {
        (self.should_disable, &self.reason)
    }
}

/// What happened after a decision, as recorded in a grading report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MitigationOutcome {
    /// Nothing was done
    NoAction { status: String },

    /// The control plane confirmed the disable
    FeatureDisabled { reason: String, version: String },

    /// The monitor asked for a disable but the control plane call failed
    DisableFailed { reason: String, error: String },
}

impl MitigationOutcome {
    pub fn no_action(status: impl Into<String>) -> Self {
        Self::NoAction {
            status: status.into(),
        }
    }

    pub fn disabled_feature(&self) -> bool {
        matches!(self, MitigationOutcome::FeatureDisabled { .. })
    }
}

impl Default for MitigationOutcome {
    fn default() -> Self {
        Self::no_action("not evaluated")
    }
}
