//! Rolling-window quality monitor.
//!
//! The monitor decides whether the feature should be withdrawn from
//! production traffic. It never talks to the control plane itself: the
//! caller performs the disable and reports success back through
//! [`GuardrailMonitor::record_flag_disable`].

mod config;
mod decision;
mod monitor;
mod sample;

pub use config::{
    BypassCutoffs, GuardrailConfig, GuardrailConfigError, GuardrailThresholds, MetricTiers,
};
pub use decision::{CheckPath, GuardrailDecision, MitigationOutcome, Severity};
pub use monitor::{GuardrailMonitor, MetricsSummary};
pub use sample::{GuardrailMetric, GuardrailSample};
