//! The rolling-window monitor.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use super::config::{GuardrailConfig, GuardrailConfigError};
use super::decision::{CheckPath, GuardrailDecision, Severity};
use super::sample::{GuardrailMetric, GuardrailSample};
use crate::clock::{elapsed_between, Clock};

/// A metric whose aggregate crossed one of its tiers.
#[derive(Debug, Clone)]
struct Breach {
    metric: GuardrailMetric,
    severity: Severity,
    value: f64,
    threshold: f64,
    samples: usize,
}

impl Breach {
    fn describe(&self) -> String {
        let direction = if self.metric.is_ceiling() {
            "above"
        } else {
            "below"
        };
        let tier = match self.severity {
            Severity::Critical => "critical",
            _ => "warning",
        };
        format!(
            "{} mean {:.2} {} {} threshold {:.2} over last {} samples",
            self.metric, self.value, direction, tier, self.threshold, self.samples
        )
    }
}

#[derive(Debug, Default)]
struct MonitorState {
    window: VecDeque<GuardrailSample>,
    last_warning_at: Option<DateTime<Utc>>,
    last_disable_at: Option<DateTime<Utc>>,
    flag_disabled: bool,
    disable_in_flight: bool,
}

/// Snapshot of the monitor for health queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub sample_count: usize,
    pub capacity: usize,
    pub evaluation_span: usize,
    pub means: BTreeMap<GuardrailMetric, f64>,
    pub error_rate: Option<f64>,
    pub avg_response_time_ms: Option<f64>,
    pub last_warning_at: Option<DateTime<Utc>>,
    pub last_disable_at: Option<DateTime<Utc>>,
    pub flag_enabled: bool,
    pub disable_in_flight: bool,
    pub disable_cooldown_remaining_secs: u64,
    pub severity: Severity,
}

/// Rolling-window circuit breaker over graded responses.
///
/// All state sits behind one lock, so recording a sample and deciding on
/// it see the same window.
pub struct GuardrailMonitor {
    config: GuardrailConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<MonitorState>,
}

impl GuardrailMonitor {
    /// Build a monitor; the configuration is validated first.
    pub fn new(config: GuardrailConfig, clock: Arc<dyn Clock>) -> Result<Self, GuardrailConfigError> {
        config.validate()?;
        let capacity = config.window_size;
        Ok(Self {
            config,
            clock,
            state: Mutex::new(MonitorState {
                window: VecDeque::with_capacity(capacity),
                ..Default::default()
            }),
        })
    }

    pub fn config(&self) -> &GuardrailConfig {
        &self.config
    }

    /// Append a sample, evicting the oldest one when the window is full.
    pub fn add_sample(&self, sample: GuardrailSample) {
        let mut state = self.state.lock();
        self.push(&mut state, sample);
    }

    /// Evaluate the current window.
    ///
    /// Places no claim; use [`record_and_evaluate`](Self::record_and_evaluate)
    /// when the caller is going to act on a positive decision.
    pub fn should_auto_disable(&self) -> GuardrailDecision {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.evaluate_window(&mut state, now)
    }

    /// Judge one sample on its own, ignoring the window.
    pub fn should_auto_disable_bypass(&self, sample: &GuardrailSample) -> GuardrailDecision {
        let now = self.clock.now();
        let state = self.state.lock();
        self.evaluate_bypass(&state, sample, now)
    }

    /// Record a sample and decide on it in one step.
    ///
    /// On the window path the sample joins the window first. Bypass samples
    /// are synthetic and never enter the window. A positive decision places
    /// a disable claim that holds off every other evaluation until
    /// [`record_flag_disable`](Self::record_flag_disable) or
    /// [`release_disable_claim`](Self::release_disable_claim) is called.
    pub fn record_and_evaluate(&self, sample: GuardrailSample, path: CheckPath) -> GuardrailDecision {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let decision = match path {
            CheckPath::Window => {
                self.push(&mut state, sample);
                self.evaluate_window(&mut state, now)
            }
            CheckPath::Bypass => self.evaluate_bypass(&state, &sample, now),
        };

        if decision.should_disable {
            state.disable_in_flight = true;
        }
        decision
    }

    /// The control plane confirmed a disable; start the cooldown.
    pub fn record_flag_disable(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.last_disable_at = Some(now);
        state.flag_disabled = true;
        state.disable_in_flight = false;
        tracing::info!(
            cooldown_secs = self.config.disable_cooldown.as_secs(),
            "Guardrail recorded feature disable"
        );
    }

    /// Drop a disable claim after the control-plane call failed.
    pub fn release_disable_claim(&self) {
        self.state.lock().disable_in_flight = false;
    }

    /// The feature was re-enabled by hand.
    pub fn record_flag_enable(&self) {
        let mut state = self.state.lock();
        state.flag_disabled = false;
        tracing::info!("Guardrail recorded feature enable");
    }

    /// Mirrored view of the external flag.
    pub fn flag_enabled(&self) -> bool {
        let now = self.clock.now();
        let state = self.state.lock();
        self.mirror_enabled(&state, now)
    }

    /// Forget both cooldown timestamps.
    pub fn reset_cooldowns(&self) {
        let mut state = self.state.lock();
        state.last_warning_at = None;
        state.last_disable_at = None;
        tracing::info!("Guardrail cooldowns reset");
    }

    /// The most recent `n` samples, oldest first.
    pub fn recent_samples(&self, n: usize) -> Vec<GuardrailSample> {
        let state = self.state.lock();
        let skip = state.window.len().saturating_sub(n);
        state.window.iter().skip(skip).cloned().collect()
    }

    pub fn sample_count(&self) -> usize {
        self.state.lock().window.len()
    }

    pub fn recent_metrics_summary(&self) -> MetricsSummary {
        let now = self.clock.now();
        let state = self.state.lock();

        let mut means = BTreeMap::new();
        for metric in GuardrailMetric::ALL {
            if metric == GuardrailMetric::ErrorRate {
                continue;
            }
            if let Some((mean, _)) = self.span_mean(&state.window, metric) {
                means.insert(metric, mean);
            }
        }

        let latencies: Vec<f64> = state
            .window
            .iter()
            .rev()
            .take(self.config.evaluation_span)
            .filter_map(|s| s.response_time_ms)
            .map(|ms| ms as f64)
            .collect();
        let avg_response_time_ms = if latencies.is_empty() {
            None
        } else {
            Some(latencies.iter().sum::<f64>() / latencies.len() as f64)
        };

        let severity = self
            .breaches(&state.window)
            .iter()
            .map(|b| b.severity)
            .max()
            .unwrap_or(Severity::Healthy);

        MetricsSummary {
            sample_count: state.window.len(),
            capacity: self.config.window_size,
            evaluation_span: self.config.evaluation_span,
            means,
            error_rate: self
                .span_mean(&state.window, GuardrailMetric::ErrorRate)
                .map(|(rate, _)| rate),
            avg_response_time_ms,
            last_warning_at: state.last_warning_at,
            last_disable_at: state.last_disable_at,
            flag_enabled: self.mirror_enabled(&state, now),
            disable_in_flight: state.disable_in_flight,
            disable_cooldown_remaining_secs: self
                .disable_cooldown_remaining(&state, now)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            severity,
        }
    }

    fn push(&self, state: &mut MonitorState, sample: GuardrailSample) {
        while !state.window.is_empty() && state.window.len() >= self.config.window_size {
            state.window.pop_front();
        }
        state.window.push_back(sample);
    }

    /// Mean of the most recent `evaluation_span` values present for a metric.
    fn span_mean(
        &self,
        window: &VecDeque<GuardrailSample>,
        metric: GuardrailMetric,
    ) -> Option<(f64, usize)> {
        let values: Vec<f64> = window
            .iter()
            .rev()
            .filter_map(|s| s.metric(metric))
            .take(self.config.evaluation_span)
            .collect();
        if values.is_empty() {
            return None;
        }
        Some((values.iter().sum::<f64>() / values.len() as f64, values.len()))
    }

    fn breaches(&self, window: &VecDeque<GuardrailSample>) -> Vec<Breach> {
        let mut breaches = Vec::new();
        for metric in GuardrailMetric::ALL {
            let Some((value, samples)) = self.span_mean(window, metric) else {
                continue;
            };
            if samples < self.config.min_samples {
                continue;
            }

            let tiers = self.config.thresholds.tiers(metric);
            let crosses = |threshold: f64| {
                if metric.is_ceiling() {
                    value > threshold
                } else {
                    value < threshold
                }
            };

            let (severity, threshold) = if crosses(tiers.critical) {
                (Severity::Critical, tiers.critical)
            } else if crosses(tiers.warning) {
                (Severity::Warning, tiers.warning)
            } else {
                continue;
            };

            breaches.push(Breach {
                metric,
                severity,
                value,
                threshold,
                samples,
            });
        }
        breaches
    }

    fn evaluate_window(&self, state: &mut MonitorState, now: DateTime<Utc>) -> GuardrailDecision {
        let breaches = self.breaches(&state.window);

        let critical: Vec<String> = breaches
            .iter()
            .filter(|b| b.severity == Severity::Critical)
            .map(Breach::describe)
            .collect();
        if !critical.is_empty() {
            return self.gate_disable(state, now, critical.join("; "));
        }

        let warnings: Vec<String> = breaches.iter().map(Breach::describe).collect();
        if !warnings.is_empty() {
            let reason = warnings.join("; ");
            self.emit_warning(state, now, &reason);
            return GuardrailDecision::hold(Severity::Warning, reason);
        }

        GuardrailDecision::hold(Severity::Healthy, "all metrics within thresholds".to_string())
    }

    fn evaluate_bypass(
        &self,
        state: &MonitorState,
        sample: &GuardrailSample,
        now: DateTime<Utc>,
    ) -> GuardrailDecision {
        let cutoffs = &self.config.bypass;
        let mut findings = Vec::new();

        if sample.error_occurred {
            findings.push("sample recorded an error".to_string());
        }
        if let Some(accuracy) = sample.accuracy {
            if accuracy <= cutoffs.max_accuracy {
                findings.push(format!(
                    "accuracy {:.2} at or below {:.2}",
                    accuracy, cutoffs.max_accuracy
                ));
            }
        }
        if let Some(toxicity) = sample.toxicity {
            if toxicity >= cutoffs.min_toxicity {
                findings.push(format!(
                    "toxicity {:.2} at or above {:.2}",
                    toxicity, cutoffs.min_toxicity
                ));
            }
        }

        if findings.is_empty() {
            return GuardrailDecision::hold(
                Severity::Healthy,
                "sample within bypass cutoffs".to_string(),
            );
        }

        let reason = format!("bypass: {}", findings.join("; "));
        self.gate_disable(state, now, reason)
    }

    fn gate_disable(&self, state: &MonitorState, now: DateTime<Utc>, reason: String) -> GuardrailDecision {
        if state.disable_in_flight {
            return GuardrailDecision::hold(
                Severity::Critical,
                format!("{reason} (disable already in progress)"),
            );
        }

        if let Some(remaining) = self.disable_cooldown_remaining(state, now) {
            tracing::debug!(
                remaining_secs = remaining.as_secs(),
                reason = %reason,
                "Critical breach suppressed by disable cooldown"
            );
            return GuardrailDecision::hold(
                Severity::Critical,
                format!(
                    "{reason} (suppressed, {}s of disable cooldown remaining)",
                    remaining.as_secs()
                ),
            );
        }

        tracing::error!(reason = %reason, "Guardrail critical breach, requesting disable");
        GuardrailDecision::disable(reason)
    }

    fn emit_warning(&self, state: &mut MonitorState, now: DateTime<Utc>, reason: &str) {
        let due = match state.last_warning_at {
            Some(at) => elapsed_between(at, now) >= self.config.warning_cooldown,
            None => true,
        };
        if due {
            tracing::warn!(reason = %reason, "Guardrail warning threshold breached");
            state.last_warning_at = Some(now);
        }
    }

    fn disable_cooldown_remaining(&self, state: &MonitorState, now: DateTime<Utc>) -> Option<Duration> {
        let since = state.last_disable_at?;
        let elapsed = elapsed_between(since, now);
        if elapsed >= self.config.disable_cooldown {
            None
        } else {
            Some(self.config.disable_cooldown - elapsed)
        }
    }

    fn mirror_enabled(&self, state: &MonitorState, now: DateTime<Utc>) -> bool {
        !state.flag_disabled || self.disable_cooldown_remaining(state, now).is_none()
    }
}

impl std::fmt::Debug for GuardrailMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardrailMonitor")
            .field("config", &self.config)
            .field("samples", &self.sample_count())
            .finish()
    }
}
