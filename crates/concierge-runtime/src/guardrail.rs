//! Guardrail controller: the monitor plus the control plane it acts on.
//!
//! The monitor only decides. This wrapper performs the disable and enable
//! calls and tells the monitor about confirmed outcomes.

use serde::Serialize;
use std::sync::Arc;

use concierge_core::{
    CheckPath, GuardrailMonitor, GuardrailSample, MetricsSummary, MitigationOutcome,
};

use crate::control_plane::{ControlPlane, ControlPlaneError, FlagVersion};

/// Where the reported enabled flag came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagSource {
    ControlPlane,
    /// Control plane unreachable; the monitor's mirror was used
    Mirror,
}

/// Guardrail health as exposed to the embedding application.
#[derive(Debug, Clone, Serialize)]
pub struct GuardrailStatus {
    pub summary: MetricsSummary,
    pub feature_enabled: bool,
    pub flag_source: FlagSource,
}

/// Releases a disable claim on drop unless the disable was confirmed.
///
/// Covers a control-plane call that panics or whose future is dropped.
struct DisableClaim<'a> {
    monitor: &'a GuardrailMonitor,
    held: bool,
}

impl<'a> DisableClaim<'a> {
    fn new(monitor: &'a GuardrailMonitor) -> Self {
        Self { monitor, held: true }
    }

    fn confirm(mut self) {
        self.held = false;
        self.monitor.record_flag_disable();
    }
}

impl Drop for DisableClaim<'_> {
    fn drop(&mut self) {
        if self.held {
            self.monitor.release_disable_claim();
        }
    }
}

pub struct GuardrailController {
    monitor: Arc<GuardrailMonitor>,
    control_plane: Arc<dyn ControlPlane>,
}

impl GuardrailController {
    pub fn new(monitor: Arc<GuardrailMonitor>, control_plane: Arc<dyn ControlPlane>) -> Self {
        Self {
            monitor,
            control_plane,
        }
    }

    pub fn monitor(&self) -> &GuardrailMonitor {
        &self.monitor
    }

    pub fn control_plane(&self) -> &Arc<dyn ControlPlane> {
        &self.control_plane
    }

    /// Record a sample, decide, and act on a disable decision.
    ///
    /// The cooldown only starts once the control plane confirms. A failed
    /// call releases the claim so the next breaching sample retries.
    pub async fn observe(&self, sample: GuardrailSample, path: CheckPath) -> MitigationOutcome {
        let decision = self.monitor.record_and_evaluate(sample, path);
        if !decision.should_disable {
            return MitigationOutcome::no_action(decision.reason);
        }

        let claim = DisableClaim::new(&self.monitor);
        let comment = format!("Auto-disabled by guardrail: {}", decision.reason);
        match self.control_plane.disable(&comment).await {
            Ok(version) => {
                claim.confirm();
                tracing::warn!(
                    version = %version,
                    path = ?path,
                    reason = %decision.reason,
                    "Feature disabled by guardrail"
                );
                MitigationOutcome::FeatureDisabled {
                    reason: decision.reason,
                    version: version.0,
                }
            }
            Err(e) => {
                drop(claim);
                tracing::error!(
                    error = %e,
                    reason = %decision.reason,
                    "Guardrail disable call failed, will retry on next breach"
                );
                MitigationOutcome::DisableFailed {
                    reason: decision.reason,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Window summary and the feature flag as the control plane sees it.
    pub async fn status(&self) -> GuardrailStatus {
        let summary = self.monitor.recent_metrics_summary();
        let (feature_enabled, flag_source) = match self.control_plane.is_enabled().await {
            Ok(enabled) => (enabled, FlagSource::ControlPlane),
            Err(e) => {
                tracing::error!(error = %e, "Control plane status check failed, using mirrored flag");
                (summary.flag_enabled, FlagSource::Mirror)
            }
        };

        GuardrailStatus {
            summary,
            feature_enabled,
            flag_source,
        }
    }

    /// Re-enable the feature by hand.
    pub async fn recover(&self, reason: &str) -> Result<FlagVersion, ControlPlaneError> {
        let comment = format!("Manually re-enabled: {}", reason);
        match self.control_plane.enable(&comment).await {
            Ok(version) => {
                self.monitor.record_flag_enable();
                tracing::info!(version = %version, reason, "Feature re-enabled");
                Ok(version)
            }
            Err(e) => {
                tracing::error!(error = %e, "Control plane enable call failed");
                Err(e)
            }
        }
    }

    /// Disable the feature by hand; starts the disable cooldown.
    pub async fn manual_disable(&self, reason: &str) -> Result<FlagVersion, ControlPlaneError> {
        let comment = format!("Manually disabled: {}", reason);
        match self.control_plane.disable(&comment).await {
            Ok(version) => {
                self.monitor.record_flag_disable();
                tracing::warn!(version = %version, reason, "Feature disabled by hand");
                Ok(version)
            }
            Err(e) => {
                tracing::error!(error = %e, "Control plane disable call failed");
                Err(e)
            }
        }
    }

    pub fn reset_cooldowns(&self) {
        self.monitor.reset_cooldowns();
    }

    pub fn recent_samples(&self, n: usize) -> Vec<GuardrailSample> {
        self.monitor.recent_samples(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::{InMemoryControlPlane, MetricEvent};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use concierge_core::{Clock, GuardrailConfig, ManualClock};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn setup(config: GuardrailConfig) -> (GuardrailController, Arc<InMemoryControlPlane>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()));
        let monitor = Arc::new(GuardrailMonitor::new(config, clock.clone()).unwrap());
        let control_plane = Arc::new(InMemoryControlPlane::new());
        (
            GuardrailController::new(monitor, control_plane.clone()),
            control_plane,
            clock,
        )
    }

    fn bad(clock: &ManualClock) -> GuardrailSample {
        GuardrailSample::new(clock.now()).with_accuracy(0.1)
    }

    #[tokio::test]
    async fn test_breach_disables_once() {
        let (controller, control_plane, clock) = setup(GuardrailConfig::default());

        let mut outcomes = Vec::new();
        for _ in 0..4 {
            outcomes.push(controller.observe(bad(&clock), CheckPath::Window).await);
        }

        assert!(!outcomes[0].disabled_feature());
        assert!(!outcomes[1].disabled_feature());
        assert!(outcomes[2].disabled_feature());
        // cooldown holds off the fourth
        assert!(!outcomes[3].disabled_feature());

        let audit = control_plane.audit_log();
        assert_eq!(audit.len(), 1);
        assert!(audit[0].starts_with("Auto-disabled by guardrail: accuracy"));
        assert!(!control_plane.is_enabled().await.unwrap());
        assert!(!controller.monitor().flag_enabled());
    }

    #[tokio::test]
    async fn test_failed_disable_retries_on_next_breach() {
        let (controller, control_plane, clock) = setup(GuardrailConfig::default());
        control_plane.set_unreachable(true);

        controller.observe(bad(&clock), CheckPath::Window).await;
        controller.observe(bad(&clock), CheckPath::Window).await;
        let failed = controller.observe(bad(&clock), CheckPath::Window).await;
        assert!(matches!(failed, MitigationOutcome::DisableFailed { .. }));
        assert!(controller.monitor().flag_enabled());
        assert!(controller.monitor().recent_metrics_summary().last_disable_at.is_none());

        control_plane.set_unreachable(false);
        let retried = controller.observe(bad(&clock), CheckPath::Window).await;
        assert!(retried.disabled_feature());
    }

    /// Hangs on `disable` while `hang` is set.
    struct HangingPlane {
        hang: AtomicBool,
        inner: InMemoryControlPlane,
    }

    #[async_trait]
    impl ControlPlane for HangingPlane {
        async fn disable(&self, comment: &str) -> Result<FlagVersion, ControlPlaneError> {
            if self.hang.load(Ordering::SeqCst) {
                return std::future::pending().await;
            }
            self.inner.disable(comment).await
        }

        async fn enable(&self, comment: &str) -> Result<FlagVersion, ControlPlaneError> {
            self.inner.enable(comment).await
        }

        async fn is_enabled(&self) -> Result<bool, ControlPlaneError> {
            self.inner.is_enabled().await
        }

        fn track_metric(&self, event: MetricEvent) {
            self.inner.track_metric(event);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_disable_releases_claim() {
        let clock = Arc::new(ManualClock::default());
        let monitor = Arc::new(GuardrailMonitor::new(GuardrailConfig::default(), clock.clone()).unwrap());
        let plane = Arc::new(HangingPlane {
            hang: AtomicBool::new(true),
            inner: InMemoryControlPlane::new(),
        });
        let controller = GuardrailController::new(monitor, plane.clone());

        controller.observe(bad(&clock), CheckPath::Window).await;
        controller.observe(bad(&clock), CheckPath::Window).await;
        let cancelled = tokio::time::timeout(
            Duration::from_secs(1),
            controller.observe(bad(&clock), CheckPath::Window),
        )
        .await;
        assert!(cancelled.is_err());
        assert!(!controller.monitor().recent_metrics_summary().disable_in_flight);

        plane.hang.store(false, Ordering::SeqCst);
        let retried = controller.observe(bad(&clock), CheckPath::Window).await;
        assert!(retried.disabled_feature());
    }

    #[tokio::test]
    async fn test_bypass_disables_on_single_sample() {
        let (controller, control_plane, clock) = setup(GuardrailConfig::default());
        let sample = GuardrailSample::new(clock.now())
            .with_accuracy(0.1)
            .with_toxicity(0.8);

        let outcome = controller.observe(sample, CheckPath::Bypass).await;
        assert!(outcome.disabled_feature());
        assert_eq!(controller.monitor().sample_count(), 0);
        assert_eq!(control_plane.audit_log().len(), 1);
    }

    #[tokio::test]
    async fn test_status_falls_back_to_mirror() {
        let (controller, control_plane, _clock) = setup(GuardrailConfig::default());
        controller.manual_disable("maintenance").await.unwrap();

        let status = controller.status().await;
        assert_eq!(status.flag_source, FlagSource::ControlPlane);
        assert!(!status.feature_enabled);

        control_plane.set_unreachable(true);
        let status = controller.status().await;
        assert_eq!(status.flag_source, FlagSource::Mirror);
        assert!(!status.feature_enabled);
    }

    #[tokio::test]
    async fn test_recover_and_cooldown_reset() {
        let config = GuardrailConfig {
            disable_cooldown: Duration::from_secs(60),
            ..GuardrailConfig::default()
        };
        let (controller, control_plane, clock) = setup(config);

        for _ in 0..3 {
            controller.observe(bad(&clock), CheckPath::Window).await;
        }
        assert!(!control_plane.is_enabled().await.unwrap());

        controller.recover("fixed prompt").await.unwrap();
        assert!(control_plane.is_enabled().await.unwrap());
        assert!(controller.monitor().flag_enabled());

        // still cooling down
        let held = controller.observe(bad(&clock), CheckPath::Window).await;
        assert!(!held.disabled_feature());

        controller.reset_cooldowns();
        let again = controller.observe(bad(&clock), CheckPath::Window).await;
        assert!(again.disabled_feature());
        assert_eq!(controller.recent_samples(2).len(), 2);
    }
}
