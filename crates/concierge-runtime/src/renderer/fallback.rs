//! The render fallback ladder.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Returned when every model tier is exhausted.
pub const APOLOGY_TEXT: &str =
    "I apologize, but I couldn't process your request. Please try again or contact support.";

/// Conservative model used by the safe-default tier.
pub const SAFE_DEFAULT_MODEL: &str = "claude-haiku-4-5";

/// A rung of the ladder, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderTier {
    /// Configured render stage, request context as given
    Primary,

    /// Same stage, context flagged so targeting picks the fallback variant
    FallbackContext,

    /// Hard-coded conservative model and prompt
    SafeDefault,

    /// Fixed string, no model call
    Apology,
}

impl RenderTier {
    /// Model-backed tiers, tried in order, each at most once.
    pub const LADDER: [RenderTier; 3] = [
        RenderTier::Primary,
        RenderTier::FallbackContext,
        RenderTier::SafeDefault,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RenderTier::Primary => "primary",
            RenderTier::FallbackContext => "fallback_context",
            RenderTier::SafeDefault => "safe_default",
            RenderTier::Apology => "apology",
        }
    }

    /// Whether text from this tier came out of a model.
    pub fn is_model_backed(&self) -> bool {
        !matches!(self, RenderTier::Apology)
    }
}

impl fmt::Display for RenderTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a tier gave up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Exhaustion {
    /// A safety filter caught the output
    Intercepted { reason: String },

    /// The model call failed outright
    Failed { error: String },

    /// The model answered with nothing
    Empty,
}

impl fmt::Display for Exhaustion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exhaustion::Intercepted { reason } => write!(f, "intercepted: {}", reason),
            Exhaustion::Failed { error } => write!(f, "failed: {}", error),
            Exhaustion::Empty => f.write_str("empty output"),
        }
    }
}

/// Result of trying one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AttemptResult {
    Succeeded,
    Exhausted(Exhaustion),
}

/// One entry in the attempt log of a render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderAttempt {
    pub tier: RenderTier,
    pub result: AttemptResult,
}

impl RenderAttempt {
    pub fn succeeded(tier: RenderTier) -> Self {
        Self {
            tier,
            result: AttemptResult::Succeeded,
        }
    }

    pub fn exhausted(tier: RenderTier, why: Exhaustion) -> Self {
        Self {
            tier,
            result: AttemptResult::Exhausted(why),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.result, AttemptResult::Succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_order() {
        assert_eq!(
            RenderTier::LADDER,
            [
                RenderTier::Primary,
                RenderTier::FallbackContext,
                RenderTier::SafeDefault
            ]
        );
        assert!(!RenderTier::LADDER.contains(&RenderTier::Apology));
        assert!(!RenderTier::Apology.is_model_backed());
    }

    #[test]
    fn test_attempt_serialization() {
        let attempt = RenderAttempt::exhausted(
            RenderTier::Primary,
            Exhaustion::Intercepted {
                reason: "ssn".to_string(),
            },
        );
        let json = serde_json::to_value(&attempt).unwrap();
        assert_eq!(json["tier"], "primary");
        assert_eq!(json["result"]["result"], "exhausted");
        assert_eq!(json["result"]["kind"], "intercepted");
    }
}
