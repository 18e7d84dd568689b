//! Risk decision - score, verdict and the rules that fired

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Outcome band of a risk score
///
/// Ordered by severity: `Allow < Review < Block`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    #[default]
    Allow,
    Review,
    Block,
}

impl Verdict {
    pub fn requires_action(&self) -> bool {
        !matches!(self, Verdict::Allow)
    }
}

/// Rule codes reported in [`RiskDecision::rules_triggered`]
pub mod rules {
    pub const NEW_ACCOUNT: &str = "NEW_ACCOUNT";
    pub const EMAIL_UNVERIFIED: &str = "EMAIL_UNVERIFIED";
    pub const PHONE_UNVERIFIED: &str = "PHONE_UNVERIFIED";
    pub const BOOKING_VELOCITY: &str = "BOOKING_VELOCITY";
    pub const BOOKING_VELOCITY_SEVERE: &str = "BOOKING_VELOCITY_SEVERE";
    pub const AMOUNT_SPIKE: &str = "AMOUNT_SPIKE";
    pub const FIRST_BOOKING_LARGE: &str = "FIRST_BOOKING_LARGE";
    pub const ANONYMIZING_NETWORK: &str = "ANONYMIZING_NETWORK";
}

/// One rule that contributed to the score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleHit {
    pub code: String,
    pub weight: u32,
}

/// Result of evaluating one [`crate::RiskSignal`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskDecision {
    /// Sum of triggered weights, not clamped
    pub score: u32,
    pub verdict: Verdict,
    /// In evaluation order
    pub rules_triggered: Vec<RuleHit>,
}

impl RiskDecision {
    pub fn is_blocked(&self) -> bool {
        self.verdict == Verdict::Block
    }

    pub fn triggered(&self, code: &str) -> bool {
        self.rules_triggered.iter().any(|r| r.code == code)
    }

    pub fn rule_codes(&self) -> Vec<&str> {
        self.rules_triggered.iter().map(|r| r.code.as_str()).collect()
    }
}
