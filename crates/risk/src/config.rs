//! Risk policy - weights, thresholds and verdict bands
//!
//! All constants are configurable via JSON, not hardcoded, so the policy can
//! be tuned in production without recompilation. Missing fields fall back to
//! the defaults below.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use trustdesk_core::{TrustError, TrustResult};

/// Upper bound for any single rule weight
pub const MAX_RULE_WEIGHT: u32 = 1_000;

/// Weighted rule set used by the fraud risk engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskPolicy {
    // === Account ===
    /// Accounts younger than this many days count as new
    #[serde(default = "default_new_account_days")]
    pub new_account_days: u32,

    #[serde(default = "default_new_account_weight")]
    pub new_account_weight: u32,

    #[serde(default = "default_email_unverified_weight")]
    pub email_unverified_weight: u32,

    #[serde(default = "default_phone_unverified_weight")]
    pub phone_unverified_weight: u32,

    // === Velocity ===
    /// More than this many bookings in 24h triggers the velocity rule
    #[serde(default = "default_velocity_threshold")]
    pub velocity_threshold: u32,

    #[serde(default = "default_velocity_weight")]
    pub velocity_weight: u32,

    /// More than this many bookings in 24h adds the severe velocity weight on top
    #[serde(default = "default_severe_velocity_threshold")]
    pub severe_velocity_threshold: u32,

    #[serde(default = "default_severe_velocity_weight")]
    pub severe_velocity_weight: u32,

    // === Amount ===
    /// Booking amount at or above `multiplier x average` is a spike
    #[serde(default = "default_amount_spike_multiplier")]
    pub amount_spike_multiplier: Decimal,

    #[serde(default = "default_amount_spike_weight")]
    pub amount_spike_weight: u32,

    /// With no booking history, amounts strictly above this are suspicious
    #[serde(default = "default_first_booking_threshold")]
    pub first_booking_threshold: Decimal,

    #[serde(default = "default_first_booking_weight")]
    pub first_booking_weight: u32,

    // === Network ===
    #[serde(default = "default_anonymizer_weight")]
    pub anonymizer_weight: u32,

    // === Verdict bands (lower bound inclusive) ===
    #[serde(default = "default_review_threshold")]
    pub review_threshold: u32,

    #[serde(default = "default_block_threshold")]
    pub block_threshold: u32,
}

fn default_new_account_days() -> u32 {
    1
}

fn default_new_account_weight() -> u32 {
    25
}

fn default_email_unverified_weight() -> u32 {
    15
}

fn default_phone_unverified_weight() -> u32 {
    10
}

fn default_velocity_threshold() -> u32 {
    3
}

fn default_velocity_weight() -> u32 {
    20
}

fn default_severe_velocity_threshold() -> u32 {
    8
}

fn default_severe_velocity_weight() -> u32 {
    15
}

fn default_amount_spike_multiplier() -> Decimal {
    Decimal::new(3, 0)
}

fn default_amount_spike_weight() -> u32 {
    20
}

fn default_first_booking_threshold() -> Decimal {
    Decimal::new(1_000, 0)
}

fn default_first_booking_weight() -> u32 {
    10
}

fn default_anonymizer_weight() -> u32 {
    15
}

fn default_review_threshold() -> u32 {
    40
}

fn default_block_threshold() -> u32 {
    70
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            new_account_days: default_new_account_days(),
            new_account_weight: default_new_account_weight(),
            email_unverified_weight: default_email_unverified_weight(),
            phone_unverified_weight: default_phone_unverified_weight(),
            velocity_threshold: default_velocity_threshold(),
            velocity_weight: default_velocity_weight(),
            severe_velocity_threshold: default_severe_velocity_threshold(),
            severe_velocity_weight: default_severe_velocity_weight(),
            amount_spike_multiplier: default_amount_spike_multiplier(),
            amount_spike_weight: default_amount_spike_weight(),
            first_booking_threshold: default_first_booking_threshold(),
            first_booking_weight: default_first_booking_weight(),
            anonymizer_weight: default_anonymizer_weight(),
            review_threshold: default_review_threshold(),
            block_threshold: default_block_threshold(),
        }
    }
}

impl RiskPolicy {
    /// Load a policy from a JSON file
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    fn weights(&self) -> [(&'static str, u32); 8] {
        [
            ("new_account_weight", self.new_account_weight),
            ("email_unverified_weight", self.email_unverified_weight),
            ("phone_unverified_weight", self.phone_unverified_weight),
            ("velocity_weight", self.velocity_weight),
            ("severe_velocity_weight", self.severe_velocity_weight),
            ("amount_spike_weight", self.amount_spike_weight),
            ("first_booking_weight", self.first_booking_weight),
            ("anonymizer_weight", self.anonymizer_weight),
        ]
    }

    /// Reject policies whose weights are out of range or whose bands or tiers are out of order
    pub fn validate(&self) -> TrustResult<()> {
        if let Some((name, weight)) = self
            .weights()
            .into_iter()
            .find(|(_, weight)| *weight > MAX_RULE_WEIGHT)
        {
            return Err(TrustError::invalid_argument(format!(
                "{} ({}) exceeds {}",
                name, weight, MAX_RULE_WEIGHT
            )));
        }
        if self.review_threshold > self.block_threshold {
            return Err(TrustError::invalid_argument(format!(
                "review_threshold ({}) must not exceed block_threshold ({})",
                self.review_threshold, self.block_threshold
            )));
        }
        if self.severe_velocity_threshold < self.velocity_threshold {
            return Err(TrustError::invalid_argument(
                "severe_velocity_threshold must not be below velocity_threshold",
            ));
        }
        if self.amount_spike_multiplier <= Decimal::ZERO {
            return Err(TrustError::invalid_argument(
                "amount_spike_multiplier must be positive",
            ));
        }
        Ok(())
    }

    /// Highest score the rule set can produce (all rules firing together)
    ///
    /// The spike and first-booking rules are mutually exclusive, so only the
    /// larger of the two counts.
    pub fn max_score(&self) -> u32 {
        [
            self.new_account_weight,
            self.email_unverified_weight,
            self.phone_unverified_weight,
            self.velocity_weight,
            self.severe_velocity_weight,
            self.amount_spike_weight.max(self.first_booking_weight),
            self.anonymizer_weight,
        ]
        .into_iter()
        .fold(0u32, u32::saturating_add)
    }
}
