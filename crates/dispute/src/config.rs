//! Dispute policy - escalation windows and text limits

use chrono::Duration;
use serde::{Deserialize, Serialize};

use trustdesk_core::{TrustError, TrustResult};
use trustdesk_risk::Verdict;

/// Longest escalation window accepted (one year)
pub const MAX_WINDOW_HOURS: i64 = 24 * 365;

/// Limits and timings for the dispute workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputePolicy {
    /// Hours an OPEN dispute with BLOCK severity may wait before escalation
    #[serde(default = "default_block_window_hours")]
    pub block_window_hours: i64,

    /// Hours for REVIEW severity
    #[serde(default = "default_review_window_hours")]
    pub review_window_hours: i64,

    /// Hours for ALLOW severity
    #[serde(default = "default_allow_window_hours")]
    pub allow_window_hours: i64,

    /// Maximum characters in a reason or resolution
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
}

fn default_block_window_hours() -> i64 {
    0
}

fn default_review_window_hours() -> i64 {
    24
}

fn default_allow_window_hours() -> i64 {
    72
}

fn default_max_text_length() -> usize {
    4_000
}

impl Default for DisputePolicy {
    fn default() -> Self {
        Self {
            block_window_hours: default_block_window_hours(),
            review_window_hours: default_review_window_hours(),
            allow_window_hours: default_allow_window_hours(),
            max_text_length: default_max_text_length(),
        }
    }
}

impl DisputePolicy {
    /// Load a policy from a JSON file
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// How long an OPEN dispute of this severity waits for an admin.
    /// Clamped to `0..=MAX_WINDOW_HOURS` for unvalidated policies.
    pub fn escalation_window(&self, severity: Verdict) -> Duration {
        let hours = match severity {
            Verdict::Block => self.block_window_hours,
            Verdict::Review => self.review_window_hours,
            Verdict::Allow => self.allow_window_hours,
        };
        Duration::hours(hours.clamp(0, MAX_WINDOW_HOURS))
    }

    pub fn validate(&self) -> TrustResult<()> {
        let windows = [
            self.block_window_hours,
            self.review_window_hours,
            self.allow_window_hours,
        ];
        if windows.iter().any(|h| !(0..=MAX_WINDOW_HOURS).contains(h)) {
            return Err(TrustError::invalid_argument(format!(
                "escalation windows must be between 0 and {} hours",
                MAX_WINDOW_HOURS
            )));
        }
        if self.max_text_length == 0 {
            return Err(TrustError::invalid_argument("max_text_length must be positive"));
        }
        Ok(())
    }
}
