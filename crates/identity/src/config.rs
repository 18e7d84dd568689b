//! Identity verification policy

use chrono::Duration;
use serde::{Deserialize, Serialize};

use trustdesk_core::{TrustError, TrustResult};

/// Shortest code the phone check accepts
pub const MIN_CODE_LENGTH: usize = 4;

/// Longest a sent code may stay valid (one day)
pub const MAX_CODE_TTL_MINUTES: i64 = 24 * 60;

/// Limits applied by the identity verification workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPolicy {
    /// Consecutive wrong codes before the attempt is rejected
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,

    /// Minutes a sent code stays valid
    #[serde(default = "default_code_ttl_minutes")]
    pub code_ttl_minutes: i64,

    /// Digits in a generated code
    #[serde(default = "default_code_length")]
    pub code_length: usize,
}

fn default_max_failed_attempts() -> u32 {
    5
}

fn default_code_ttl_minutes() -> i64 {
    10
}

fn default_code_length() -> usize {
    6
}

impl Default for IdentityPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: default_max_failed_attempts(),
            code_ttl_minutes: default_code_ttl_minutes(),
            code_length: default_code_length(),
        }
    }
}

impl IdentityPolicy {
    /// Load a policy from a JSON file
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Code lifetime, clamped to `0..=MAX_CODE_TTL_MINUTES` for unvalidated policies
    pub fn code_ttl(&self) -> Duration {
        Duration::minutes(self.code_ttl_minutes.clamp(0, MAX_CODE_TTL_MINUTES))
    }

    pub fn validate(&self) -> TrustResult<()> {
        if self.max_failed_attempts == 0 {
            return Err(TrustError::invalid_argument("max_failed_attempts must be at least 1"));
        }
        if self.code_ttl_minutes <= 0 || self.code_ttl_minutes > MAX_CODE_TTL_MINUTES {
            return Err(TrustError::invalid_argument(format!(
                "code_ttl_minutes must be between 1 and {}",
                MAX_CODE_TTL_MINUTES
            )));
        }
        if self.code_length < MIN_CODE_LENGTH {
            return Err(TrustError::invalid_argument(format!(
                "code_length must be at least {}",
                MIN_CODE_LENGTH
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = IdentityPolicy::default();
        assert_eq!(policy.max_failed_attempts, 5);
        assert_eq!(policy.code_ttl(), Duration::minutes(10));
        assert_eq!(policy.code_length, 6);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_short_code_rejected() {
        let policy = IdentityPolicy {
            code_length: 3,
            ..IdentityPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_huge_ttl_rejected() {
        let policy = IdentityPolicy {
            code_ttl_minutes: i64::MAX,
            ..IdentityPolicy::default()
        };
        let err = policy.validate().unwrap_err();
        assert_eq!(err.kind(), trustdesk_core::ErrorKind::InvalidArgument);
        assert_eq!(policy.code_ttl(), Duration::minutes(MAX_CODE_TTL_MINUTES));
    }

    #[test]
    fn test_partial_json() {
        let policy: IdentityPolicy = serde_json::from_str(r#"{ "max_failed_attempts": 3 }"#).unwrap();
        assert_eq!(policy.max_failed_attempts, 3);
        assert_eq!(policy.code_length, 6);
    }
}
