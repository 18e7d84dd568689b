//! Dispute record and status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use trustdesk_core::{BookingId, DisputeId, UserId};
use trustdesk_risk::Verdict;

pub const ENTITY_TYPE: &str = "Dispute";

/// Status of a dispute
///
/// Only advances `OPEN -> UNDER_REVIEW -> {RESOLVED, REJECTED}`, with a
/// direct `OPEN -> {RESOLVED, REJECTED}` fast track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    Open,
    UnderReview,
    Resolved,
    /// Found without merit
    Rejected,
}

impl DisputeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DisputeStatus::Resolved | DisputeStatus::Rejected)
    }

    pub fn audit_action(&self) -> String {
        format!("DISPUTE_{}", self)
    }
}

/// A disagreement over a booking, raised by one party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub booking_id: BookingId,
    pub initiator_id: UserId,
    pub reason: String,
    /// Reviewing admin, replaced by the resolving admin
    pub admin_id: Option<UserId>,
    pub resolution: Option<String>,
    pub status: DisputeStatus,
    /// Risk verdict of the underlying booking; drives escalation urgency
    pub severity: Verdict,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Dispute {
    pub fn new(
        id: DisputeId,
        booking_id: BookingId,
        initiator_id: UserId,
        reason: impl Into<String>,
        severity: Verdict,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            booking_id,
            initiator_id,
            reason: reason.into(),
            admin_id: None,
            resolution: None,
            status: DisputeStatus::Open,
            severity,
            version: 1,
            created_at: now,
            updated_at: now,
            closed_at: None,
        }
    }

    /// Bump the version for a write; returns the version the store must still hold
    pub fn touch(&mut self, now: DateTime<Utc>) -> u64 {
        let expected = self.version;
        self.version += 1;
        self.updated_at = now;
        expected
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_strings() {
        assert_eq!(DisputeStatus::UnderReview.to_string(), "UNDER_REVIEW");
        assert_eq!(DisputeStatus::from_str("RESOLVED").unwrap(), DisputeStatus::Resolved);
        assert_eq!(DisputeStatus::Rejected.audit_action(), "DISPUTE_REJECTED");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!DisputeStatus::Open.is_terminal());
        assert!(!DisputeStatus::UnderReview.is_terminal());
        assert!(DisputeStatus::Resolved.is_terminal());
        assert!(DisputeStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_serialized_shape() {
        let now = chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 1, 1, 0, 0, 0).unwrap();
        let dispute = Dispute::new(
            DisputeId::from_uuid(uuid::Uuid::from_u128(1)),
            BookingId::from_uuid(uuid::Uuid::from_u128(2)),
            UserId::from_uuid(uuid::Uuid::from_u128(3)),
            "Room did not match listing",
            Verdict::Review,
            now,
        );
        let json = serde_json::to_value(&dispute).unwrap();
        assert_eq!(json["status"], "OPEN");
        assert_eq!(json["severity"], "REVIEW");
        assert_eq!(json["admin_id"], serde_json::Value::Null);
    }
}
