//! Audit log entries and the request metadata attached to them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use trustdesk_core::{AuditId, UserId};

use crate::changes::Changes;

/// Action codes recorded by callers outside the workflows
pub mod actions {
    pub const ACCOMMODATION_APPROVAL: &str = "ACCOMMODATION_APPROVAL";
    pub const USER_SUSPENSION: &str = "USER_SUSPENSION";
    pub const PAYMENT_EVENT: &str = "PAYMENT_EVENT";
    pub const RISK_EVALUATION: &str = "RISK_EVALUATION";
}

/// One immutable record of a sensitive action
///
/// `sequence`, `prev_hash` and `hash` are assigned by the sink on append;
/// a prepared but not yet appended entry has `sequence == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: AuditId,
    pub sequence: u64,
    /// `None` for system-initiated events (webhooks, escalation)
    pub actor_id: Option<UserId>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Canonical JSON of the change snapshot, `None` if it could not be encoded
    pub changes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub prev_hash: String,
    pub hash: String,
}

impl AuditLogEntry {
    /// Decode the change snapshot, if any
    pub fn changes(&self) -> Option<Changes> {
        self.changes.as_deref().and_then(|text| Changes::parse(text).ok())
    }

    pub fn is_sealed(&self) -> bool {
        self.sequence > 0 && !self.hash.is_empty()
    }

    pub fn is_system_event(&self) -> bool {
        self.actor_id.is_none()
    }
}

/// Requester metadata captured at the system boundary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address,
            user_agent,
        }
    }

    /// Build from raw HTTP headers (name, value), names compared case-insensitively.
    ///
    /// The client address is the first hop of `X-Forwarded-For`, falling back
    /// to `X-Real-IP`.
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut forwarded = None;
        let mut real_ip = None;
        let mut user_agent = None;

        for (name, value) in headers {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            if name.eq_ignore_ascii_case("x-forwarded-for") && forwarded.is_none() {
                forwarded = value
                    .split(',')
                    .next()
                    .map(str::trim)
                    .filter(|ip| !ip.is_empty())
                    .map(str::to_string);
            } else if name.eq_ignore_ascii_case("x-real-ip") && real_ip.is_none() {
                real_ip = Some(value.to_string());
            } else if name.eq_ignore_ascii_case("user-agent") && user_agent.is_none() {
                user_agent = Some(value.to_string());
            }
        }

        Self {
            ip_address: forwarded.or(real_ip),
            user_agent,
        }
    }
}
