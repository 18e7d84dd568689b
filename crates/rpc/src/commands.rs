//! CLI commands
//!
//! Thin adapters from parsed arguments to the gated handlers. Every command
//! returns the JSON document the binary prints on stdout.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use trustdesk_audit::AuditQuery;
use trustdesk_core::{BookingId, DisputeId, TrustError, UserId, VerificationId};
use trustdesk_dispute::DisputeStatus;
use trustdesk_identity::VerificationStatus;
use trustdesk_risk::{RiskDecision, RiskSignalBuilder};

use crate::context::AppContext;
use crate::error::RpcResult;
use crate::roles::Caller;

fn to_json<T: Serialize>(value: &T) -> RpcResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| TrustError::SerializationFailure(e.to_string()).into())
}

fn parse_json<T: serde::de::DeserializeOwned>(what: &str, text: &str) -> RpcResult<T> {
    serde_json::from_str(text)
        .map_err(|e| TrustError::invalid_argument(format!("{} is not valid JSON: {}", what, e)).into())
}

/// Score a booking from a JSON signal bundle
pub fn fraud_check(
    ctx: &AppContext,
    caller: &Caller,
    signal: &str,
    booking_id: Option<BookingId>,
) -> RpcResult<Value> {
    let signal: RiskSignalBuilder = parse_json("signal", signal)?;
    let decision = ctx.fraud_check(caller, signal, booking_id)?;
    to_json(&decision)
}

/// Open a dispute; `risk` is a JSON `RiskDecision` from an earlier fraud check
pub fn dispute_open(
    ctx: &AppContext,
    caller: &Caller,
    booking_id: BookingId,
    reason: &str,
    risk: Option<&str>,
) -> RpcResult<Value> {
    let risk: Option<RiskDecision> = risk.map(|text| parse_json("risk", text)).transpose()?;
    let dispute = ctx.open_dispute(caller, booking_id, reason, risk.as_ref())?;
    to_json(&dispute)
}

pub fn dispute_show(ctx: &AppContext, caller: &Caller, id: DisputeId) -> RpcResult<Value> {
    to_json(&ctx.get_dispute(caller, id)?)
}

pub fn dispute_review(ctx: &AppContext, caller: &Caller, id: DisputeId) -> RpcResult<Value> {
    to_json(&ctx.review_dispute(caller, id)?)
}

pub fn dispute_resolve(
    ctx: &AppContext,
    caller: &Caller,
    id: DisputeId,
    resolution: &str,
) -> RpcResult<Value> {
    to_json(&ctx.resolve_dispute(caller, id, resolution)?)
}

pub fn dispute_reject(ctx: &AppContext, caller: &Caller, id: DisputeId, reason: &str) -> RpcResult<Value> {
    to_json(&ctx.reject_dispute(caller, id, reason)?)
}

pub fn dispute_escalate(ctx: &AppContext, caller: &Caller) -> RpcResult<Value> {
    let escalated = ctx.escalate_disputes(caller)?;
    Ok(json!({ "escalated": escalated }))
}

pub fn dispute_list(
    ctx: &AppContext,
    caller: &Caller,
    status: Option<DisputeStatus>,
    booking_id: Option<BookingId>,
) -> RpcResult<Value> {
    to_json(&ctx.list_disputes(caller, status, booking_id)?)
}

pub fn identity_submit(
    ctx: &AppContext,
    caller: &Caller,
    document_type: &str,
    document_url: &str,
    force_replace: bool,
) -> RpcResult<Value> {
    to_json(&ctx.submit_identity(caller, document_type, document_url, force_replace)?)
}

pub fn identity_send_code(
    ctx: &AppContext,
    caller: &Caller,
    id: VerificationId,
    phone_number: &str,
) -> RpcResult<Value> {
    to_json(&ctx.send_phone_code(caller, id, phone_number)?)
}

pub fn identity_confirm(
    ctx: &AppContext,
    caller: &Caller,
    id: VerificationId,
    code: &str,
) -> RpcResult<Value> {
    to_json(&ctx.confirm_phone_code(caller, id, code)?)
}

pub fn identity_reject(
    ctx: &AppContext,
    caller: &Caller,
    id: VerificationId,
    reason: &str,
) -> RpcResult<Value> {
    to_json(&ctx.reject_identity(caller, id, reason)?)
}

pub fn identity_list(ctx: &AppContext, caller: &Caller, status: VerificationStatus) -> RpcResult<Value> {
    to_json(&ctx.identity_queue(caller, status)?)
}

pub fn identity_expire(ctx: &AppContext, caller: &Caller) -> RpcResult<Value> {
    let expired = ctx.expire_identity_codes(caller)?;
    Ok(json!({ "expired": expired }))
}

/// Filters for `audit list`, all optional
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<uuid::Uuid>,
    pub actor_id: Option<UserId>,
    pub action: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn into_query(self) -> AuditQuery {
        AuditQuery {
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            actor_id: self.actor_id,
            action: self.action.map(|a| a.to_uppercase()),
            from: self.from,
            to: self.to,
            limit: self.limit,
        }
    }
}

pub fn audit_list(ctx: &AppContext, caller: &Caller, filter: AuditFilter) -> RpcResult<Value> {
    to_json(&ctx.audit_entries(caller, &filter.into_query())?)
}

pub fn audit_verify(ctx: &AppContext, caller: &Caller) -> RpcResult<Value> {
    to_json(&ctx.verify_audit(caller)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use trustdesk_core::{ManualClock, SequentialIds};
    use uuid::Uuid;

    use crate::config::TrustConfig;

    fn ctx() -> AppContext {
        AppContext::in_memory(
            Arc::new(ManualClock::at_epoch()),
            Arc::new(SequentialIds::new()),
            TrustConfig::default(),
        )
        .unwrap()
    }

    const CLEAN_SIGNAL: &str = r#"{
        "account_age_days": 30,
        "email_verified": true,
        "phone_verified": true,
        "bookings_last_24h": 1,
        "booking_amount": { "amount": "100", "currency": "USD" },
        "average_user_amount": { "amount": "100", "currency": "USD" },
        "vpn_detected": false
    }"#;

    #[test]
    fn test_fraud_check_json() {
        let ctx = ctx();
        let out = fraud_check(&ctx, &Caller::system(), CLEAN_SIGNAL, None).unwrap();

        assert_eq!(out["score"], 0);
        assert_eq!(out["verdict"], "ALLOW");
        assert_eq!(out["rules_triggered"], json!([]));
    }

    #[test]
    fn test_malformed_signal_is_invalid_argument() {
        let ctx = ctx();
        let err = fraud_check(&ctx, &Caller::system(), "{not json", None).unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
    }

    #[test]
    fn test_open_with_risk_json() {
        let ctx = ctx();
        let decision = r#"{ "score": 55, "verdict": "REVIEW", "rules_triggered": [] }"#;
        let caller = Caller::user(UserId::from_uuid(Uuid::from_u128(1)));
        let booking = BookingId::from_uuid(Uuid::from_u128(2));

        let out = dispute_open(&ctx, &caller, booking, "Broken lock", Some(decision)).unwrap();
        assert_eq!(out["status"], "OPEN");
        assert_eq!(out["severity"], "REVIEW");
    }

    #[test]
    fn test_audit_filter_uppercases_action() {
        let query = AuditFilter {
            action: Some("dispute_open".to_string()),
            limit: Some(5),
            ..AuditFilter::default()
        }
        .into_query();

        assert_eq!(query.action.as_deref(), Some("DISPUTE_OPEN"));
        assert_eq!(query.limit, Some(5));
    }
}
