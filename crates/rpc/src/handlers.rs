//! Role-gated operations
//!
//! Each handler pairs a [`RoleGate`] with one workflow call. The caller's
//! request metadata is attached to every audit entry the call produces.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use trustdesk_audit::{
    actions, verify_chain, AuditEvent, AuditLogEntry, AuditQuery, AuditSink, Changes,
};
use trustdesk_core::{BookingId, Clock, DisputeId, Money, TrustError, UserId, VerificationId};
use trustdesk_dispute::{Dispute, DisputeStatus};
use trustdesk_identity::{CodeConfirmation, IdentityVerification, VerificationStatus};
use trustdesk_risk::{RiskDecision, RiskSignalBuilder};

use crate::context::AppContext;
use crate::error::{RpcError, RpcResult};
use crate::roles::{Caller, Role, RoleGate, ADMINS, ANYONE, SCHEDULERS, USERS};

const SCORING: &[Role] = &[Role::System, Role::Admin, Role::SuperAdmin];

pub const FRAUD_CHECK: RoleGate = RoleGate::new("run a fraud check", SCORING);
pub const OPEN_DISPUTE: RoleGate = RoleGate::new("open a dispute", USERS);
pub const VIEW_DISPUTE: RoleGate = RoleGate::new("view a dispute", ANYONE);
pub const REVIEW_DISPUTE: RoleGate = RoleGate::new("review a dispute", ADMINS);
pub const CLOSE_DISPUTE: RoleGate = RoleGate::new("close a dispute", ADMINS);
pub const LIST_DISPUTES: RoleGate = RoleGate::new("list disputes", ADMINS);
pub const ESCALATE_DISPUTES: RoleGate = RoleGate::new("escalate stale disputes", SCHEDULERS);
pub const SUBMIT_IDENTITY: RoleGate = RoleGate::new("submit an identity document", USERS);
pub const VERIFY_PHONE: RoleGate = RoleGate::new("verify a phone number", USERS);
pub const REJECT_IDENTITY: RoleGate = RoleGate::new("reject an identity verification", ADMINS);
pub const LIST_IDENTITY: RoleGate = RoleGate::new("list identity verifications", ADMINS);
pub const EXPIRE_IDENTITY: RoleGate = RoleGate::new("expire verification codes", SCHEDULERS);
pub const READ_AUDIT: RoleGate = RoleGate::new("read the audit log", ADMINS);
pub const ADMIN_ACTION: RoleGate = RoleGate::new("record an admin action", ADMINS);
pub const PAYMENT_WEBHOOK: RoleGate = RoleGate::new("record a payment event", SCHEDULERS);

/// Plain code handed to the delivery channel, with the updated record
#[derive(Debug, Clone, Serialize)]
pub struct CodeIssued {
    pub verification: IdentityVerification,
    pub code: String,
}

/// Result of walking the audit hash chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub entries: usize,
    pub head_hash: Option<String>,
    pub valid: bool,
    pub error: Option<String>,
}

impl AppContext {
    /// Score a booking. With `booking_id` set the decision is also audited.
    pub fn fraud_check(
        &self,
        caller: &Caller,
        signal: RiskSignalBuilder,
        booking_id: Option<BookingId>,
    ) -> RpcResult<RiskDecision> {
        FRAUD_CHECK.invoke(caller, || {
            let signal = signal.build()?;
            let decision = self.risk.evaluate(&signal);

            if let Some(booking_id) = booking_id {
                let entry = self.recorder.record(
                    AuditEvent::new(actions::RISK_EVALUATION, "Booking", booking_id)
                        .actor(caller.user_id)
                        .request(caller.request.clone())
                        .changes(
                            Changes::new()
                                .with("score", decision.score)
                                .with("verdict", decision.verdict)
                                .with("rules_triggered", decision.rule_codes()),
                        ),
                )?;
                tracing::info!(
                    booking_id = %booking_id,
                    score = decision.score,
                    verdict = %decision.verdict,
                    audit_sequence = entry.sequence,
                    "Risk decision recorded"
                );
            }
            Ok(decision)
        })
    }

    /// Open a dispute as the calling user, optionally with the booking's risk decision
    pub fn open_dispute(
        &self,
        caller: &Caller,
        booking_id: BookingId,
        reason: &str,
        risk: Option<&RiskDecision>,
    ) -> RpcResult<Dispute> {
        OPEN_DISPUTE.invoke(caller, || {
            let initiator = caller.require_user(OPEN_DISPUTE.operation())?;
            let workflow = self.disputes.with_request(caller.request.clone());
            let dispute = match risk {
                Some(decision) => workflow.open_with_risk(booking_id, initiator, reason, decision)?,
                None => workflow.open(booking_id, initiator, reason)?,
            };
            Ok(dispute)
        })
    }

    /// Initiators see their own disputes; admins see all
    pub fn get_dispute(&self, caller: &Caller, id: DisputeId) -> RpcResult<Dispute> {
        VIEW_DISPUTE.invoke(caller, || {
            let dispute = self.disputes.get(id)?;
            if !caller.owns_or_admin(dispute.initiator_id) {
                return Err(forbidden(caller, VIEW_DISPUTE));
            }
            Ok(dispute)
        })
    }

    pub fn review_dispute(&self, caller: &Caller, id: DisputeId) -> RpcResult<Dispute> {
        REVIEW_DISPUTE.invoke(caller, || {
            let admin = caller.require_user(REVIEW_DISPUTE.operation())?;
            Ok(self
                .disputes
                .with_request(caller.request.clone())
                .begin_review(id, admin)?)
        })
    }

    pub fn resolve_dispute(
        &self,
        caller: &Caller,
        id: DisputeId,
        resolution: &str,
    ) -> RpcResult<Dispute> {
        CLOSE_DISPUTE.invoke(caller, || {
            let admin = caller.require_user(CLOSE_DISPUTE.operation())?;
            Ok(self
                .disputes
                .with_request(caller.request.clone())
                .resolve(id, admin, resolution)?)
        })
    }

    pub fn reject_dispute(&self, caller: &Caller, id: DisputeId, reason: &str) -> RpcResult<Dispute> {
        CLOSE_DISPUTE.invoke(caller, || {
            let admin = caller.require_user(CLOSE_DISPUTE.operation())?;
            Ok(self
                .disputes
                .with_request(caller.request.clone())
                .reject(id, admin, reason)?)
        })
    }

    /// Disputes in `status`, or every dispute on `booking_id`
    pub fn list_disputes(
        &self,
        caller: &Caller,
        status: Option<DisputeStatus>,
        booking_id: Option<BookingId>,
    ) -> RpcResult<Vec<Dispute>> {
        LIST_DISPUTES.invoke(caller, || {
            let disputes = match (status, booking_id) {
                (_, Some(booking_id)) => {
                    let mut all = self.disputes.list_for_booking(booking_id)?;
                    if let Some(status) = status {
                        all.retain(|d| d.status == status);
                    }
                    all
                }
                (Some(status), None) => self.disputes.list_by_status(status)?,
                (None, None) => {
                    return Err(TrustError::invalid_argument(
                        "either a status or a booking id is required",
                    )
                    .into())
                }
            };
            Ok(disputes)
        })
    }

    pub fn escalate_disputes(&self, caller: &Caller) -> RpcResult<Vec<DisputeId>> {
        ESCALATE_DISPUTES.invoke(caller, || Ok(self.disputes.escalate_stale(self.clock.now())?))
    }

    pub fn submit_identity(
        &self,
        caller: &Caller,
        document_type: &str,
        document_url: &str,
        force_replace: bool,
    ) -> RpcResult<IdentityVerification> {
        SUBMIT_IDENTITY.invoke(caller, || {
            let user = caller.require_user(SUBMIT_IDENTITY.operation())?;
            Ok(self.identity.with_request(caller.request.clone()).submit_document(
                user,
                document_type,
                document_url,
                force_replace,
            )?)
        })
    }

    pub fn send_phone_code(
        &self,
        caller: &Caller,
        id: VerificationId,
        phone_number: &str,
    ) -> RpcResult<CodeIssued> {
        VERIFY_PHONE.invoke(caller, || {
            self.own_verification(caller, id)?;
            let (verification, code) = self
                .identity
                .with_request(caller.request.clone())
                .request_phone_code(id, phone_number)?;
            Ok(CodeIssued { verification, code })
        })
    }

    pub fn confirm_phone_code(
        &self,
        caller: &Caller,
        id: VerificationId,
        code: &str,
    ) -> RpcResult<CodeConfirmation> {
        VERIFY_PHONE.invoke(caller, || {
            self.own_verification(caller, id)?;
            Ok(self
                .identity
                .with_request(caller.request.clone())
                .confirm_code(id, code, self.clock.now())?)
        })
    }

    pub fn reject_identity(
        &self,
        caller: &Caller,
        id: VerificationId,
        reason: &str,
    ) -> RpcResult<IdentityVerification> {
        REJECT_IDENTITY.invoke(caller, || {
            let reviewer = caller.require_user(REJECT_IDENTITY.operation())?;
            Ok(self
                .identity
                .with_request(caller.request.clone())
                .reject(id, reviewer, reason)?)
        })
    }

    pub fn identity_queue(
        &self,
        caller: &Caller,
        status: VerificationStatus,
    ) -> RpcResult<Vec<IdentityVerification>> {
        LIST_IDENTITY.invoke(caller, || Ok(self.identity.list_by_status(status)?))
    }

    pub fn expire_identity_codes(&self, caller: &Caller) -> RpcResult<Vec<VerificationId>> {
        EXPIRE_IDENTITY.invoke(caller, || Ok(self.identity.expire_overdue(self.clock.now())?))
    }

    pub fn audit_entries(&self, caller: &Caller, query: &AuditQuery) -> RpcResult<Vec<AuditLogEntry>> {
        READ_AUDIT.invoke(caller, || Ok(self.store_sink().query(query)?))
    }

    pub fn verify_audit(&self, caller: &Caller) -> RpcResult<ChainReport> {
        READ_AUDIT.invoke(caller, || {
            let entries = self.store_sink().read_all()?;
            let result = verify_chain(&entries);
            if let Err(e) = &result {
                tracing::error!(error = %e, "Audit chain verification failed");
            }
            Ok(ChainReport {
                entries: entries.len(),
                head_hash: entries.last().map(|e| e.hash.clone()),
                valid: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
            })
        })
    }

    pub fn approve_accommodation(&self, caller: &Caller, accommodation_id: Uuid) -> RpcResult<AuditLogEntry> {
        ADMIN_ACTION.invoke(caller, || {
            let admin = caller.require_user(ADMIN_ACTION.operation())?;
            Ok(self.recorder.accommodation_approval(admin, accommodation_id)?)
        })
    }

    pub fn suspend_user(&self, caller: &Caller, user_id: UserId, reason: &str) -> RpcResult<AuditLogEntry> {
        ADMIN_ACTION.invoke(caller, || {
            let admin = caller.require_user(ADMIN_ACTION.operation())?;
            Ok(self.recorder.user_suspension(admin, user_id, reason)?)
        })
    }

    pub fn payment_event(
        &self,
        caller: &Caller,
        booking_id: BookingId,
        amount: Option<&Money>,
        status: Option<&str>,
    ) -> RpcResult<AuditLogEntry> {
        PAYMENT_WEBHOOK.invoke(caller, || {
            Ok(self.recorder.payment_event(booking_id.into(), amount, status)?)
        })
    }

    fn store_sink(&self) -> &dyn AuditSink {
        self.store.as_ref()
    }

    fn own_verification(&self, caller: &Caller, id: VerificationId) -> RpcResult<()> {
        let record = self.identity.get(id)?;
        if caller.owns_or_admin(record.user_id) {
            Ok(())
        } else {
            Err(forbidden(caller, VERIFY_PHONE))
        }
    }
}

fn forbidden(caller: &Caller, gate: RoleGate) -> RpcError {
    tracing::warn!(
        role = %caller.role,
        user_id = ?caller.user_id,
        operation = gate.operation(),
        "Caller does not own the record"
    );
    RpcError::Forbidden {
        role: caller.role,
        operation: gate.operation(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use trustdesk_audit::RequestContext;
    use trustdesk_core::{ManualClock, SequentialIds};
    use trustdesk_risk::Verdict;

    use crate::config::TrustConfig;

    fn ctx() -> AppContext {
        AppContext::in_memory(
            Arc::new(ManualClock::at_epoch()),
            Arc::new(SequentialIds::with_codes(["482913"])),
            TrustConfig::default(),
        )
        .unwrap()
    }

    fn user(n: u128) -> UserId {
        UserId::from_uuid(Uuid::from_u128(70_000 + n))
    }

    fn booking(n: u128) -> BookingId {
        BookingId::from_uuid(Uuid::from_u128(60_000 + n))
    }

    fn risky_signal() -> RiskSignalBuilder {
        RiskSignalBuilder::default()
            .account_age_days(0)
            .email_verified(false)
            .phone_verified(false)
            .bookings_last_24h(9)
            .booking_amount(Money::parse("500", "USD").unwrap())
            .average_user_amount(Money::parse("100", "USD").unwrap())
            .vpn_detected(true)
    }

    #[test]
    fn test_fraud_check_records_decision() {
        let ctx = ctx();
        let decision = ctx
            .fraud_check(&Caller::system(), risky_signal(), Some(booking(1)))
            .unwrap();

        assert_eq!(decision.score, 120);
        assert_eq!(decision.verdict, Verdict::Block);

        let entries = ctx
            .audit_entries(&Caller::admin(user(9)), &AuditQuery::new().action(actions::RISK_EVALUATION))
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].actor_id, None);
        let changes = entries[0].changes().unwrap();
        assert_eq!(changes.get_str("verdict"), Some("BLOCK"));
    }

    #[test]
    fn test_fraud_check_without_booking_is_not_audited() {
        let ctx = ctx();
        ctx.fraud_check(&Caller::system(), risky_signal(), None).unwrap();

        let report = ctx.verify_audit(&Caller::admin(user(9))).unwrap();
        assert_eq!(report.entries, 0);
        assert!(report.valid);
    }

    #[test]
    fn test_users_cannot_score() {
        let ctx = ctx();
        let result = ctx.fraud_check(&Caller::user(user(1)), risky_signal(), None);
        assert!(matches!(result, Err(RpcError::Forbidden { .. })));
    }

    #[test]
    fn test_invalid_signal_is_invalid_argument() {
        let ctx = ctx();
        let err = ctx
            .fraud_check(&Caller::system(), RiskSignalBuilder::default(), None)
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
    }

    #[test]
    fn test_dispute_opened_by_caller_with_request_metadata() {
        let ctx = ctx();
        let caller = Caller::user(user(1)).with_request(RequestContext::new(
            Some("203.0.113.7".into()),
            Some("trustdesk-test".into()),
        ));

        let dispute = ctx.open_dispute(&caller, booking(1), "Heating broken", None).unwrap();
        assert_eq!(dispute.initiator_id, user(1));

        let entries = ctx
            .audit_entries(&Caller::admin(user(9)), &AuditQuery::new().entity("Dispute", dispute.id))
            .unwrap();
        assert_eq!(entries[0].ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(entries[0].actor_id, Some(user(1)));
    }

    #[test]
    fn test_dispute_severity_from_risk() {
        let ctx = ctx();
        let decision = ctx.fraud_check(&Caller::system(), risky_signal(), None).unwrap();
        let dispute = ctx
            .open_dispute(&Caller::user(user(1)), booking(1), "Host cancelled", Some(&decision))
            .unwrap();
        assert_eq!(dispute.severity, Verdict::Block);
    }

    #[test]
    fn test_only_admins_close_disputes() {
        let ctx = ctx();
        let dispute = ctx
            .open_dispute(&Caller::user(user(1)), booking(1), "Noise", None)
            .unwrap();

        let by_user = ctx.resolve_dispute(&Caller::user(user(1)), dispute.id, "refund");
        assert!(matches!(by_user, Err(RpcError::Forbidden { role: Role::User, .. })));

        let resolved = ctx
            .resolve_dispute(&Caller::admin(user(9)), dispute.id, "refund")
            .unwrap();
        assert_eq!(resolved.status, DisputeStatus::Resolved);
        assert_eq!(resolved.admin_id, Some(user(9)));
    }

    #[test]
    fn test_dispute_visibility() {
        let ctx = ctx();
        let dispute = ctx
            .open_dispute(&Caller::user(user(1)), booking(1), "Dirty linen", None)
            .unwrap();

        assert!(ctx.get_dispute(&Caller::user(user(1)), dispute.id).is_ok());
        assert!(ctx.get_dispute(&Caller::admin(user(9)), dispute.id).is_ok());
        assert!(matches!(
            ctx.get_dispute(&Caller::user(user(2)), dispute.id),
            Err(RpcError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_list_disputes_needs_a_filter() {
        let ctx = ctx();
        let err = ctx
            .list_disputes(&Caller::admin(user(9)), None, None)
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
    }

    #[test]
    fn test_list_disputes_for_booking_filtered_by_status() {
        let ctx = ctx();
        let first = ctx.open_dispute(&Caller::user(user(1)), booking(1), "A", None).unwrap();
        ctx.open_dispute(&Caller::user(user(2)), booking(1), "B", None).unwrap();
        ctx.review_dispute(&Caller::admin(user(9)), first.id).unwrap();

        let admin = Caller::admin(user(9));
        assert_eq!(ctx.list_disputes(&admin, None, Some(booking(1))).unwrap().len(), 2);
        let open = ctx
            .list_disputes(&admin, Some(DisputeStatus::Open), Some(booking(1)))
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].initiator_id, user(2));
    }

    #[test]
    fn test_escalation_is_for_schedulers() {
        let ctx = ctx();
        assert!(ctx.escalate_disputes(&Caller::admin(user(9))).is_err());
        assert!(ctx.escalate_disputes(&Caller::system()).unwrap().is_empty());
    }

    #[test]
    fn test_phone_code_flow_for_owner() {
        let ctx = ctx();
        let owner = Caller::user(user(1));
        let record = ctx
            .submit_identity(&owner, "passport", "s3://kyc/1", false)
            .unwrap();

        let stranger = Caller::user(user(2));
        assert!(matches!(
            ctx.send_phone_code(&stranger, record.id, "+1 202 555 0143"),
            Err(RpcError::Forbidden { .. })
        ));

        let issued = ctx.send_phone_code(&owner, record.id, "+1 202 555 0143").unwrap();
        assert_eq!(issued.code, "482913");
        assert_eq!(issued.verification.status, VerificationStatus::CodeSent);

        let confirmed = ctx.confirm_phone_code(&owner, record.id, "482913").unwrap();
        assert_eq!(confirmed.verification.status, VerificationStatus::Verified);
    }

    #[test]
    fn test_identity_rejection_and_queue() {
        let ctx = ctx();
        let record = ctx
            .submit_identity(&Caller::user(user(1)), "id_card", "s3://kyc/2", false)
            .unwrap();
        let admin = Caller::admin(user(9));

        assert_eq!(ctx.identity_queue(&admin, VerificationStatus::Pending).unwrap().len(), 1);
        assert!(ctx
            .reject_identity(&Caller::user(user(1)), record.id, "blurry")
            .is_err());

        let rejected = ctx.reject_identity(&admin, record.id, "blurry").unwrap();
        assert_eq!(rejected.status, VerificationStatus::Rejected);
        assert!(ctx.identity_queue(&admin, VerificationStatus::Pending).unwrap().is_empty());
    }

    #[test]
    fn test_system_cannot_submit_documents() {
        let ctx = ctx();
        let result = ctx.submit_identity(&Caller::system(), "passport", "s3://kyc/3", false);
        assert!(matches!(result, Err(RpcError::Forbidden { role: Role::System, .. })));
    }

    #[test]
    fn test_convenience_recorders() {
        let ctx = ctx();
        let admin = Caller::admin(user(9));

        ctx.approve_accommodation(&admin, Uuid::from_u128(5)).unwrap();
        ctx.suspend_user(&admin, user(1), "chargeback fraud").unwrap();
        let amount = Money::new(Decimal::new(12_500, 2), "EUR".parse().unwrap()).unwrap();
        let payment = ctx
            .payment_event(&Caller::system(), booking(1), Some(&amount), Some("CAPTURED"))
            .unwrap();

        assert_eq!(payment.actor_id, None);
        assert_eq!(payment.sequence, 3);
        assert!(ctx.payment_event(&admin, booking(1), None, None).is_err());
        assert!(ctx.verify_audit(&admin).unwrap().valid);
    }

    #[test]
    fn test_audit_is_admin_only() {
        let ctx = ctx();
        let result = ctx.verify_audit(&Caller::user(user(1)));
        assert!(matches!(result, Err(RpcError::Forbidden { .. })));
    }
}
