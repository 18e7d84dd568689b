//! Dispute resolution workflow
//!
//! ```text
//! OPEN ──begin_review──▶ UNDER_REVIEW ──resolve──▶ RESOLVED
//!   │                          └───────reject────▶ REJECTED
//!   └──── resolve / reject (fast track) ─────────▶ RESOLVED / REJECTED
//! ```
//!
//! RESOLVED and REJECTED are terminal. Every transition, including creation,
//! is committed with one audit entry.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use trustdesk_audit::{AuditEvent, AuditRecorder, Changes, RequestContext};
use trustdesk_core::{BookingId, Clock, DisputeId, IdGenerator, TrustError, TrustResult, UserId};
use trustdesk_risk::{RiskDecision, Verdict};

use crate::config::DisputePolicy;
use crate::dispute::{Dispute, DisputeStatus, ENTITY_TYPE};
use crate::repository::DisputeRepository;

/// Dispute state machine over an injected repository
#[derive(Clone)]
pub struct DisputeWorkflow {
    repo: Arc<dyn DisputeRepository>,
    recorder: AuditRecorder,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    policy: DisputePolicy,
    request: RequestContext,
}

impl DisputeWorkflow {
    pub fn new(
        repo: Arc<dyn DisputeRepository>,
        recorder: AuditRecorder,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        policy: DisputePolicy,
    ) -> Self {
        Self {
            repo,
            recorder,
            clock,
            ids,
            policy,
            request: RequestContext::default(),
        }
    }

    /// Copy of this workflow whose audit entries carry the caller's ip/user-agent
    pub fn with_request(&self, request: RequestContext) -> Self {
        Self {
            request,
            ..self.clone()
        }
    }

    pub fn policy(&self) -> &DisputePolicy {
        &self.policy
    }

    pub fn get(&self, id: DisputeId) -> TrustResult<Dispute> {
        self.repo.get(id)
    }

    pub fn list_by_status(&self, status: DisputeStatus) -> TrustResult<Vec<Dispute>> {
        self.repo.list_by_status(status)
    }

    pub fn list_for_booking(&self, booking_id: BookingId) -> TrustResult<Vec<Dispute>> {
        self.repo.list_for_booking(booking_id)
    }

    /// Raise a dispute with default severity
    pub fn open(
        &self,
        booking_id: BookingId,
        initiator_id: UserId,
        reason: &str,
    ) -> TrustResult<Dispute> {
        self.open_with_severity(booking_id, initiator_id, reason, Verdict::default())
    }

    /// Raise a dispute whose urgency follows the booking's risk decision
    pub fn open_with_risk(
        &self,
        booking_id: BookingId,
        initiator_id: UserId,
        reason: &str,
        decision: &RiskDecision,
    ) -> TrustResult<Dispute> {
        self.open_with_severity(booking_id, initiator_id, reason, decision.verdict)
    }

    fn open_with_severity(
        &self,
        booking_id: BookingId,
        initiator_id: UserId,
        reason: &str,
        severity: Verdict,
    ) -> TrustResult<Dispute> {
        if booking_id.as_uuid().is_nil() {
            return Err(TrustError::invalid_argument("booking_id is required"));
        }
        if initiator_id.as_uuid().is_nil() {
            return Err(TrustError::invalid_argument("initiator_id is required"));
        }
        let reason = self.text("reason", reason)?;

        let dispute = Dispute::new(
            DisputeId::from_uuid(self.ids.next_uuid()),
            booking_id,
            initiator_id,
            reason,
            severity,
            self.clock.now(),
        );
        let audit = self.recorder.prepare(
            self.event(&dispute, Some(initiator_id)).changes(
                transition_changes(None, &dispute)
                    .with("booking_id", booking_id)
                    .with("reason", &dispute.reason)
                    .with("severity", severity.to_string()),
            ),
        );
        let sealed = self.repo.insert(&dispute, audit)?;

        tracing::info!(
            dispute_id = %dispute.id,
            booking_id = %booking_id,
            initiator_id = %initiator_id,
            severity = %severity,
            audit_sequence = sealed.sequence,
            "Dispute opened"
        );
        Ok(dispute)
    }

    /// Admin takes an OPEN dispute
    pub fn begin_review(&self, id: DisputeId, admin_id: UserId) -> TrustResult<Dispute> {
        let mut dispute = self.repo.get(id)?;
        if dispute.status != DisputeStatus::Open {
            return Err(TrustError::invalid_state(ENTITY_TYPE, id, dispute.status, "review"));
        }

        let from = dispute.status;
        let expected = dispute.touch(self.clock.now());
        dispute.status = DisputeStatus::UnderReview;
        dispute.admin_id = Some(admin_id);

        self.commit(&dispute, from, expected, Some(admin_id), Changes::new())?;
        Ok(dispute)
    }

    /// Close in the initiator's favour. Allowed from OPEN as a fast track.
    pub fn resolve(&self, id: DisputeId, admin_id: UserId, resolution: &str) -> TrustResult<Dispute> {
        self.close(id, admin_id, resolution, DisputeStatus::Resolved, "resolve")
    }

    /// Close as without merit. Same preconditions as [`DisputeWorkflow::resolve`].
    pub fn reject(&self, id: DisputeId, admin_id: UserId, resolution: &str) -> TrustResult<Dispute> {
        self.close(id, admin_id, resolution, DisputeStatus::Rejected, "reject")
    }

    fn close(
        &self,
        id: DisputeId,
        admin_id: UserId,
        resolution: &str,
        target: DisputeStatus,
        operation: &'static str,
    ) -> TrustResult<Dispute> {
        let resolution = self.text("resolution", resolution)?;
        let mut dispute = self.repo.get(id)?;
        if dispute.status.is_terminal() {
            return Err(TrustError::invalid_state(ENTITY_TYPE, id, dispute.status, operation));
        }

        let from = dispute.status;
        let now = self.clock.now();
        let expected = dispute.touch(now);
        dispute.status = target;
        dispute.admin_id = Some(admin_id);
        dispute.resolution = Some(resolution.to_string());
        dispute.closed_at = Some(now);

        let extra = Changes::new().with("fast_track", from == DisputeStatus::Open);
        self.commit(&dispute, from, expected, Some(admin_id), extra)?;
        Ok(dispute)
    }

    /// Move OPEN disputes that have waited past their severity window to
    /// UNDER_REVIEW. System-initiated: entries carry no actor. Disputes an
    /// admin touched in the meantime are skipped.
    pub fn escalate_stale(&self, now: DateTime<Utc>) -> TrustResult<Vec<DisputeId>> {
        let mut escalated = Vec::new();

        for mut dispute in self.repo.list_by_status(DisputeStatus::Open)? {
            if dispute.age(now) < self.policy.escalation_window(dispute.severity) {
                continue;
            }
            let from = dispute.status;
            let expected = dispute.touch(now);
            dispute.status = DisputeStatus::UnderReview;

            let extra = Changes::new().with("escalated", true);
            match self.commit(&dispute, from, expected, None, extra) {
                Ok(()) => escalated.push(dispute.id),
                Err(e) if e.is_retryable() => {
                    tracing::debug!(dispute_id = %dispute.id, "Skipped escalation of concurrently modified dispute");
                }
                Err(e) => return Err(e),
            }
        }

        if !escalated.is_empty() {
            tracing::info!(count = escalated.len(), "Escalated stale disputes");
        }
        Ok(escalated)
    }

    fn commit(
        &self,
        dispute: &Dispute,
        from: DisputeStatus,
        expected: u64,
        actor: Option<UserId>,
        extra: Changes,
    ) -> TrustResult<()> {
        let mut changes = transition_changes(Some(from), dispute);
        for key in extra.keys() {
            if let Some(value) = extra.get(key) {
                changes.insert(key, value);
            }
        }

        let audit = self.recorder.prepare(self.event(dispute, actor).changes(changes));
        let sealed = self.repo.update(dispute, expected, audit)?;

        tracing::info!(
            dispute_id = %dispute.id,
            from = %from,
            to = %dispute.status,
            actor_id = ?actor,
            audit_sequence = sealed.sequence,
            "Dispute transition committed"
        );
        Ok(())
    }

    fn event(&self, dispute: &Dispute, actor: Option<UserId>) -> AuditEvent {
        AuditEvent::new(dispute.status.audit_action(), ENTITY_TYPE, dispute.id)
            .actor(actor)
            .request(self.request.clone())
    }

    fn text<'a>(&self, field: &str, value: &'a str) -> TrustResult<&'a str> {
        let value = value.trim();
        if value.is_empty() {
            return Err(TrustError::invalid_argument(format!("{} must not be blank", field)));
        }
        if value.chars().count() > self.policy.max_text_length {
            return Err(TrustError::invalid_argument(format!(
                "{} exceeds {} characters",
                field, self.policy.max_text_length
            )));
        }
        Ok(value)
    }
}

fn transition_changes(from: Option<DisputeStatus>, dispute: &Dispute) -> Changes {
    let mut changes = Changes::new()
        .with("previous_status", from.map(|s| s.to_string()))
        .with("new_status", dispute.status.to_string())
        .with("initiator_id", dispute.initiator_id);
    if let Some(admin) = dispute.admin_id {
        changes.insert("admin_id", admin);
    }
    if let Some(resolution) = &dispute.resolution {
        changes.insert("resolution", resolution);
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryDisputeStore;
    use chrono::Duration;
    use trustdesk_audit::{AuditSink, MemoryAuditLog};
    use trustdesk_core::{ManualClock, SequentialIds};
    use trustdesk_risk::RuleHit;
    use uuid::Uuid;

    struct Harness {
        workflow: DisputeWorkflow,
        clock: Arc<ManualClock>,
        log: Arc<MemoryAuditLog>,
    }

    fn harness() -> Harness {
        let log = Arc::new(MemoryAuditLog::new());
        let clock = Arc::new(ManualClock::at_epoch());
        let ids = Arc::new(SequentialIds::new());
        let recorder = AuditRecorder::new(log.clone(), clock.clone(), ids.clone());
        let repo = Arc::new(MemoryDisputeStore::new(log.clone()));
        let workflow = DisputeWorkflow::new(repo, recorder, clock.clone(), ids, DisputePolicy::default());
        Harness { workflow, clock, log }
    }

    fn booking() -> BookingId {
        BookingId::from_uuid(Uuid::from_u128(7_001))
    }

    fn guest() -> UserId {
        UserId::from_uuid(Uuid::from_u128(7_002))
    }

    fn admin() -> UserId {
        UserId::from_uuid(Uuid::from_u128(7_003))
    }

    #[test]
    fn test_open_starts_open_and_audits() {
        let h = harness();
        let dispute = h.workflow.open(booking(), guest(), "Host cancelled on arrival").unwrap();

        assert_eq!(dispute.status, DisputeStatus::Open);
        assert_eq!(dispute.severity, Verdict::Allow);
        let entry = h.log.read_all().unwrap().pop().unwrap();
        assert_eq!(entry.action, "DISPUTE_OPEN");
        assert_eq!(entry.actor_id, Some(guest()));
        assert_eq!(entry.entity_id, *dispute.id.as_uuid());
    }

    #[test]
    fn test_blank_reason_rejected() {
        let h = harness();
        let result = h.workflow.open(booking(), guest(), "   ");
        assert!(matches!(result, Err(TrustError::InvalidArgument(_))));
        assert!(h.log.is_empty());
    }

    #[test]
    fn test_missing_booking_rejected() {
        let h = harness();
        let result = h.workflow.open(BookingId::from_uuid(Uuid::nil()), guest(), "no show");
        assert!(matches!(result, Err(TrustError::InvalidArgument(_))));
    }

    #[test]
    fn test_overlong_reason_rejected() {
        let h = harness();
        let reason = "x".repeat(4_001);
        let result = h.workflow.open(booking(), guest(), &reason);
        assert!(matches!(result, Err(TrustError::InvalidArgument(_))));
    }

    #[test]
    fn test_review_then_resolve() {
        let h = harness();
        let dispute = h.workflow.open(booking(), guest(), "Dirty room").unwrap();

        let reviewing = h.workflow.begin_review(dispute.id, admin()).unwrap();
        assert_eq!(reviewing.status, DisputeStatus::UnderReview);
        assert_eq!(reviewing.admin_id, Some(admin()));

        let resolved = h.workflow.resolve(dispute.id, admin(), "Partial refund of 50%").unwrap();
        assert_eq!(resolved.status, DisputeStatus::Resolved);
        assert_eq!(resolved.closed_at, Some(h.clock.now()));

        let last = h.log.read_all().unwrap().pop().unwrap();
        let changes = last.changes().unwrap();
        assert_eq!(last.action, "DISPUTE_RESOLVED");
        assert_eq!(changes.get_str("previous_status"), Some("UNDER_REVIEW"));
        assert_eq!(changes.get_str("new_status"), Some("RESOLVED"));
        assert_eq!(changes.get_str("resolution"), Some("Partial refund of 50%"));
        assert_eq!(changes.get("fast_track"), Some(&serde_json::Value::Bool(false)));
    }

    #[test]
    fn test_fast_track_resolve_then_terminal() {
        let h = harness();
        let dispute = h.workflow.open(booking(), guest(), "Charged twice").unwrap();

        let resolved = h.workflow.resolve(dispute.id, admin(), "Duplicate charge refunded").unwrap();
        assert_eq!(resolved.status, DisputeStatus::Resolved);

        let again = h.workflow.resolve(dispute.id, admin(), "again");
        assert!(matches!(again, Err(TrustError::InvalidState { .. })));
        assert_eq!(h.log.len(), 2);
    }

    #[test]
    fn test_blank_resolution_rejected() {
        let h = harness();
        let dispute = h.workflow.open(booking(), guest(), "Charged twice").unwrap();
        let result = h.workflow.reject(dispute.id, admin(), "");
        assert!(matches!(result, Err(TrustError::InvalidArgument(_))));
        assert_eq!(h.workflow.get(dispute.id).unwrap().status, DisputeStatus::Open);
    }

    #[test]
    fn test_reject_is_terminal() {
        let h = harness();
        let dispute = h.workflow.open(booking(), guest(), "Noise").unwrap();
        h.workflow.begin_review(dispute.id, admin()).unwrap();
        h.workflow.reject(dispute.id, admin(), "Quiet hours were respected").unwrap();

        assert!(matches!(
            h.workflow.begin_review(dispute.id, admin()),
            Err(TrustError::InvalidState { .. })
        ));
        assert!(matches!(
            h.workflow.resolve(dispute.id, admin(), "reopen"),
            Err(TrustError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_review_twice_is_invalid_state() {
        let h = harness();
        let dispute = h.workflow.open(booking(), guest(), "Noise").unwrap();
        h.workflow.begin_review(dispute.id, admin()).unwrap();
        assert!(matches!(
            h.workflow.begin_review(dispute.id, admin()),
            Err(TrustError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_unknown_dispute_not_found() {
        let h = harness();
        let result = h.workflow.begin_review(DisputeId::from_uuid(Uuid::from_u128(42)), admin());
        assert!(matches!(result, Err(TrustError::NotFound { .. })));
    }

    #[test]
    fn test_escalation_windows_by_severity() {
        let h = harness();
        let blocked = RiskDecision {
            score: 85,
            verdict: Verdict::Block,
            rules_triggered: vec![RuleHit { code: "NEW_ACCOUNT".to_string(), weight: 25 }],
        };
        let urgent = h.workflow.open_with_risk(booking(), guest(), "Card not mine", &blocked).unwrap();
        let routine = h.workflow.open(booking(), guest(), "Late check-in").unwrap();

        let first = h.workflow.escalate_stale(h.clock.now()).unwrap();
        assert_eq!(first, vec![urgent.id]);

        h.clock.advance(Duration::hours(71));
        assert!(h.workflow.escalate_stale(h.clock.now()).unwrap().is_empty());

        h.clock.advance(Duration::hours(1));
        assert_eq!(h.workflow.escalate_stale(h.clock.now()).unwrap(), vec![routine.id]);

        let entry = h.log.history(ENTITY_TYPE, routine.id.into()).unwrap().pop().unwrap();
        assert_eq!(entry.action, "DISPUTE_UNDER_REVIEW");
        assert!(entry.is_system_event());
    }

    #[test]
    fn test_list_by_status() {
        let h = harness();
        let a = h.workflow.open(booking(), guest(), "one").unwrap();
        h.workflow.open(booking(), guest(), "two").unwrap();
        h.workflow.begin_review(a.id, admin()).unwrap();

        assert_eq!(h.workflow.list_by_status(DisputeStatus::Open).unwrap().len(), 1);
        assert_eq!(h.workflow.list_by_status(DisputeStatus::UnderReview).unwrap().len(), 1);
        assert_eq!(h.workflow.list_for_booking(booking()).unwrap().len(), 2);
    }
}
