//! Identity verification workflow
//!
//! ```text
//! PENDING ──request_phone_code──▶ CODE_SENT ──confirm_code──▶ VERIFIED
//!    │                               │  ├── past deadline ──▶ EXPIRED
//!    │                               │  └── too many misses ─▶ REJECTED
//!    └──────────── reject ───────────┴──────────────────────▶ REJECTED
//! ```
//!
//! Each status change is committed together with exactly one audit entry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use trustdesk_audit::{AuditEvent, AuditRecorder, Changes, RequestContext};
use trustdesk_core::{Clock, IdGenerator, TrustError, TrustResult, UserId, VerificationId};

use crate::config::IdentityPolicy;
use crate::repository::VerificationRepository;
use crate::verification::{mask_phone, IdentityVerification, VerificationStatus, ENTITY_TYPE};

/// Reason stored on a record retired by a forced resubmission
pub const SUPERSEDED: &str = "superseded";
/// Reason stored when the attempt limit is reached
pub const TOO_MANY_ATTEMPTS: &str = "too many failed code attempts";

/// Result of one `confirm_code` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmOutcome {
    Verified,
    /// Wrong code, record stays in CODE_SENT
    Mismatch { attempts_remaining: u32 },
    Rejected,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeConfirmation {
    pub verification: IdentityVerification,
    #[serde(flatten)]
    pub outcome: ConfirmOutcome,
}

/// Identity verification state machine over an injected repository
#[derive(Clone)]
pub struct IdentityWorkflow {
    repo: Arc<dyn VerificationRepository>,
    recorder: AuditRecorder,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    policy: IdentityPolicy,
    request: RequestContext,
}

impl IdentityWorkflow {
    pub fn new(
        repo: Arc<dyn VerificationRepository>,
        recorder: AuditRecorder,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        policy: IdentityPolicy,
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

    pub fn policy(&self) -> &IdentityPolicy {
        &self.policy
    }

    pub fn get(&self, id: VerificationId) -> TrustResult<IdentityVerification> {
        self.repo.get(id)
    }

    pub fn latest_for_user(&self, user_id: UserId) -> TrustResult<Option<IdentityVerification>> {
        self.repo.latest_for_user(user_id)
    }

    /// Review queue for admins
    pub fn list_by_status(&self, status: VerificationStatus) -> TrustResult<Vec<IdentityVerification>> {
        self.repo.list_by_status(status)
    }

    /// Start a verification attempt with a submitted document.
    ///
    /// An existing non-terminal attempt is a `DuplicateSubmission` unless
    /// `force_replace` is set, in which case it is rejected as superseded.
    pub fn submit_document(
        &self,
        user_id: UserId,
        document_type: &str,
        document_url: &str,
        force_replace: bool,
    ) -> TrustResult<IdentityVerification> {
        let document_type = required("document_type", document_type)?;
        let document_url = required("document_url", document_url)?;

        let now = self.clock.now();
        let created = IdentityVerification::new(
            VerificationId::from_uuid(self.ids.next_uuid()),
            user_id,
            document_type.to_uppercase(),
            document_url,
            now,
        );
        let created_audit = self.recorder.prepare(
            self.event(&created, Some(user_id))
                .changes(transition_changes(None, &created).with("document_type", &created.document_type)),
        );

        match self.repo.active_for_user(user_id)? {
            None => {
                let sealed = self.repo.insert(&created, created_audit)?;
                tracing::info!(
                    verification_id = %created.id,
                    user_id = %user_id,
                    audit_sequence = sealed.sequence,
                    "Identity document submitted"
                );
            }
            Some(existing) if !force_replace => {
                tracing::warn!(
                    verification_id = %existing.id,
                    user_id = %user_id,
                    status = %existing.status,
                    "Duplicate identity submission"
                );
                return Err(TrustError::DuplicateSubmission(format!(
                    "user {} already has verification {} in status {}",
                    user_id, existing.id, existing.status
                )));
            }
            Some(mut previous) => {
                let from = previous.status;
                let expected = previous.touch(now);
                previous.status = VerificationStatus::Rejected;
                previous.rejection_reason = Some(SUPERSEDED.to_string());

                let previous_audit = self.recorder.prepare(
                    self.event(&previous, Some(user_id)).changes(
                        transition_changes(Some(from), &previous)
                            .with("reason", SUPERSEDED)
                            .with("superseded_by", created.id),
                    ),
                );
                self.repo
                    .replace(&previous, expected, previous_audit, &created, created_audit)?;
                tracing::info!(
                    verification_id = %created.id,
                    superseded = %previous.id,
                    user_id = %user_id,
                    "Identity document resubmitted"
                );
            }
        }

        Ok(created)
    }

    /// Send a phone code. Returns the plain code once, for the delivery channel.
    pub fn request_phone_code(
        &self,
        id: VerificationId,
        phone_number: &str,
    ) -> TrustResult<(IdentityVerification, String)> {
        let phone_number = validate_phone(phone_number)?;
        let mut record = self.repo.get(id)?;
        if record.status != VerificationStatus::Pending {
            return Err(TrustError::invalid_state(
                ENTITY_TYPE,
                id,
                record.status,
                "request a phone code for",
            ));
        }

        let now = self.clock.now();
        let code = self.ids.next_code(self.policy.code_length);
        let from = record.status;
        let expected = record.touch(now);
        record.phone_number = Some(phone_number.to_string());
        record.set_code(&code, now + self.policy.code_ttl());
        record.status = VerificationStatus::CodeSent;

        let audit = self.recorder.prepare(
            self.event(&record, Some(record.user_id)).changes(
                transition_changes(Some(from), &record)
                    .with("phone_number", mask_phone(phone_number))
                    .with("code_expires_at", record.code_expires_at),
            ),
        );
        self.repo.update(&record, expected, Some(audit))?;

        tracing::info!(
            verification_id = %id,
            user_id = %record.user_id,
            expires_at = ?record.code_expires_at,
            "Verification code issued"
        );
        Ok((record, code))
    }

    /// Check a submitted code as of `now`
    pub fn confirm_code(
        &self,
        id: VerificationId,
        submitted_code: &str,
        now: DateTime<Utc>,
    ) -> TrustResult<CodeConfirmation> {
        let mut record = self.repo.get(id)?;
        if record.status != VerificationStatus::CodeSent {
            return Err(TrustError::invalid_state(
                ENTITY_TYPE,
                id,
                record.status,
                "confirm a code for",
            ));
        }

        let from = record.status;
        let expected = record.touch(now);

        let outcome = if record.code_expired(now) {
            record.status = VerificationStatus::Expired;
            record.code_hash = None;
            ConfirmOutcome::Expired
        } else if record.code_matches(submitted_code) {
            record.status = VerificationStatus::Verified;
            record.code_hash = None;
            ConfirmOutcome::Verified
        } else {
            record.failed_attempts += 1;
            if record.failed_attempts >= self.policy.max_failed_attempts {
                record.status = VerificationStatus::Rejected;
                record.rejection_reason = Some(TOO_MANY_ATTEMPTS.to_string());
                record.code_hash = None;
                ConfirmOutcome::Rejected
            } else {
                ConfirmOutcome::Mismatch {
                    attempts_remaining: self.policy.max_failed_attempts - record.failed_attempts,
                }
            }
        };

        if let ConfirmOutcome::Mismatch { attempts_remaining } = outcome {
            self.repo.update(&record, expected, None)?;
            tracing::warn!(
                verification_id = %id,
                user_id = %record.user_id,
                failed_attempts = record.failed_attempts,
                attempts_remaining,
                "Verification code mismatch"
            );
        } else {
            let mut changes = transition_changes(Some(from), &record)
                .with("failed_attempts", record.failed_attempts);
            if let Some(reason) = &record.rejection_reason {
                changes.insert("reason", reason);
            }
            let audit = self
                .recorder
                .prepare(self.event(&record, Some(record.user_id)).changes(changes));
            self.repo.update(&record, expected, Some(audit))?;
            tracing::info!(
                verification_id = %id,
                user_id = %record.user_id,
                status = %record.status,
                "Verification code checked"
            );
        }

        Ok(CodeConfirmation {
            verification: record,
            outcome,
        })
    }

    /// Admin override from PENDING or CODE_SENT
    pub fn reject(
        &self,
        id: VerificationId,
        reviewer_id: UserId,
        reason: &str,
    ) -> TrustResult<IdentityVerification> {
        let reason = required("reason", reason)?;
        let mut record = self.repo.get(id)?;
        if record.status.is_terminal() {
            return Err(TrustError::invalid_state(ENTITY_TYPE, id, record.status, "reject"));
        }

        let from = record.status;
        let expected = record.touch(self.clock.now());
        record.status = VerificationStatus::Rejected;
        record.rejection_reason = Some(reason.to_string());
        record.code_hash = None;

        let audit = self.recorder.prepare(
            self.event(&record, Some(reviewer_id)).changes(
                transition_changes(Some(from), &record)
                    .with("reviewer_id", reviewer_id)
                    .with("reason", reason),
            ),
        );
        self.repo.update(&record, expected, Some(audit))?;

        tracing::info!(
            verification_id = %id,
            reviewer_id = %reviewer_id,
            "Identity verification rejected"
        );
        Ok(record)
    }

    /// Move CODE_SENT records whose deadline has passed to EXPIRED.
    ///
    /// System-initiated, so entries carry no actor. Records changed
    /// concurrently are skipped and picked up by the next sweep.
    pub fn expire_overdue(&self, now: DateTime<Utc>) -> TrustResult<Vec<VerificationId>> {
        let mut expired = Vec::new();

        for mut record in self.repo.list_by_status(VerificationStatus::CodeSent)? {
            if !record.code_expired(now) {
                continue;
            }
            let from = record.status;
            let expected = record.touch(now);
            record.status = VerificationStatus::Expired;
            record.code_hash = None;

            let audit = self.recorder.prepare(
                self.event(&record, None)
                    .changes(transition_changes(Some(from), &record)),
            );
            match self.repo.update(&record, expected, Some(audit)) {
                Ok(_) => expired.push(record.id),
                Err(e) if e.is_retryable() => {
                    tracing::debug!(verification_id = %record.id, "Skipped expiry of concurrently modified verification");
                }
                Err(e) => return Err(e),
            }
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired overdue verification codes");
        }
        Ok(expired)
    }

    fn event(&self, record: &IdentityVerification, actor: Option<UserId>) -> AuditEvent {
        AuditEvent::new(record.status.audit_action(), ENTITY_TYPE, record.id)
            .actor(actor)
            .request(self.request.clone())
    }
}

fn transition_changes(from: Option<VerificationStatus>, record: &IdentityVerification) -> Changes {
    Changes::new()
        .with("previous_status", from.map(|s| s.to_string()))
        .with("new_status", record.status.to_string())
        .with("user_id", record.user_id)
}

fn required<'a>(field: &str, value: &'a str) -> TrustResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(TrustError::invalid_argument(format!("{} must not be blank", field)));
    }
    Ok(value)
}

fn validate_phone(phone: &str) -> TrustResult<&str> {
    let phone = required("phone_number", phone)?;
    let valid_chars = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'));
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    if !valid_chars || digits < 6 {
        return Err(TrustError::invalid_argument(format!(
            "invalid phone number '{}'",
            phone
        )));
    }
    Ok(phone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryVerificationStore;
    use chrono::Duration;
    use trustdesk_audit::{AuditSink, MemoryAuditLog};
    use trustdesk_core::{ManualClock, SequentialIds};
    use uuid::Uuid;

    struct Harness {
        workflow: IdentityWorkflow,
        clock: Arc<ManualClock>,
        ids: Arc<SequentialIds>,
        log: Arc<MemoryAuditLog>,
    }

    fn harness() -> Harness {
        let log = Arc::new(MemoryAuditLog::new());
        let clock = Arc::new(ManualClock::at_epoch());
        let ids = Arc::new(SequentialIds::new());
        let recorder = AuditRecorder::new(log.clone(), clock.clone(), ids.clone());
        let repo = Arc::new(MemoryVerificationStore::new(log.clone()));
        let workflow = IdentityWorkflow::new(repo, recorder, clock.clone(), ids.clone(), IdentityPolicy::default());
        Harness { workflow, clock, ids, log }
    }

    fn user(n: u128) -> UserId {
        UserId::from_uuid(Uuid::from_u128(1_000 + n))
    }

    fn code_sent(h: &Harness) -> (IdentityVerification, String) {
        let record = h.workflow.submit_document(user(1), "passport", "s3://kyc/p.jpg", false).unwrap();
        h.ids.push_code("482913");
        h.workflow.request_phone_code(record.id, "+84 912 345 678").unwrap()
    }

    #[test]
    fn test_submit_creates_pending() {
        let h = harness();
        let record = h.workflow.submit_document(user(1), "passport", "s3://kyc/p.jpg", false).unwrap();

        assert_eq!(record.status, VerificationStatus::Pending);
        assert_eq!(record.document_type, "PASSPORT");
        assert_eq!(record.version, 1);

        let entries = h.log.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "IDENTITY_VERIFICATION_PENDING");
        let changes = entries[0].changes().unwrap();
        assert_eq!(changes.get("previous_status"), Some(&serde_json::Value::Null));
        assert_eq!(changes.get_str("new_status"), Some("PENDING"));
    }

    #[test]
    fn test_blank_document_rejected() {
        let h = harness();
        let result = h.workflow.submit_document(user(1), "  ", "s3://kyc/p.jpg", false);
        assert!(matches!(result, Err(TrustError::InvalidArgument(_))));
        assert!(h.log.is_empty());
    }

    #[test]
    fn test_duplicate_submission() {
        let h = harness();
        h.workflow.submit_document(user(1), "passport", "a", false).unwrap();

        let result = h.workflow.submit_document(user(1), "id_card", "b", false);
        assert!(matches!(result, Err(TrustError::DuplicateSubmission(_))));
        assert_eq!(h.log.len(), 1);
    }

    #[test]
    fn test_force_replace_supersedes() {
        let h = harness();
        let first = h.workflow.submit_document(user(1), "passport", "a", false).unwrap();
        let second = h.workflow.submit_document(user(1), "id_card", "b", true).unwrap();

        let old = h.workflow.get(first.id).unwrap();
        assert_eq!(old.status, VerificationStatus::Rejected);
        assert_eq!(old.rejection_reason.as_deref(), Some(SUPERSEDED));
        assert_eq!(h.workflow.latest_for_user(user(1)).unwrap().unwrap().id, second.id);

        let actions: Vec<_> = h.log.read_all().unwrap().into_iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                "IDENTITY_VERIFICATION_PENDING",
                "IDENTITY_VERIFICATION_REJECTED",
                "IDENTITY_VERIFICATION_PENDING",
            ]
        );
    }

    #[test]
    fn test_new_submission_after_terminal_is_allowed() {
        let h = harness();
        let first = h.workflow.submit_document(user(1), "passport", "a", false).unwrap();
        h.workflow.reject(first.id, user(99), "blurry scan").unwrap();

        assert!(h.workflow.submit_document(user(1), "passport", "b", false).is_ok());
    }

    #[test]
    fn test_request_code_and_confirm() {
        let h = harness();
        let (record, code) = code_sent(&h);

        assert_eq!(code, "482913");
        assert_eq!(record.status, VerificationStatus::CodeSent);
        assert_eq!(record.code_expires_at, Some(h.clock.now() + Duration::minutes(10)));

        let result = h.workflow.confirm_code(record.id, &code, h.clock.now()).unwrap();
        assert_eq!(result.outcome, ConfirmOutcome::Verified);
        assert_eq!(result.verification.status, VerificationStatus::Verified);
        assert_eq!(h.workflow.get(record.id).unwrap().status, VerificationStatus::Verified);
    }

    #[test]
    fn test_code_sent_audit_masks_phone() {
        let h = harness();
        code_sent(&h);

        let last = h.log.read_all().unwrap().pop().unwrap();
        assert_eq!(last.action, "IDENTITY_VERIFICATION_CODE_SENT");
        let changes = last.changes().unwrap();
        assert_eq!(changes.get_str("phone_number"), Some("***5678"));
        assert!(!last.changes.unwrap().contains("482913"));
    }

    #[test]
    fn test_request_code_twice_is_invalid_state() {
        let h = harness();
        let (record, _) = code_sent(&h);
        let result = h.workflow.request_phone_code(record.id, "+84 912 345 678");
        assert!(matches!(result, Err(TrustError::InvalidState { .. })));
    }

    #[test]
    fn test_invalid_phone_rejected() {
        let h = harness();
        let record = h.workflow.submit_document(user(1), "passport", "a", false).unwrap();
        let result = h.workflow.request_phone_code(record.id, "call me");
        assert!(matches!(result, Err(TrustError::InvalidArgument(_))));
    }

    #[test]
    fn test_confirm_from_pending_is_invalid_state() {
        let h = harness();
        let record = h.workflow.submit_document(user(1), "passport", "a", false).unwrap();
        let result = h.workflow.confirm_code(record.id, "000000", h.clock.now());
        assert!(matches!(result, Err(TrustError::InvalidState { .. })));
    }

    #[test]
    fn test_five_wrong_codes_reject_then_terminal() {
        let h = harness();
        let (record, _) = code_sent(&h);
        let audited_before = h.log.len();

        for attempt in 1..=4u32 {
            let result = h.workflow.confirm_code(record.id, "000000", h.clock.now()).unwrap();
            assert_eq!(
                result.outcome,
                ConfirmOutcome::Mismatch { attempts_remaining: 5 - attempt }
            );
        }
        // Misses do not change status, so no audit entries
        assert_eq!(h.log.len(), audited_before);

        let fifth = h.workflow.confirm_code(record.id, "000000", h.clock.now()).unwrap();
        assert_eq!(fifth.outcome, ConfirmOutcome::Rejected);
        assert_eq!(fifth.verification.status, VerificationStatus::Rejected);
        assert_eq!(h.log.len(), audited_before + 1);

        let sixth = h.workflow.confirm_code(record.id, "482913", h.clock.now());
        assert!(matches!(sixth, Err(TrustError::InvalidState { .. })));
    }

    #[test]
    fn test_expired_code() {
        let h = harness();
        let (record, code) = code_sent(&h);
        let late = h.clock.now() + Duration::minutes(10);

        let result = h.workflow.confirm_code(record.id, &code, late).unwrap();
        assert_eq!(result.outcome, ConfirmOutcome::Expired);
        assert_eq!(h.workflow.get(record.id).unwrap().status, VerificationStatus::Expired);
    }

    #[test]
    fn test_reject_terminal_is_invalid_state() {
        let h = harness();
        let (record, code) = code_sent(&h);
        h.workflow.confirm_code(record.id, &code, h.clock.now()).unwrap();

        let result = h.workflow.reject(record.id, user(99), "fraud");
        assert!(matches!(result, Err(TrustError::InvalidState { .. })));
    }

    #[test]
    fn test_reject_records_reviewer() {
        let h = harness();
        let record = h.workflow.submit_document(user(1), "passport", "a", false).unwrap();
        h.workflow.reject(record.id, user(99), "document mismatch").unwrap();

        let last = h.log.read_all().unwrap().pop().unwrap();
        assert_eq!(last.actor_id, Some(user(99)));
        assert_eq!(last.action, "IDENTITY_VERIFICATION_REJECTED");
        assert_eq!(last.changes().unwrap().get_str("previous_status"), Some("PENDING"));
    }

    #[test]
    fn test_expire_overdue_sweep() {
        let h = harness();
        let (record, _) = code_sent(&h);

        assert!(h.workflow.expire_overdue(h.clock.now()).unwrap().is_empty());

        h.clock.advance(Duration::minutes(11));
        let expired = h.workflow.expire_overdue(h.clock.now()).unwrap();
        assert_eq!(expired, vec![record.id]);

        let last = h.log.read_all().unwrap().pop().unwrap();
        assert_eq!(last.action, "IDENTITY_VERIFICATION_EXPIRED");
        assert!(last.is_system_event());
    }

    #[test]
    fn test_request_context_on_entries() {
        let h = harness();
        let scoped = h.workflow.with_request(RequestContext::new(Some("203.0.113.9".into()), Some("app/1.0".into())));
        scoped.submit_document(user(1), "passport", "a", false).unwrap();

        let entry = h.log.read_all().unwrap().pop().unwrap();
        assert_eq!(entry.ip_address.as_deref(), Some("203.0.113.9"));
    }
}
