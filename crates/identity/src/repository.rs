//! Verification persistence boundary
//!
//! Every mutating call takes the audit entry describing it. Implementations
//! must append that entry and apply the mutation as one unit: either both are
//! durable or neither is.

use std::sync::{Arc, Mutex, MutexGuard};

use trustdesk_audit::{AuditLogEntry, AuditSink};
use trustdesk_core::{TrustError, TrustResult, UserId, VerificationId};

use crate::verification::{IdentityVerification, VerificationStatus, ENTITY_TYPE};

/// Storage for identity verification records
pub trait VerificationRepository: Send + Sync {
    fn get(&self, id: VerificationId) -> TrustResult<IdentityVerification>;

    /// Most recently created record for the user, any status
    fn latest_for_user(&self, user_id: UserId) -> TrustResult<Option<IdentityVerification>>;

    /// The user's non-terminal record, if any (there is at most one)
    fn active_for_user(&self, user_id: UserId) -> TrustResult<Option<IdentityVerification>>;

    /// Oldest first
    fn list_by_status(&self, status: VerificationStatus) -> TrustResult<Vec<IdentityVerification>>;

    /// Store a new record with its creation entry.
    ///
    /// Fails with `DuplicateSubmission` if the user already has a
    /// non-terminal record.
    fn insert(
        &self,
        record: &IdentityVerification,
        audit: AuditLogEntry,
    ) -> TrustResult<AuditLogEntry>;

    /// Overwrite a record still at `expected_version`, else `Conflict`.
    ///
    /// `audit` is `None` for writes that do not change status.
    fn update(
        &self,
        record: &IdentityVerification,
        expected_version: u64,
        audit: Option<AuditLogEntry>,
    ) -> TrustResult<Option<AuditLogEntry>>;

    /// Retire `previous` and insert `created` in one unit
    fn replace(
        &self,
        previous: &IdentityVerification,
        expected_version: u64,
        previous_audit: AuditLogEntry,
        created: &IdentityVerification,
        created_audit: AuditLogEntry,
    ) -> TrustResult<(AuditLogEntry, AuditLogEntry)>;
}

/// In-process repository; audit entries go to the shared sink under the record lock
pub struct MemoryVerificationStore {
    records: Mutex<Vec<IdentityVerification>>,
    audit: Arc<dyn AuditSink>,
}

impl MemoryVerificationStore {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            audit,
        }
    }

    fn lock(&self) -> TrustResult<MutexGuard<'_, Vec<IdentityVerification>>> {
        self.records
            .lock()
            .map_err(|_| TrustError::storage("verification store lock poisoned"))
    }
}

fn active_conflict(
    records: &[IdentityVerification],
    user_id: UserId,
    except: Option<VerificationId>,
) -> Option<&IdentityVerification> {
    records
        .iter()
        .find(|r| r.user_id == user_id && r.status.is_active() && Some(r.id) != except)
}

fn duplicate(existing: &IdentityVerification) -> TrustError {
    TrustError::DuplicateSubmission(format!(
        "user {} already has verification {} in status {}",
        existing.user_id, existing.id, existing.status
    ))
}

fn check_version(
    records: &[IdentityVerification],
    id: VerificationId,
    expected_version: u64,
) -> TrustResult<usize> {
    let index = records
        .iter()
        .position(|r| r.id == id)
        .ok_or_else(|| TrustError::not_found(ENTITY_TYPE, id))?;
    if records[index].version != expected_version {
        return Err(TrustError::conflict(ENTITY_TYPE, id));
    }
    Ok(index)
}

impl VerificationRepository for MemoryVerificationStore {
    fn get(&self, id: VerificationId) -> TrustResult<IdentityVerification> {
        self.lock()?
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| TrustError::not_found(ENTITY_TYPE, id))
    }

    fn latest_for_user(&self, user_id: UserId) -> TrustResult<Option<IdentityVerification>> {
        Ok(self.lock()?.iter().rev().find(|r| r.user_id == user_id).cloned())
    }

    fn active_for_user(&self, user_id: UserId) -> TrustResult<Option<IdentityVerification>> {
        Ok(active_conflict(&self.lock()?, user_id, None).cloned())
    }

    fn list_by_status(&self, status: VerificationStatus) -> TrustResult<Vec<IdentityVerification>> {
        Ok(self
            .lock()?
            .iter()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    fn insert(
        &self,
        record: &IdentityVerification,
        audit: AuditLogEntry,
    ) -> TrustResult<AuditLogEntry> {
        let mut records = self.lock()?;
        if let Some(existing) = active_conflict(&records, record.user_id, None) {
            return Err(duplicate(existing));
        }
        if records.iter().any(|r| r.id == record.id) {
            return Err(TrustError::conflict(ENTITY_TYPE, record.id));
        }

        let sealed = self.audit.append(audit)?;
        records.push(record.clone());
        Ok(sealed)
    }

    fn update(
        &self,
        record: &IdentityVerification,
        expected_version: u64,
        audit: Option<AuditLogEntry>,
    ) -> TrustResult<Option<AuditLogEntry>> {
        let mut records = self.lock()?;
        let index = check_version(&records, record.id, expected_version)?;

        let sealed = audit.map(|entry| self.audit.append(entry)).transpose()?;
        records[index] = record.clone();
        Ok(sealed)
    }

    fn replace(
        &self,
        previous: &IdentityVerification,
        expected_version: u64,
        previous_audit: AuditLogEntry,
        created: &IdentityVerification,
        created_audit: AuditLogEntry,
    ) -> TrustResult<(AuditLogEntry, AuditLogEntry)> {
        let mut records = self.lock()?;
        let index = check_version(&records, previous.id, expected_version)?;
        if let Some(existing) = active_conflict(&records, created.user_id, Some(previous.id)) {
            return Err(duplicate(existing));
        }

        let first = self.audit.append(previous_audit)?;
        let second = self.audit.append(created_audit)?;
        records[index] = previous.clone();
        records.push(created.clone());
        Ok((first, second))
    }
}
