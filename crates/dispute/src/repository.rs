//! Dispute persistence boundary
//!
//! Writes carry the audit entry that documents them; the entry and the
//! mutation are committed together.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use trustdesk_audit::{AuditLogEntry, AuditSink};
use trustdesk_core::{BookingId, DisputeId, TrustError, TrustResult};

use crate::dispute::{Dispute, DisputeStatus, ENTITY_TYPE};

/// Storage for disputes
pub trait DisputeRepository: Send + Sync {
    fn get(&self, id: DisputeId) -> TrustResult<Dispute>;

    /// Oldest first
    fn list_by_status(&self, status: DisputeStatus) -> TrustResult<Vec<Dispute>>;

    fn list_for_booking(&self, booking_id: BookingId) -> TrustResult<Vec<Dispute>>;

    fn insert(&self, dispute: &Dispute, audit: AuditLogEntry) -> TrustResult<AuditLogEntry>;

    /// Overwrite a dispute still at `expected_version`, else `Conflict`
    fn update(
        &self,
        dispute: &Dispute,
        expected_version: u64,
        audit: AuditLogEntry,
    ) -> TrustResult<AuditLogEntry>;
}

/// In-process repository
pub struct MemoryDisputeStore {
    disputes: Mutex<HashMap<DisputeId, Dispute>>,
    audit: Arc<dyn AuditSink>,
}

impl MemoryDisputeStore {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            disputes: Mutex::new(HashMap::new()),
            audit,
        }
    }

    fn lock(&self) -> TrustResult<MutexGuard<'_, HashMap<DisputeId, Dispute>>> {
        self.disputes
            .lock()
            .map_err(|_| TrustError::storage("dispute store lock poisoned"))
    }

    fn collect<F>(&self, filter: F) -> TrustResult<Vec<Dispute>>
    where
        F: Fn(&Dispute) -> bool,
    {
        let mut found: Vec<Dispute> = self.lock()?.values().filter(|d| filter(d)).cloned().collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.as_uuid().cmp(b.id.as_uuid())));
        Ok(found)
    }
}

impl DisputeRepository for MemoryDisputeStore {
    fn get(&self, id: DisputeId) -> TrustResult<Dispute> {
        self.lock()?
            .get(&id)
            .cloned()
            .ok_or_else(|| TrustError::not_found(ENTITY_TYPE, id))
    }

    fn list_by_status(&self, status: DisputeStatus) -> TrustResult<Vec<Dispute>> {
        self.collect(|d| d.status == status)
    }

    fn list_for_booking(&self, booking_id: BookingId) -> TrustResult<Vec<Dispute>> {
        self.collect(|d| d.booking_id == booking_id)
    }

    fn insert(&self, dispute: &Dispute, audit: AuditLogEntry) -> TrustResult<AuditLogEntry> {
        let mut disputes = self.lock()?;
        if disputes.contains_key(&dispute.id) {
            return Err(TrustError::conflict(ENTITY_TYPE, dispute.id));
        }
        let sealed = self.audit.append(audit)?;
        disputes.insert(dispute.id, dispute.clone());
        Ok(sealed)
    }

    fn update(
        &self,
        dispute: &Dispute,
        expected_version: u64,
        audit: AuditLogEntry,
    ) -> TrustResult<AuditLogEntry> {
        let mut disputes = self.lock()?;
        let stored = disputes
            .get_mut(&dispute.id)
            .ok_or_else(|| TrustError::not_found(ENTITY_TYPE, dispute.id))?;
        if stored.version != expected_version {
            return Err(TrustError::conflict(ENTITY_TYPE, dispute.id));
        }

        let sealed = self.audit.append(audit)?;
        *stored = dispute.clone();
        Ok(sealed)
    }
}
