//! Audit Trail Recorder
//!
//! Builds entries from [`AuditEvent`]s and appends them to a sink. Serialization
//! of the change snapshot never aborts the action being described: on failure
//! the entry is written with a `None` payload and the failure is logged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use trustdesk_core::{AuditId, Clock, IdGenerator, Money, TrustResult, UserId};

use crate::changes::Changes;
use crate::entry::{actions, AuditLogEntry, RequestContext};
use crate::sink::AuditSink;

/// Description of a sensitive action, before it becomes an entry
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub actor_id: Option<UserId>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub request: RequestContext,
    pub changes: Changes,
}

impl AuditEvent {
    pub fn new(
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<Uuid>,
    ) -> Self {
        Self {
            actor_id: None,
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            request: RequestContext::default(),
            changes: Changes::new(),
        }
    }

    pub fn actor(mut self, actor_id: Option<UserId>) -> Self {
        self.actor_id = actor_id;
        self
    }

    pub fn request(mut self, request: RequestContext) -> Self {
        self.request = request;
        self
    }

    pub fn changes(mut self, changes: Changes) -> Self {
        self.changes = changes;
        self
    }
}

/// Appends audit entries through an injected sink, clock and id generator
#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    degraded: Arc<AtomicU64>,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>, clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            sink,
            clock,
            ids,
            degraded: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn sink(&self) -> &Arc<dyn AuditSink> {
        &self.sink
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Number of entries written with a `None` payload after a serialization failure
    pub fn degraded_count(&self) -> u64 {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Build an unsealed entry. Never fails.
    ///
    /// Used by repositories that append the entry inside the same transaction
    /// as the mutation it documents.
    pub fn prepare(&self, event: AuditEvent) -> AuditLogEntry {
        let changes = if event.changes.is_empty() {
            None
        } else {
            match event.changes.to_canonical_string() {
                Ok(text) => Some(text),
                Err(e) => {
                    self.degraded.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        action = %event.action,
                        entity_type = %event.entity_type,
                        entity_id = %event.entity_id,
                        error = %e,
                        "Audit changes could not be serialized; recording without payload"
                    );
                    None
                }
            }
        };

        AuditLogEntry {
            id: AuditId::from_uuid(self.ids.next_uuid()),
            sequence: 0,
            actor_id: event.actor_id,
            action: event.action,
            entity_type: event.entity_type,
            entity_id: event.entity_id,
            ip_address: event.request.ip_address,
            user_agent: event.request.user_agent,
            changes,
            created_at: self.clock.now(),
            prev_hash: String::new(),
            hash: String::new(),
        }
    }

    /// Prepare and append in one step
    pub fn record(&self, event: AuditEvent) -> TrustResult<AuditLogEntry> {
        let entry = self.prepare(event);
        let sealed = self.sink.append(entry).map_err(|e| {
            tracing::error!(error = %e, "Failed to append audit entry");
            e
        })?;

        tracing::info!(
            sequence = sealed.sequence,
            action = %sealed.action,
            entity_type = %sealed.entity_type,
            entity_id = %sealed.entity_id,
            actor_id = ?sealed.actor_id,
            "Audit entry recorded"
        );
        Ok(sealed)
    }

    pub fn accommodation_approval(
        &self,
        admin_id: UserId,
        accommodation_id: Uuid,
    ) -> TrustResult<AuditLogEntry> {
        self.record(
            AuditEvent::new(actions::ACCOMMODATION_APPROVAL, "Accommodation", accommodation_id)
                .actor(Some(admin_id))
                .changes(Changes::new().with("status", "APPROVED")),
        )
    }

    pub fn user_suspension(
        &self,
        admin_id: UserId,
        user_id: UserId,
        reason: &str,
    ) -> TrustResult<AuditLogEntry> {
        self.record(
            AuditEvent::new(actions::USER_SUSPENSION, "User", user_id)
                .actor(Some(admin_id))
                .changes(Changes::new().with("action", "SUSPEND").with("reason", reason)),
        )
    }

    /// Payment webhooks have no acting user
    pub fn payment_event(
        &self,
        booking_id: Uuid,
        amount: Option<&Money>,
        status: Option<&str>,
    ) -> TrustResult<AuditLogEntry> {
        self.record(
            AuditEvent::new(actions::PAYMENT_EVENT, "Booking", booking_id).changes(
                Changes::new()
                    .with("amount", amount.map(|m| m.to_string()))
                    .with("status", status),
            ),
        )
    }
}
