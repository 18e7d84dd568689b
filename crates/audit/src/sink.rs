//! Audit sinks - where entries are durably appended
//!
//! A sink exposes append and read operations only. There is no update or
//! delete; retention is an external policy concern.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use uuid::Uuid;

use trustdesk_core::{AuditId, TrustError, TrustResult, UserId};

use crate::chain::{self, GENESIS};
use crate::entry::AuditLogEntry;

/// Durable, append-only destination for audit entries
pub trait AuditSink: Send + Sync {
    /// Seal and persist one entry, returning it with sequence and hash set
    fn append(&self, entry: AuditLogEntry) -> TrustResult<AuditLogEntry>;

    /// Entries matching `query`, newest first
    fn query(&self, query: &AuditQuery) -> TrustResult<Vec<AuditLogEntry>>;

    /// Every entry in sequence order (for chain verification and export)
    fn read_all(&self) -> TrustResult<Vec<AuditLogEntry>>;

    fn get(&self, id: AuditId) -> TrustResult<AuditLogEntry> {
        self.read_all()?
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| TrustError::not_found("AuditLogEntry", id))
    }

    /// Entries for one entity, oldest first (commit order)
    fn history(&self, entity_type: &str, entity_id: Uuid) -> TrustResult<Vec<AuditLogEntry>> {
        let mut entries = self.query(&AuditQuery::new().entity(entity_type, entity_id))?;
        entries.reverse();
        Ok(entries)
    }
}

/// Filter over audit entries. Empty filter matches everything.
///
/// `from` is inclusive and `to` exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditQuery {
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub actor_id: Option<UserId>,
    pub action: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<Uuid>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn actor(mut self, actor_id: UserId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.entity_type.as_deref().map_or(true, |t| entry.entity_type == t)
            && self.entity_id.map_or(true, |id| entry.entity_id == id)
            && self.actor_id.map_or(true, |a| entry.actor_id == Some(a))
            && self.action.as_deref().map_or(true, |a| entry.action == a)
            && self.from.map_or(true, |from| entry.created_at >= from)
            && self.to.map_or(true, |to| entry.created_at < to)
    }

    /// Filter, order newest first, and truncate
    pub fn apply<'a, I>(&self, entries: I) -> Vec<AuditLogEntry>
    where
        I: IntoIterator<Item = &'a AuditLogEntry>,
    {
        let mut out: Vec<AuditLogEntry> = entries
            .into_iter()
            .filter(|e| self.matches(e))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

/// In-process audit log (tests, embedded use)
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> TrustResult<std::sync::MutexGuard<'_, Vec<AuditLogEntry>>> {
        self.entries
            .lock()
            .map_err(|_| TrustError::storage("audit log lock poisoned"))
    }
}

impl AuditSink for MemoryAuditLog {
    fn append(&self, entry: AuditLogEntry) -> TrustResult<AuditLogEntry> {
        let mut entries = self.lock()?;
        let prev_hash = entries
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| GENESIS.to_string());
        let sealed = chain::seal(entry, entries.len() as u64 + 1, &prev_hash);
        entries.push(sealed.clone());
        Ok(sealed)
    }

    fn query(&self, query: &AuditQuery) -> TrustResult<Vec<AuditLogEntry>> {
        let entries = self.lock()?;
        Ok(query.apply(entries.iter()))
    }

    fn read_all(&self) -> TrustResult<Vec<AuditLogEntry>> {
        Ok(self.lock()?.clone())
    }
}
