//! TrustDesk Audit Trail
//!
//! Append-only record of sensitive state changes, used for compliance and
//! investigation. Every workflow transition lands here.
//!
//! ## Key Components
//!
//! - [`changes::Changes`] - ordered change snapshot with a canonical string form
//! - [`recorder::AuditRecorder`] - builds entries, degrades to a null payload on serialization failure
//! - [`sink::AuditSink`] - append/query boundary, implemented by [`sink::MemoryAuditLog`],
//!   [`ledger::JsonlAuditLog`] and the SQLite store
//! - [`chain`] - SHA-256 hash chain over the log

pub mod chain;
pub mod changes;
pub mod entry;
pub mod ledger;
pub mod recorder;
pub mod sink;

pub use chain::{verify_chain, ChainError, GENESIS};
pub use changes::Changes;
pub use entry::{actions, AuditLogEntry, RequestContext};
pub use ledger::JsonlAuditLog;
pub use recorder::{AuditEvent, AuditRecorder};
pub use sink::{AuditQuery, AuditSink, MemoryAuditLog};
