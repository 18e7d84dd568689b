//! TrustDesk SQLite Store
//!
//! One SQLite database holding disputes, identity verifications and the audit
//! log. Every workflow write runs in a single transaction that checks the
//! record version, applies the change and appends the audit row, so a
//! transition is never visible without its entry.

pub mod audit;
pub mod columns;
pub mod dispute;
pub mod error;
pub mod identity;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use trustdesk_core::TrustResult;

pub use error::StoreError;

/// SQLite persistence collaborator
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS audit_log (
                seq INTEGER PRIMARY KEY,
                id TEXT NOT NULL UNIQUE,
                actor_id TEXT,
                action TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                ip_address TEXT,
                user_agent TEXT,
                changes TEXT,
                created_at TEXT NOT NULL,
                prev_hash TEXT NOT NULL,
                hash TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(entity_type, entity_id);
            CREATE INDEX IF NOT EXISTS idx_audit_actor ON audit_log(actor_id);
            CREATE INDEX IF NOT EXISTS idx_audit_created ON audit_log(created_at);

            CREATE TABLE IF NOT EXISTS disputes (
                id TEXT PRIMARY KEY,
                booking_id TEXT NOT NULL,
                initiator_id TEXT NOT NULL,
                reason TEXT NOT NULL,
                admin_id TEXT,
                resolution TEXT,
                status TEXT NOT NULL,
                severity TEXT NOT NULL,
                version INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                closed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_disputes_status ON disputes(status);
            CREATE INDEX IF NOT EXISTS idx_disputes_booking ON disputes(booking_id);

            CREATE TABLE IF NOT EXISTS identity_verifications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                document_type TEXT NOT NULL,
                document_url TEXT NOT NULL,
                phone_number TEXT,
                code_hash TEXT,
                code_expires_at TEXT,
                failed_attempts INTEGER NOT NULL,
                status TEXT NOT NULL,
                rejection_reason TEXT,
                version INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_verifications_status ON identity_verifications(status);
            CREATE INDEX IF NOT EXISTS idx_verifications_user ON identity_verifications(user_id, created_at);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_verifications_one_active
                ON identity_verifications(user_id)
                WHERE status IN ('PENDING', 'CODE_SENT');",
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Run `f` inside an IMMEDIATE transaction, committing only on success.
    /// The write lock is taken up front so other connections on the same
    /// file cannot read the same chain tail.
    fn write<T, F>(&self, f: F) -> TrustResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> TrustResult<T>,
    {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let value = f(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }

    fn read<T, F>(&self, f: F) -> TrustResult<T>
    where
        F: FnOnce(&Connection) -> TrustResult<T>,
    {
        let conn = self.conn()?;
        f(&conn)
    }
}
