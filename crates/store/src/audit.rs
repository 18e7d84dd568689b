//! Audit log table

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use trustdesk_audit::chain::{self, GENESIS};
use trustdesk_audit::{AuditLogEntry, AuditQuery, AuditSink};
use trustdesk_core::{AuditId, TrustError, TrustResult};

use crate::columns::{parsed, parsed_opt, timestamp, to_sql_int, ts, unsigned};
use crate::error::StoreError;
use crate::SqliteStore;

const COLUMNS: &str = "seq, id, actor_id, action, entity_type, entity_id, ip_address, \
                       user_agent, changes, created_at, prev_hash, hash";

/// Seal `entry` onto the chain tail and insert it, inside the caller's transaction
pub(crate) fn append_entry(conn: &Connection, entry: AuditLogEntry) -> TrustResult<AuditLogEntry> {
    let tail: Option<(i64, String)> = conn
        .query_row(
            "SELECT seq, hash FROM audit_log ORDER BY seq DESC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(StoreError::from)?;

    let (last_seq, prev_hash) = match tail {
        Some((seq, hash)) => (u64::try_from(seq).unwrap_or(0), hash),
        None => (0, GENESIS.to_string()),
    };
    let sealed = chain::seal(entry, last_seq + 1, &prev_hash);

    conn.execute(
        "INSERT INTO audit_log (seq, id, actor_id, action, entity_type, entity_id, ip_address,
                                user_agent, changes, created_at, prev_hash, hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            to_sql_int(sealed.sequence),
            sealed.id.to_string(),
            sealed.actor_id.map(|a| a.to_string()),
            sealed.action,
            sealed.entity_type,
            sealed.entity_id.to_string(),
            sealed.ip_address,
            sealed.user_agent,
            sealed.changes,
            ts(sealed.created_at),
            sealed.prev_hash,
            sealed.hash,
        ],
    )
    .map_err(StoreError::from)?;

    Ok(sealed)
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<AuditLogEntry> {
    Ok(AuditLogEntry {
        sequence: unsigned(row, 0)?,
        id: parsed(row, 1)?,
        actor_id: parsed_opt(row, 2)?,
        action: row.get(3)?,
        entity_type: row.get(4)?,
        entity_id: parsed(row, 5)?,
        ip_address: row.get(6)?,
        user_agent: row.get(7)?,
        changes: row.get(8)?,
        created_at: timestamp(row, 9)?,
        prev_hash: row.get(10)?,
        hash: row.get(11)?,
    })
}

fn select(conn: &Connection, clause: &str, args: &[String]) -> TrustResult<Vec<AuditLogEntry>> {
    let sql = format!("SELECT {} FROM audit_log {}", COLUMNS, clause);
    let mut stmt = conn.prepare(&sql).map_err(StoreError::from)?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), row_to_entry)
        .map_err(StoreError::from)?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| TrustError::from(StoreError::Corrupt {
            table: "audit_log",
            detail: e.to_string(),
        }))
}

impl AuditSink for SqliteStore {
    fn append(&self, entry: AuditLogEntry) -> TrustResult<AuditLogEntry> {
        self.write(|tx| append_entry(tx, entry))
    }

    fn query(&self, query: &AuditQuery) -> TrustResult<Vec<AuditLogEntry>> {
        let mut filters = Vec::new();
        let mut args = Vec::new();

        if let Some(entity_type) = &query.entity_type {
            args.push(entity_type.clone());
            filters.push(format!("entity_type = ?{}", args.len()));
        }
        if let Some(entity_id) = query.entity_id {
            args.push(entity_id.to_string());
            filters.push(format!("entity_id = ?{}", args.len()));
        }
        if let Some(actor_id) = query.actor_id {
            args.push(actor_id.to_string());
            filters.push(format!("actor_id = ?{}", args.len()));
        }
        if let Some(action) = &query.action {
            args.push(action.clone());
            filters.push(format!("action = ?{}", args.len()));
        }
        if let Some(from) = query.from {
            args.push(ts(from));
            filters.push(format!("created_at >= ?{}", args.len()));
        }
        if let Some(to) = query.to {
            args.push(ts(to));
            filters.push(format!("created_at < ?{}", args.len()));
        }

        let mut clause = String::new();
        if !filters.is_empty() {
            clause.push_str("WHERE ");
            clause.push_str(&filters.join(" AND "));
        }
        clause.push_str(" ORDER BY seq DESC");
        if let Some(limit) = query.limit {
            clause.push_str(&format!(" LIMIT {}", limit));
        }

        self.read(|conn| select(conn, &clause, &args))
    }

    fn read_all(&self) -> TrustResult<Vec<AuditLogEntry>> {
        self.read(|conn| select(conn, "ORDER BY seq ASC", &[]))
    }

    fn get(&self, id: AuditId) -> TrustResult<AuditLogEntry> {
        self.read(|conn| {
            select(conn, "WHERE id = ?1", &[id.to_string()])?
                .pop()
                .ok_or_else(|| TrustError::not_found("AuditLogEntry", id))
        })
    }
}

/// Number of rows in the audit log
pub fn count(store: &SqliteStore) -> TrustResult<u64> {
    store.read(|conn| {
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .map_err(StoreError::from)?;
        Ok(u64::try_from(n).unwrap_or(0))
    })
}
