//! Disputes table

use rusqlite::{params, Connection, OptionalExtension, Row};

use trustdesk_audit::AuditLogEntry;
use trustdesk_core::{BookingId, DisputeId, TrustError, TrustResult};
use trustdesk_dispute::{Dispute, DisputeRepository, DisputeStatus, ENTITY_TYPE};

use crate::audit::append_entry;
use crate::columns::{parsed, parsed_opt, timestamp, timestamp_opt, to_sql_int, ts, ts_opt, unsigned};
use crate::error::{is_unique_violation, StoreError};
use crate::SqliteStore;

const COLUMNS: &str = "id, booking_id, initiator_id, reason, admin_id, resolution, status, \
                       severity, version, created_at, updated_at, closed_at";

fn row_to_dispute(row: &Row<'_>) -> rusqlite::Result<Dispute> {
    Ok(Dispute {
        id: parsed(row, 0)?,
        booking_id: parsed(row, 1)?,
        initiator_id: parsed(row, 2)?,
        reason: row.get(3)?,
        admin_id: parsed_opt(row, 4)?,
        resolution: row.get(5)?,
        status: parsed(row, 6)?,
        severity: parsed(row, 7)?,
        version: unsigned(row, 8)?,
        created_at: timestamp(row, 9)?,
        updated_at: timestamp(row, 10)?,
        closed_at: timestamp_opt(row, 11)?,
    })
}

fn corrupt(e: rusqlite::Error) -> TrustError {
    StoreError::Corrupt {
        table: "disputes",
        detail: e.to_string(),
    }
    .into()
}

fn find(conn: &Connection, id: DisputeId) -> TrustResult<Option<Dispute>> {
    conn.query_row(
        &format!("SELECT {} FROM disputes WHERE id = ?1", COLUMNS),
        params![id.to_string()],
        row_to_dispute,
    )
    .optional()
    .map_err(corrupt)
}

fn list(conn: &Connection, column: &str, value: String) -> TrustResult<Vec<Dispute>> {
    let sql = format!(
        "SELECT {} FROM disputes WHERE {} = ?1 ORDER BY created_at ASC, id ASC",
        COLUMNS, column
    );
    let mut stmt = conn.prepare(&sql).map_err(StoreError::from)?;
    let rows = stmt
        .query_map(params![value], row_to_dispute)
        .map_err(StoreError::from)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(corrupt)
}

impl DisputeRepository for SqliteStore {
    fn get(&self, id: DisputeId) -> TrustResult<Dispute> {
        self.read(|conn| find(conn, id)?.ok_or_else(|| TrustError::not_found(ENTITY_TYPE, id)))
    }

    fn list_by_status(&self, status: DisputeStatus) -> TrustResult<Vec<Dispute>> {
        self.read(|conn| list(conn, "status", status.to_string()))
    }

    fn list_for_booking(&self, booking_id: BookingId) -> TrustResult<Vec<Dispute>> {
        self.read(|conn| list(conn, "booking_id", booking_id.to_string()))
    }

    fn insert(&self, dispute: &Dispute, audit: AuditLogEntry) -> TrustResult<AuditLogEntry> {
        self.write(|tx| {
            tx.execute(
                &format!(
                    "INSERT INTO disputes ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    COLUMNS
                ),
                params![
                    dispute.id.to_string(),
                    dispute.booking_id.to_string(),
                    dispute.initiator_id.to_string(),
                    dispute.reason,
                    dispute.admin_id.map(|a| a.to_string()),
                    dispute.resolution,
                    dispute.status.to_string(),
                    dispute.severity.to_string(),
                    to_sql_int(dispute.version),
                    ts(dispute.created_at),
                    ts(dispute.updated_at),
                    ts_opt(dispute.closed_at),
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    TrustError::conflict(ENTITY_TYPE, dispute.id)
                } else {
                    StoreError::from(e).into()
                }
            })?;
            append_entry(tx, audit)
        })
    }

    fn update(
        &self,
        dispute: &Dispute,
        expected_version: u64,
        audit: AuditLogEntry,
    ) -> TrustResult<AuditLogEntry> {
        self.write(|tx| {
            let changed = tx
                .execute(
                    "UPDATE disputes
                     SET admin_id = ?1, resolution = ?2, status = ?3, severity = ?4,
                         version = ?5, updated_at = ?6, closed_at = ?7
                     WHERE id = ?8 AND version = ?9",
                    params![
                        dispute.admin_id.map(|a| a.to_string()),
                        dispute.resolution,
                        dispute.status.to_string(),
                        dispute.severity.to_string(),
                        to_sql_int(dispute.version),
                        ts(dispute.updated_at),
                        ts_opt(dispute.closed_at),
                        dispute.id.to_string(),
                        to_sql_int(expected_version),
                    ],
                )
                .map_err(StoreError::from)?;

            if changed == 0 {
                return Err(match find(tx, dispute.id)? {
                    Some(_) => TrustError::conflict(ENTITY_TYPE, dispute.id),
                    None => TrustError::not_found(ENTITY_TYPE, dispute.id),
                });
            }

            let sealed = append_entry(tx, audit)?;
            tracing::debug!(dispute_id = %dispute.id, version = dispute.version, "Dispute row updated");
            Ok(sealed)
        })
    }
}
