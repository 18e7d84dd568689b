//! Identity verifications table

use rusqlite::{params, Connection, OptionalExtension, Row};

use trustdesk_audit::AuditLogEntry;
use trustdesk_core::{TrustError, TrustResult, UserId, VerificationId};
use trustdesk_identity::{IdentityVerification, VerificationRepository, VerificationStatus, ENTITY_TYPE};

use crate::audit::append_entry;
use crate::columns::{parsed, parsed_opt, timestamp, timestamp_opt, to_sql_int, ts, ts_opt, unsigned};
use crate::error::{is_unique_violation, StoreError};
use crate::SqliteStore;

const COLUMNS: &str = "id, user_id, document_type, document_url, phone_number, code_hash, \
                       code_expires_at, failed_attempts, status, rejection_reason, version, \
                       created_at, updated_at";

fn row_to_verification(row: &Row<'_>) -> rusqlite::Result<IdentityVerification> {
    let failed_attempts = unsigned(row, 7)?;
    Ok(IdentityVerification {
        id: parsed(row, 0)?,
        user_id: parsed(row, 1)?,
        document_type: row.get(2)?,
        document_url: row.get(3)?,
        phone_number: row.get(4)?,
        code_hash: row.get(5)?,
        code_expires_at: timestamp_opt(row, 6)?,
        failed_attempts: u32::try_from(failed_attempts).unwrap_or(u32::MAX),
        status: parsed(row, 8)?,
        rejection_reason: row.get(9)?,
        version: unsigned(row, 10)?,
        created_at: timestamp(row, 11)?,
        updated_at: timestamp(row, 12)?,
    })
}

fn corrupt(e: rusqlite::Error) -> TrustError {
    StoreError::Corrupt {
        table: "identity_verifications",
        detail: e.to_string(),
    }
    .into()
}

fn query_one(conn: &Connection, clause: &str, arg: String) -> TrustResult<Option<IdentityVerification>> {
    conn.query_row(
        &format!("SELECT {} FROM identity_verifications {}", COLUMNS, clause),
        params![arg],
        row_to_verification,
    )
    .optional()
    .map_err(corrupt)
}

fn active(conn: &Connection, user_id: UserId) -> TrustResult<Option<IdentityVerification>> {
    query_one(
        conn,
        "WHERE user_id = ?1 AND status IN ('PENDING', 'CODE_SENT')",
        user_id.to_string(),
    )
}

fn duplicate_for(conn: &Connection, user_id: UserId) -> TrustError {
    match active(conn, user_id) {
        Ok(Some(existing)) => TrustError::DuplicateSubmission(format!(
            "user {} already has verification {} in status {}",
            user_id, existing.id, existing.status
        )),
        Ok(None) => TrustError::DuplicateSubmission(format!(
            "user {} already has an active verification",
            user_id
        )),
        Err(e) => e,
    }
}

fn insert_row(conn: &Connection, record: &IdentityVerification) -> TrustResult<()> {
    conn.execute(
        &format!(
            "INSERT INTO identity_verifications ({})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            COLUMNS
        ),
        params![
            record.id.to_string(),
            record.user_id.to_string(),
            record.document_type,
            record.document_url,
            record.phone_number,
            record.code_hash,
            ts_opt(record.code_expires_at),
            record.failed_attempts,
            record.status.to_string(),
            record.rejection_reason,
            to_sql_int(record.version),
            ts(record.created_at),
            ts(record.updated_at),
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            duplicate_for(conn, record.user_id)
        } else {
            StoreError::from(e).into()
        }
    })?;
    Ok(())
}

fn update_row(conn: &Connection, record: &IdentityVerification, expected_version: u64) -> TrustResult<()> {
    let changed = conn
        .execute(
            "UPDATE identity_verifications
             SET phone_number = ?1, code_hash = ?2, code_expires_at = ?3, failed_attempts = ?4,
                 status = ?5, rejection_reason = ?6, version = ?7, updated_at = ?8
             WHERE id = ?9 AND version = ?10",
            params![
                record.phone_number,
                record.code_hash,
                ts_opt(record.code_expires_at),
                record.failed_attempts,
                record.status.to_string(),
                record.rejection_reason,
                to_sql_int(record.version),
                ts(record.updated_at),
                record.id.to_string(),
                to_sql_int(expected_version),
            ],
        )
        .map_err(StoreError::from)?;

    if changed == 0 {
        let exists = query_one(conn, "WHERE id = ?1", record.id.to_string())?.is_some();
        return Err(if exists {
            TrustError::conflict(ENTITY_TYPE, record.id)
        } else {
            TrustError::not_found(ENTITY_TYPE, record.id)
        });
    }
    Ok(())
}

impl VerificationRepository for SqliteStore {
    fn get(&self, id: VerificationId) -> TrustResult<IdentityVerification> {
        self.read(|conn| {
            query_one(conn, "WHERE id = ?1", id.to_string())?
                .ok_or_else(|| TrustError::not_found(ENTITY_TYPE, id))
        })
    }

    fn latest_for_user(&self, user_id: UserId) -> TrustResult<Option<IdentityVerification>> {
        self.read(|conn| {
            query_one(
                conn,
                "WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                user_id.to_string(),
            )
        })
    }

    fn active_for_user(&self, user_id: UserId) -> TrustResult<Option<IdentityVerification>> {
        self.read(|conn| active(conn, user_id))
    }

    fn list_by_status(&self, status: VerificationStatus) -> TrustResult<Vec<IdentityVerification>> {
        self.read(|conn| {
            let sql = format!(
                "SELECT {} FROM identity_verifications WHERE status = ?1 ORDER BY created_at ASC, rowid ASC",
                COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(StoreError::from)?;
            let rows = stmt
                .query_map(params![status.to_string()], row_to_verification)
                .map_err(StoreError::from)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(corrupt)
        })
    }

    fn insert(
        &self,
        record: &IdentityVerification,
        audit: AuditLogEntry,
    ) -> TrustResult<AuditLogEntry> {
        self.write(|tx| {
            insert_row(tx, record)?;
            append_entry(tx, audit)
        })
    }

    fn update(
        &self,
        record: &IdentityVerification,
        expected_version: u64,
        audit: Option<AuditLogEntry>,
    ) -> TrustResult<Option<AuditLogEntry>> {
        self.write(|tx| {
            update_row(tx, record, expected_version)?;
            audit.map(|entry| append_entry(tx, entry)).transpose()
        })
    }

    fn replace(
        &self,
        previous: &IdentityVerification,
        expected_version: u64,
        previous_audit: AuditLogEntry,
        created: &IdentityVerification,
        created_audit: AuditLogEntry,
    ) -> TrustResult<(AuditLogEntry, AuditLogEntry)> {
        self.write(|tx| {
            update_row(tx, previous, expected_version)?;
            let first = append_entry(tx, previous_audit)?;
            insert_row(tx, created)?;
            let second = append_entry(tx, created_audit)?;
            Ok((first, second))
        })
    }
}
