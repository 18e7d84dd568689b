//! Store errors

use thiserror::Error;

use trustdesk_core::TrustError;

/// Failures inside the SQLite store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },

    #[error("Store lock poisoned")]
    Poisoned,
}

impl From<StoreError> for TrustError {
    fn from(err: StoreError) -> Self {
        TrustError::storage(err)
    }
}

/// True when SQLite rejected a write because of a UNIQUE/PRIMARY KEY constraint
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
