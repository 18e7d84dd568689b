//! Hash chain over audit entries
//!
//! Every sink links entries as `prev_hash -> hash`, starting from [`GENESIS`].
//! Editing or deleting any persisted entry breaks the chain from that point on.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::entry::AuditLogEntry;

pub const GENESIS: &str = "GENESIS";

/// SHA256 of the entry content, excluding the `hash` field itself
pub fn calculate_entry_hash(entry: &AuditLogEntry) -> String {
    let mut hasher = Sha256::new();

    hasher.update(entry.sequence.to_le_bytes());
    hasher.update(entry.prev_hash.as_bytes());
    hasher.update(entry.id.to_string().as_bytes());
    hasher.update(entry.created_at.to_rfc3339().as_bytes());
    hasher.update(entry.action.as_bytes());
    hasher.update(entry.entity_type.as_bytes());
    hasher.update(entry.entity_id.as_bytes());

    // Optional fields are length-prefixed so `None` and `Some("")` differ
    for field in [
        entry.actor_id.map(|a| a.to_string()),
        entry.ip_address.clone(),
        entry.user_agent.clone(),
        entry.changes.clone(),
    ] {
        match field {
            Some(value) => {
                hasher.update([1u8]);
                hasher.update((value.len() as u64).to_le_bytes());
                hasher.update(value.as_bytes());
            }
            None => hasher.update([0u8]),
        }
    }

    hex::encode(hasher.finalize())
}

/// Assign sequence and link the entry after `prev_hash`
pub fn seal(mut entry: AuditLogEntry, sequence: u64, prev_hash: &str) -> AuditLogEntry {
    entry.sequence = sequence;
    entry.prev_hash = prev_hash.to_string();
    entry.hash = calculate_entry_hash(&entry);
    entry
}

/// Verify a full log, ordered by sequence
pub fn verify_chain(entries: &[AuditLogEntry]) -> Result<(), ChainError> {
    let mut prev_hash = GENESIS.to_string();
    let mut expected_sequence = 1;

    for entry in entries {
        if entry.sequence != expected_sequence {
            return Err(ChainError::InvalidSequence {
                expected: expected_sequence,
                actual: entry.sequence,
            });
        }

        if entry.prev_hash != prev_hash {
            return Err(ChainError::BrokenLink {
                sequence: entry.sequence,
                expected: prev_hash,
                actual: entry.prev_hash.clone(),
            });
        }

        let calculated = calculate_entry_hash(entry);
        if entry.hash != calculated {
            return Err(ChainError::InvalidHash {
                sequence: entry.sequence,
                expected: calculated,
                actual: entry.hash.clone(),
            });
        }

        prev_hash = entry.hash.clone();
        expected_sequence += 1;
    }

    Ok(())
}

/// Errors in hash chain verification
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Broken link at seq {sequence}: expected prev_hash '{expected}', got '{actual}'")]
    BrokenLink {
        sequence: u64,
        expected: String,
        actual: String,
    },

    #[error("Invalid hash at seq {sequence}: expected '{expected}', got '{actual}'")]
    InvalidHash {
        sequence: u64,
        expected: String,
        actual: String,
    },

    #[error("Invalid sequence: expected {expected}, got {actual}")]
    InvalidSequence { expected: u64, actual: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use trustdesk_core::AuditId;
    use uuid::Uuid;

    fn entry(n: u128) -> AuditLogEntry {
        AuditLogEntry {
            id: AuditId::from_uuid(Uuid::from_u128(n)),
            sequence: 0,
            actor_id: None,
            action: "PAYMENT_EVENT".to_string(),
            entity_type: "Booking".to_string(),
            entity_id: Uuid::from_u128(100 + n),
            ip_address: None,
            user_agent: None,
            changes: Some(format!(r#"{{"n":{}}}"#, n)),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            prev_hash: String::new(),
            hash: String::new(),
        }
    }

    fn chain(len: u128) -> Vec<AuditLogEntry> {
        let mut out: Vec<AuditLogEntry> = Vec::new();
        for n in 1..=len {
            let prev = out.last().map(|e| e.hash.clone()).unwrap_or_else(|| GENESIS.to_string());
            out.push(seal(entry(n), n as u64, &prev));
        }
        out
    }

    #[test]
    fn test_valid_chain() {
        assert!(verify_chain(&chain(4)).is_ok());
        assert!(verify_chain(&[]).is_ok());
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = seal(entry(1), 1, GENESIS);
        let b = seal(entry(1), 1, GENESIS);
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash.len(), 64);
    }

    #[test]
    fn test_tampered_changes_detected() {
        let mut entries = chain(3);
        entries[1].changes = Some(r#"{"n":999}"#.to_string());

        let err = verify_chain(&entries).unwrap_err();
        assert!(matches!(err, ChainError::InvalidHash { sequence: 2, .. }));
    }

    #[test]
    fn test_deleted_entry_detected() {
        let mut entries = chain(3);
        entries.remove(1);

        let err = verify_chain(&entries).unwrap_err();
        assert!(matches!(err, ChainError::InvalidSequence { expected: 2, actual: 3 }));
    }

    #[test]
    fn test_none_and_empty_differ() {
        let mut a = entry(1);
        a.ip_address = None;
        let mut b = entry(1);
        b.ip_address = Some(String::new());
        assert_ne!(seal(a, 1, GENESIS).hash, seal(b, 1, GENESIS).hash);
    }
}
