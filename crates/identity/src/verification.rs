//! Identity verification record and status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum_macros::{Display, EnumString};

use trustdesk_core::{UserId, VerificationId};

/// Entity type written on audit entries
pub const ENTITY_TYPE: &str = "IdentityVerification";

/// Status of a verification attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    /// Document submitted, waiting for a phone code request
    Pending,
    /// Code sent, waiting for confirmation
    CodeSent,
    Verified,
    Rejected,
    Expired,
}

impl VerificationStatus {
    /// No transition leaves these states
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VerificationStatus::Verified | VerificationStatus::Rejected | VerificationStatus::Expired
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Audit action code for entering this status
    pub fn audit_action(&self) -> String {
        format!("IDENTITY_VERIFICATION_{}", self)
    }
}

/// One verification attempt for a user
///
/// Never deleted; terminal records are kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityVerification {
    pub id: VerificationId,
    pub user_id: UserId,
    pub document_type: String,
    pub document_url: String,
    pub phone_number: Option<String>,
    /// SHA-256 of the expected code, never the code itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_hash: Option<String>,
    pub code_expires_at: Option<DateTime<Utc>>,
    pub failed_attempts: u32,
    pub status: VerificationStatus,
    pub rejection_reason: Option<String>,
    /// Optimistic concurrency token, starts at 1
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IdentityVerification {
    pub fn new(
        id: VerificationId,
        user_id: UserId,
        document_type: impl Into<String>,
        document_url: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            document_type: document_type.into(),
            document_url: document_url.into(),
            phone_number: None,
            code_hash: None,
            code_expires_at: None,
            failed_attempts: 0,
            status: VerificationStatus::Pending,
            rejection_reason: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Bump the version for a write; returns the version the store must still hold
    pub fn touch(&mut self, now: DateTime<Utc>) -> u64 {
        let expected = self.version;
        self.version += 1;
        self.updated_at = now;
        expected
    }

    /// Store a freshly generated code
    pub fn set_code(&mut self, code: &str, expires_at: DateTime<Utc>) {
        self.code_hash = Some(hash_code(self.id, code));
        self.code_expires_at = Some(expires_at);
        self.failed_attempts = 0;
    }

    pub fn code_matches(&self, submitted: &str) -> bool {
        self.code_hash
            .as_deref()
            .map_or(false, |expected| expected == hash_code(self.id, submitted.trim()))
    }

    /// A code counts as expired from its deadline onwards
    pub fn code_expired(&self, now: DateTime<Utc>) -> bool {
        self.code_expires_at.map_or(true, |deadline| now >= deadline)
    }
}

/// Digest of a code, salted with the verification id
pub fn hash_code(id: VerificationId, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// Phone number with everything but the last four digits hidden
pub fn mask_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
    format!("***{}", tail)
}
