//! Error taxonomy shared by every TrustDesk component
//!
//! Each failure carries an [`ErrorKind`] so callers can branch on the kind
//! without matching on message text. Only [`ErrorKind::Conflict`] is retryable.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;

/// Discriminant of a [`TrustError`], stable across releases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum ErrorKind {
    /// Malformed or missing input. Always a caller bug.
    InvalidArgument,
    /// Transition not permitted from the current status
    InvalidState,
    /// A non-terminal record already exists
    DuplicateSubmission,
    /// Concurrent modification detected at the storage boundary
    Conflict,
    /// Referenced entity does not exist
    NotFound,
    /// Audit changes payload could not be encoded
    SerializationFailure,
    /// The persistence collaborator failed (I/O, SQL, corrupt row)
    Storage,
}

/// Errors surfaced by the trust & risk core
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrustError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid risk signal: {0}")]
    InvalidSignal(String),

    #[error("Cannot {operation} {entity} {id} in status {status}")]
    InvalidState {
        entity: &'static str,
        id: String,
        status: String,
        operation: &'static str,
    },

    #[error("Duplicate submission: {0}")]
    DuplicateSubmission(String),

    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: &'static str, id: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Serialization failure: {0}")]
    SerializationFailure(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl TrustError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        TrustError::InvalidArgument(msg.into())
    }

    pub fn invalid_state(
        entity: &'static str,
        id: impl ToString,
        status: impl ToString,
        operation: &'static str,
    ) -> Self {
        TrustError::InvalidState {
            entity,
            id: id.to_string(),
            status: status.to_string(),
            operation,
        }
    }

    pub fn conflict(entity: &'static str, id: impl ToString) -> Self {
        TrustError::Conflict {
            entity,
            id: id.to_string(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        TrustError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn storage(msg: impl ToString) -> Self {
        TrustError::Storage(msg.to_string())
    }

    /// The taxonomy bucket this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrustError::InvalidArgument(_) | TrustError::InvalidSignal(_) => {
                ErrorKind::InvalidArgument
            }
            TrustError::InvalidState { .. } => ErrorKind::InvalidState,
            TrustError::DuplicateSubmission(_) => ErrorKind::DuplicateSubmission,
            TrustError::Conflict { .. } => ErrorKind::Conflict,
            TrustError::NotFound { .. } => ErrorKind::NotFound,
            TrustError::SerializationFailure(_) => ErrorKind::SerializationFailure,
            TrustError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Whether re-reading current state and reapplying may succeed
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

/// Result type for trust & risk operations
pub type TrustResult<T> = Result<T, TrustError>;
