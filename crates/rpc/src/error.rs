//! Boundary errors
//!
//! Every failure leaving the RPC layer becomes an [`ErrorResponse`] carrying
//! the kind name and a human-readable message, nothing else. Storage failures
//! are logged in full and reported with a fixed message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use trustdesk_core::TrustError;

use crate::roles::Role;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Role {role} may not {operation}")]
    Forbidden { role: Role, operation: &'static str },

    #[error("Caller identity is required to {0}")]
    Unauthenticated(&'static str),

    #[error(transparent)]
    Trust(#[from] TrustError),
}

impl RpcError {
    pub fn kind(&self) -> String {
        match self {
            RpcError::Forbidden { .. } => "Forbidden".to_string(),
            RpcError::Unauthenticated(_) => "Unauthenticated".to_string(),
            RpcError::Trust(e) => e.kind().to_string(),
        }
    }
}

pub type RpcResult<T> = Result<T, RpcError>;

pub const STORAGE_FAILURE_MESSAGE: &str = "Internal storage error";

/// Structured error returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: String,
    pub message: String,
}

impl From<&RpcError> for ErrorResponse {
    fn from(err: &RpcError) -> Self {
        let message = match err {
            RpcError::Trust(TrustError::Storage(detail)) => {
                tracing::error!(error = %detail, "Storage failure");
                STORAGE_FAILURE_MESSAGE.to_string()
            }
            _ => err.to_string(),
        };
        Self {
            kind: err.kind(),
            message,
        }
    }
}

impl From<RpcError> for ErrorResponse {
    fn from(err: RpcError) -> Self {
        Self::from(&err)
    }
}
