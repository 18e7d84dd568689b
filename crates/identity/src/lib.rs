//! TrustDesk Identity Verification
//!
//! Tracks a user's verification attempt from document submission through a
//! phone code challenge. Every status change is committed with one audit entry.
//!
//! ## Key Components
//!
//! - [`workflow::IdentityWorkflow`] - submit, request code, confirm, reject, expiry sweep
//! - [`repository::VerificationRepository`] - versioned persistence boundary
//! - [`config::IdentityPolicy`] - attempt limit, code TTL and length

pub mod config;
pub mod repository;
pub mod verification;
pub mod workflow;

pub use config::IdentityPolicy;
pub use repository::{MemoryVerificationStore, VerificationRepository};
pub use verification::{IdentityVerification, VerificationStatus, ENTITY_TYPE};
pub use workflow::{CodeConfirmation, ConfirmOutcome, IdentityWorkflow};
