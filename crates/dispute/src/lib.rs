//! TrustDesk Dispute Resolution
//!
//! Disputes between booking counterparties, adjudicated by admins. Terminal
//! outcomes are immutable, and every transition is committed with one audit
//! entry.
//!
//! ## Key Components
//!
//! - [`workflow::DisputeWorkflow`] - open, review, resolve, reject, stale escalation
//! - [`repository::DisputeRepository`] - versioned persistence boundary
//! - [`config::DisputePolicy`] - escalation windows per risk severity

pub mod config;
pub mod dispute;
pub mod repository;
pub mod workflow;

pub use config::DisputePolicy;
pub use dispute::{Dispute, DisputeStatus, ENTITY_TYPE};
pub use repository::{DisputeRepository, MemoryDisputeStore};
pub use workflow::DisputeWorkflow;
