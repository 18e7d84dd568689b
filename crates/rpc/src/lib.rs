//! TrustDesk RPC - application orchestrator
//!
//! Wires the store, recorder, risk engine and workflows into an [`AppContext`],
//! gates every operation by caller role, and maps failures to
//! [`ErrorResponse`]s. The `trustdesk` binary is a thin CLI over [`commands`].

pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod roles;

pub use config::{TrustConfig, CONFIG_ENV};
pub use context::AppContext;
pub use error::{ErrorResponse, RpcError, RpcResult};
pub use handlers::{ChainReport, CodeIssued};
pub use roles::{Caller, Role, RoleGate};
