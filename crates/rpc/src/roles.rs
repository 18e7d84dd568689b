//! Role-gated invocation
//!
//! A [`RoleGate`] wraps a workflow call with the set of roles allowed to make
//! it. Handlers compose a gate with the operation instead of inheriting from a
//! role-specific base.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use trustdesk_audit::RequestContext;
use trustdesk_core::UserId;

use crate::error::{RpcError, RpcResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
    /// Schedulers and webhooks; acts without a user identity
    System,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

/// Who is calling, and from where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Option<UserId>,
    pub role: Role,
    pub request: RequestContext,
}

impl Caller {
    pub fn new(user_id: Option<UserId>, role: Role) -> Self {
        Self {
            user_id,
            role,
            request: RequestContext::default(),
        }
    }

    pub fn user(user_id: UserId) -> Self {
        Self::new(Some(user_id), Role::User)
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(Some(user_id), Role::Admin)
    }

    pub fn system() -> Self {
        Self::new(None, Role::System)
    }

    pub fn with_request(mut self, request: RequestContext) -> Self {
        self.request = request;
        self
    }

    /// Callers may act on their own records; admins on anyone's
    pub fn owns_or_admin(&self, owner: UserId) -> bool {
        self.role.is_admin() || self.user_id == Some(owner)
    }

    /// The caller's user id, required for `operation`
    pub fn require_user(&self, operation: &'static str) -> RpcResult<UserId> {
        self.user_id.ok_or(RpcError::Unauthenticated(operation))
    }
}

/// Allowed-role set for one operation
#[derive(Debug, Clone, Copy)]
pub struct RoleGate {
    operation: &'static str,
    allowed: &'static [Role],
}

impl RoleGate {
    pub const fn new(operation: &'static str, allowed: &'static [Role]) -> Self {
        Self { operation, allowed }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn permits(&self, role: Role) -> bool {
        self.allowed.contains(&role)
    }

    /// Run `op` if the caller's role is allowed, otherwise `Forbidden`
    pub fn invoke<T, F>(&self, caller: &Caller, op: F) -> RpcResult<T>
    where
        F: FnOnce() -> RpcResult<T>,
    {
        if !self.permits(caller.role) {
            tracing::warn!(
                role = %caller.role,
                user_id = ?caller.user_id,
                operation = self.operation,
                "Forbidden operation"
            );
            return Err(RpcError::Forbidden {
                role: caller.role,
                operation: self.operation,
            });
        }
        op()
    }
}

pub const ADMINS: &[Role] = &[Role::Admin, Role::SuperAdmin];
pub const USERS: &[Role] = &[Role::User, Role::Admin, Role::SuperAdmin];
pub const SCHEDULERS: &[Role] = &[Role::System, Role::SuperAdmin];
pub const ANYONE: &[Role] = &[Role::User, Role::Admin, Role::SuperAdmin, Role::System];
