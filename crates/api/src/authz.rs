//! API-side authorization guard for commands.
//!
//! This enforces authorization at the command boundary (before dispatch),
//! while keeping domain aggregates and infra auth-agnostic.

use tradeflow_auth::{AuthzError, CommandAuthorization, Permission, authorize};

use crate::context::{PrincipalContext, TenantContext};

/// Check authorization for a command in the current request context.
///
/// This is intended to be called **before** dispatching a command.
pub fn authorize_command<C: CommandAuthorization>(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let resolved = principal.principal(tenant);
    for perm in command.required_permissions() {
        authorize(&resolved, tenant.tenant_id(), perm)?;
    }
    Ok(())
}

/// Check a single permission (queries and multi-document flows).
pub fn require(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    permission: &Permission,
) -> Result<(), AuthzError> {
    authorize(&principal.principal(tenant), tenant.tenant_id(), permission)
}
