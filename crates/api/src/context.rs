use tradeflow_auth::{Principal, Role, TenantMembership, permissions_for_roles};
use tradeflow_core::{TenantId, UserId};
use tradeflow_workflow::Actor;

/// Tenant context for a request.
///
/// This is immutable and must be present for all domain routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Principal context for a request (authenticated user + roles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, roles: Vec<Role>) -> Self {
        Self { user_id, roles }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.as_str().to_string()).collect()
    }

    /// The workflow actor this request acts as.
    pub fn actor(&self) -> Actor {
        Actor::new(self.user_id, self.role_names())
    }

    /// Resolve the principal for `tenant` with the built-in policy.
    pub fn principal(&self, tenant: &TenantContext) -> Principal {
        Principal {
            user_id: self.user_id,
            active_tenant_id: tenant.tenant_id(),
            membership: TenantMembership {
                tenant_id: tenant.tenant_id(),
                roles: self.roles.clone(),
                permissions: permissions_for_roles(&self.roles),
            },
        }
    }
}
