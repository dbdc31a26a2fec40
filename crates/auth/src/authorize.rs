use serde::Serialize;
use thiserror::Error;

use tradeflow_core::{TenantId, UserId};

use crate::policy::permissions_for_roles;
use crate::{JwtClaims, Permission, Role};

/// A principal's membership in a tenant: which roles it holds there and the
/// permissions those roles resolve to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantMembership {
    pub tenant_id: TenantId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

/// A fully resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

impl Principal {
    /// Resolve a principal from verified claims using the built-in policy.
    pub fn from_claims(claims: &JwtClaims) -> Self {
        Self {
            user_id: claims.sub,
            active_tenant_id: claims.tenant_id,
            membership: TenantMembership {
                tenant_id: claims.tenant_id,
                roles: claims.roles.clone(),
                permissions: permissions_for_roles(&claims.roles),
            },
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.membership.roles.iter().any(|r| r.as_str() == role)
    }

    pub fn is_admin(&self) -> bool {
        self.membership.roles.iter().any(Role::is_admin)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Command-side authorization contract (checked at the command boundary).
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Authorize a principal for `required` within `tenant_id`.
pub fn authorize(principal: &Principal, tenant_id: TenantId, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_tenant_id != tenant_id || principal.membership.tenant_id != tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    let granted = principal
        .membership
        .permissions
        .iter()
        .any(|p| p.is_wildcard() || p == required);

    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::permissions as p;

    fn principal(roles: &[&'static str]) -> Principal {
        let claims = JwtClaims::new(
            UserId::new(),
            TenantId::new(),
            roles.iter().map(|r| Role::new(*r)).collect(),
            Utc::now(),
            Duration::minutes(5),
        );
        Principal::from_claims(&claims)
    }

    #[test]
    fn admin_wildcard_allows_everything() {
        let admin = principal(&["admin"]);
        let tenant = admin.active_tenant_id;
        assert!(authorize(&admin, tenant, &p::USERS_MANAGE).is_ok());
        assert!(admin.is_admin());
    }

    #[test]
    fn missing_permission_is_forbidden() {
        let clerk = principal(&["salesperson"]);
        let tenant = clerk.active_tenant_id;
        assert!(authorize(&clerk, tenant, &p::SALES_ORDER_WRITE).is_ok());
        assert_eq!(
            authorize(&clerk, tenant, &p::PURCHASE_ORDER_WRITE),
            Err(AuthzError::Forbidden("purchasing.order.write".into()))
        );
    }

    #[test]
    fn other_tenant_is_refused_even_for_admin() {
        let admin = principal(&["admin"]);
        assert_eq!(
            authorize(&admin, TenantId::new(), &p::MASTERDATA_READ),
            Err(AuthzError::TenantMismatch)
        );
    }
}
