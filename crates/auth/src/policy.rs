//! Built-in role → permission policy.

use crate::Role;
use crate::permissions::{self as p, Permission};

/// Roles every tenant starts with.
pub const BUILTIN_ROLES: [&str; 7] = [
    "admin",
    "manager",
    "purchaser",
    "salesperson",
    "warehouse",
    "accountant",
    "user",
];

/// Permissions granted by a built-in role. Unknown roles grant nothing, though
/// they can still name approval steps.
pub fn default_role_permissions(role: &str) -> Vec<Permission> {
    match role {
        "admin" => vec![p::ALL],
        "manager" => vec![
            p::MASTERDATA_READ,
            p::MASTERDATA_WRITE,
            p::PURCHASE_REQUEST_READ,
            p::PURCHASE_REQUEST_WRITE,
            p::PURCHASE_ORDER_READ,
            p::PURCHASE_ORDER_WRITE,
            p::SALES_ORDER_READ,
            p::SALES_ORDER_WRITE,
            p::SALES_DELIVERY_READ,
            p::SALES_INVOICE_READ,
            p::WORKFLOW_APPROVE,
            p::REPORTS_READ,
        ],
        "purchaser" => vec![
            p::MASTERDATA_READ,
            p::PURCHASE_REQUEST_READ,
            p::PURCHASE_REQUEST_WRITE,
            p::PURCHASE_ORDER_READ,
            p::PURCHASE_ORDER_WRITE,
            p::REPORTS_READ,
        ],
        "salesperson" => vec![
            p::MASTERDATA_READ,
            p::SALES_ORDER_READ,
            p::SALES_ORDER_WRITE,
            p::SALES_DELIVERY_READ,
            p::REPORTS_READ,
        ],
        "warehouse" => vec![
            p::MASTERDATA_READ,
            p::PURCHASE_ORDER_READ,
            p::PURCHASE_RECEIVE,
            p::SALES_ORDER_READ,
            p::SALES_DELIVERY_READ,
            p::SALES_DELIVERY_WRITE,
            p::REPORTS_READ,
        ],
        "accountant" => vec![
            p::MASTERDATA_READ,
            p::SALES_ORDER_READ,
            p::SALES_DELIVERY_READ,
            p::SALES_INVOICE_READ,
            p::SALES_INVOICE_WRITE,
            p::PURCHASE_ORDER_READ,
            p::REPORTS_READ,
        ],
        "user" => vec![p::MASTERDATA_READ, p::PURCHASE_REQUEST_READ, p::PURCHASE_REQUEST_WRITE],
        _ => Vec::new(),
    }
}

/// Union of the permissions granted by `roles`, without duplicates.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    let mut out: Vec<Permission> = Vec::new();
    for role in roles {
        for perm in default_role_permissions(role.as_str()) {
            if !out.contains(&perm) {
                out.push(perm);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_is_wildcard() {
        assert_eq!(default_role_permissions("admin"), vec![p::ALL]);
    }

    #[test]
    fn every_builtin_role_grants_something() {
        for role in BUILTIN_ROLES {
            assert!(!default_role_permissions(role).is_empty(), "{role}");
        }
        assert!(default_role_permissions("director").is_empty());
    }

    #[test]
    fn union_deduplicates() {
        let perms = permissions_for_roles(&[Role::new("purchaser"), Role::new("manager")]);
        let reads = perms.iter().filter(|perm| **perm == p::MASTERDATA_READ).count();
        assert_eq!(reads, 1);
        assert!(perms.contains(&p::WORKFLOW_APPROVE));
        assert!(!perms.contains(&p::USERS_MANAGE));
    }
}
