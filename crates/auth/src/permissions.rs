use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque strings (e.g. "purchasing.order.write"). The
/// wildcard `"*"` grants everything within the tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

pub const ALL: Permission = Permission::from_static("*");

pub const MASTERDATA_READ: Permission = Permission::from_static("masterdata.read");
pub const MASTERDATA_WRITE: Permission = Permission::from_static("masterdata.write");

pub const PURCHASE_REQUEST_READ: Permission = Permission::from_static("purchasing.request.read");
pub const PURCHASE_REQUEST_WRITE: Permission = Permission::from_static("purchasing.request.write");
pub const PURCHASE_ORDER_READ: Permission = Permission::from_static("purchasing.order.read");
pub const PURCHASE_ORDER_WRITE: Permission = Permission::from_static("purchasing.order.write");
pub const PURCHASE_RECEIVE: Permission = Permission::from_static("purchasing.receive");

pub const SALES_ORDER_READ: Permission = Permission::from_static("sales.order.read");
pub const SALES_ORDER_WRITE: Permission = Permission::from_static("sales.order.write");
pub const SALES_DELIVERY_READ: Permission = Permission::from_static("sales.delivery.read");
pub const SALES_DELIVERY_WRITE: Permission = Permission::from_static("sales.delivery.write");
pub const SALES_INVOICE_READ: Permission = Permission::from_static("sales.invoice.read");
pub const SALES_INVOICE_WRITE: Permission = Permission::from_static("sales.invoice.write");

pub const WORKFLOW_APPROVE: Permission = Permission::from_static("workflow.approve");
pub const WORKFLOW_CONFIGURE: Permission = Permission::from_static("workflow.configure");
pub const REPORTS_READ: Permission = Permission::from_static("reports.read");
pub const USERS_MANAGE: Permission = Permission::from_static("users.manage");
