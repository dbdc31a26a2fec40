//! Human-facing document numbers (`PO-000042`), per tenant and kind.

use std::collections::HashMap;
use std::sync::Mutex;

use tradeflow_core::TenantId;
use tradeflow_workflow::{DocumentKind, WorkflowDocument};

use crate::projections::ReadModels;

#[derive(Debug, Default)]
pub struct DocumentNumbering {
    last: Mutex<HashMap<(TenantId, DocumentKind), u64>>,
}

impl DocumentNumbering {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(kind: DocumentKind, n: u64) -> String {
        format!("{}-{n:06}", kind.number_prefix())
    }

    /// Sequence part of a number of this kind, if it is one.
    pub fn parse(kind: DocumentKind, number: &str) -> Option<u64> {
        number
            .strip_prefix(kind.number_prefix())?
            .strip_prefix('-')?
            .parse()
            .ok()
    }

    /// Reserve the next number. Numbers are never handed out twice, even when
    /// the create that used one fails.
    pub fn next(&self, tenant_id: TenantId, kind: DocumentKind) -> String {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let n = last.entry((tenant_id, kind)).or_insert(0);
        *n += 1;
        Self::format(kind, *n)
    }

    /// Make sure `number` is never issued again.
    pub fn observe(&self, tenant_id: TenantId, kind: DocumentKind, number: &str) {
        let Some(seen) = Self::parse(kind, number) else {
            return;
        };
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let n = last.entry((tenant_id, kind)).or_insert(0);
        *n = (*n).max(seen);
    }

    /// Continue after the highest number already present in the read models.
    pub fn seed(&self, read_models: &ReadModels, tenants: impl IntoIterator<Item = TenantId>) {
        for tenant_id in tenants {
            self.observe_all(tenant_id, read_models.purchase_requests.list(tenant_id));
            self.observe_all(tenant_id, read_models.purchase_orders.list(tenant_id));
            self.observe_all(tenant_id, read_models.customer_orders.list(tenant_id));
            self.observe_all(tenant_id, read_models.delivery_orders.list(tenant_id));
            self.observe_all(tenant_id, read_models.sales_invoices.list(tenant_id));
        }
    }

    fn observe_all<D: WorkflowDocument>(&self, tenant_id: TenantId, docs: Vec<D>) {
        for doc in docs {
            self.observe(tenant_id, D::KIND, doc.number());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_are_sequential_per_tenant_and_kind() {
        let numbering = DocumentNumbering::new();
        let (a, b) = (TenantId::new(), TenantId::new());

        assert_eq!(numbering.next(a, DocumentKind::PurchaseOrder), "PO-000001");
        assert_eq!(numbering.next(a, DocumentKind::PurchaseOrder), "PO-000002");
        assert_eq!(numbering.next(a, DocumentKind::SalesInvoice), "SI-000001");
        assert_eq!(numbering.next(b, DocumentKind::PurchaseOrder), "PO-000001");
    }

    #[test]
    fn observed_numbers_are_skipped() {
        let numbering = DocumentNumbering::new();
        let tenant = TenantId::new();

        numbering.observe(tenant, DocumentKind::CustomerOrder, "CO-000041");
        numbering.observe(tenant, DocumentKind::CustomerOrder, "CO-000007");
        numbering.observe(tenant, DocumentKind::CustomerOrder, "PO-000900");

        assert_eq!(numbering.next(tenant, DocumentKind::CustomerOrder), "CO-000042");
    }

    #[test]
    fn parse_requires_matching_prefix() {
        assert_eq!(DocumentNumbering::parse(DocumentKind::DeliveryOrder, "DO-000123"), Some(123));
        assert_eq!(DocumentNumbering::parse(DocumentKind::DeliveryOrder, "DO000123"), None);
        assert_eq!(DocumentNumbering::parse(DocumentKind::DeliveryOrder, "SI-000123"), None);
    }
}
