//! Printable snapshots of the workflow documents.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use tradeflow_core::{AggregateId, DomainError, TenantId, UserId};
use tradeflow_catalog::{ItemId, WarehouseId};
use tradeflow_infra::ReadModels;
use tradeflow_invoicing::SalesInvoice;
use tradeflow_parties::PartyId;
use tradeflow_purchasing::{PurchaseOrder, PurchaseRequest};
use tradeflow_sales::{CustomerOrder, DeliveryOrder};
use tradeflow_workflow::{ApprovalState, DocumentKind, WorkflowDocument, WorkflowTransition};

/// Field values keyed like [`crate::DocumentLayout`] placements, plus table
/// rows in column order. A key that is absent is not printed at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintableDocument {
    pub kind: DocumentKind,
    pub fields: BTreeMap<&'static str, String>,
    pub rows: Vec<Vec<String>>,
}

impl PrintableDocument {
    fn start<D: WorkflowDocument>(doc: &D) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("title", D::KIND.title().to_uppercase());
        fields.insert("number", doc.number().to_string());
        fields.insert("status", doc.approval().status().to_string());
        Self { kind: D::KIND, fields, rows: Vec::new() }
    }

    fn set(&mut self, key: &'static str, value: impl Into<String>) {
        self.fields.insert(key, value.into());
    }

    fn set_opt(&mut self, key: &'static str, value: Option<impl Into<String>>) {
        if let Some(value) = value {
            self.set(key, value);
        }
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn file_name(&self) -> String {
        let number = self.field("number").unwrap_or("document");
        format!("{number}.pdf")
    }

    pub fn purchase_request(pr: &PurchaseRequest, dir: &Directory<'_>) -> Self {
        let mut doc = Self::start(pr);
        doc.set_opt("requested_by", pr.requested_by().map(|u| dir.user_name(u)));
        doc.set_opt("department", pr.department());
        doc.set_opt("remarks", pr.remarks());
        doc.set_opt("approval", approval_summary(pr.approval(), dir));

        for line in pr.lines() {
            let (code, name, unit) = dir.item(line.data.item_id);
            doc.rows.push(vec![
                line.data.line_no.to_string(),
                code,
                name,
                line.data.quantity.to_string(),
                unit,
                date_or_blank(line.data.required_by),
                dir.warehouse_name(line.data.warehouse_id),
                line.ordered.fulfilled().to_string(),
            ]);
        }
        doc
    }

    pub fn purchase_order(po: &PurchaseOrder, dir: &Directory<'_>) -> Result<Self, DomainError> {
        let mut doc = Self::start(po);
        doc.set_opt("date", po.order_date().map(|d| d.to_string()));
        doc.set_opt("expected_date", po.expected_date().map(|d| d.to_string()));
        if let Some(supplier) = po.supplier_id() {
            doc.set("party", dir.party_name(supplier));
            doc.set_opt("party_address", dir.party_address(supplier));
        }
        doc.set_opt("warehouse", po.warehouse_id().map(|w| dir.warehouse_name(w)));
        doc.set_opt(
            "reference",
            po.source_request().and_then(|r| dir.document_number::<PurchaseRequest>(r.0)),
        );
        doc.set("total", format!("Total: {}", po.total()?));
        doc.set_opt("approval", approval_summary(po.approval(), dir));

        for line in po.lines() {
            let (code, name, unit) = dir.item(line.data.item_id);
            doc.rows.push(vec![
                line.data.line_no.to_string(),
                code,
                name,
                line.data.quantity.to_string(),
                unit,
                line.data.unit_price.to_string(),
                line.data.amount()?.to_string(),
                line.received.fulfilled().to_string(),
            ]);
        }
        Ok(doc)
    }

    pub fn customer_order(co: &CustomerOrder, dir: &Directory<'_>) -> Result<Self, DomainError> {
        let mut doc = Self::start(co);
        doc.set_opt("date", co.order_date().map(|d| d.to_string()));
        doc.set_opt("expected_date", co.requested_delivery_date().map(|d| d.to_string()));
        if let Some(customer) = co.customer_id() {
            doc.set("party", dir.party_name(customer));
            doc.set_opt("party_address", dir.party_address(customer));
        }
        doc.set_opt("reference", co.customer_reference());
        doc.set("total", format!("Total: {}", co.total()?));
        doc.set_opt("approval", approval_summary(co.approval(), dir));

        for line in co.lines() {
            let (code, name, unit) = dir.item(line.data.item_id);
            doc.rows.push(vec![
                line.data.line_no.to_string(),
                code,
                name,
                line.data.quantity.to_string(),
                unit,
                line.data.unit_price.to_string(),
                line.data.amount()?.to_string(),
                line.delivered.fulfilled().to_string(),
            ]);
        }
        Ok(doc)
    }

    pub fn delivery_order(delivery: &DeliveryOrder, dir: &Directory<'_>) -> Self {
        let mut doc = Self::start(delivery);
        doc.set_opt("date", delivery.delivery_date().map(|d| d.to_string()));
        if let Some(customer) = delivery.customer_id() {
            doc.set("party", dir.party_name(customer));
        }
        doc.set_opt("party_address", delivery.shipping_address());
        doc.set_opt("warehouse", delivery.warehouse_id().map(|w| dir.warehouse_name(w)));
        doc.set_opt(
            "reference",
            delivery
                .customer_order_id()
                .and_then(|o| dir.document_number::<CustomerOrder>(o.0)),
        );
        doc.set("received_by", "");
        doc.set_opt("approval", approval_summary(delivery.approval(), dir));

        for line in delivery.lines() {
            let (code, name, unit) = dir.item(line.data.item_id);
            doc.rows.push(vec![
                line.data.line_no.to_string(),
                line.data.order_line_no.to_string(),
                code,
                name,
                line.data.quantity.to_string(),
                unit,
            ]);
        }
        doc
    }

    pub fn sales_invoice(invoice: &SalesInvoice, dir: &Directory<'_>) -> Self {
        let mut doc = Self::start(invoice);
        doc.set_opt("date", invoice.invoice_date().map(|d| d.to_string()));
        doc.set_opt("due_date", invoice.due_date().map(|d| d.to_string()));
        if let Some(customer) = invoice.customer_id() {
            doc.set("party", dir.party_name(customer));
            doc.set_opt("party_address", dir.party_address(customer));
        }
        doc.set_opt(
            "reference",
            invoice
                .delivery_order_id()
                .and_then(|d| dir.document_number::<DeliveryOrder>(d.0)),
        );
        let totals = invoice.totals();
        doc.set("subtotal", totals.subtotal.to_string());
        doc.set("tax", format!("{} ({})", totals.tax, bps_percent(invoice.tax_rate_bps())));
        doc.set("total", format!("Total: {}", totals.total));
        doc.set_opt("notes", invoice.notes());

        for line in invoice.lines() {
            let (code, name, unit) = dir.item(line.item_id);
            doc.rows.push(vec![
                line.line_no.to_string(),
                code,
                name,
                line.quantity.to_string(),
                unit,
                line.unit_price.to_string(),
                line.amount.to_string(),
            ]);
        }
        doc
    }
}

/// Resolves ids to the names printed on documents and reports.
pub struct Directory<'a> {
    read_models: &'a ReadModels,
    tenant_id: TenantId,
}

impl<'a> Directory<'a> {
    pub fn new(read_models: &'a ReadModels, tenant_id: TenantId) -> Self {
        Self { read_models, tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn read_models(&self) -> &'a ReadModels {
        self.read_models
    }

    pub fn party_name(&self, id: PartyId) -> String {
        self.read_models
            .parties
            .get(self.tenant_id, id.0)
            .map(|p| p.name().to_string())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn party_address(&self, id: PartyId) -> Option<String> {
        self.read_models
            .parties
            .get(self.tenant_id, id.0)
            .and_then(|p| p.contact().address.clone())
    }

    /// `(code, name, unit code)` of an item.
    pub fn item(&self, id: ItemId) -> (String, String, String) {
        match self.read_models.items.get(self.tenant_id, id.0) {
            Some(item) => {
                let unit = item
                    .unit_id()
                    .and_then(|u| self.read_models.units.get(self.tenant_id, u.0))
                    .map(|u| u.code().to_string())
                    .unwrap_or_default();
                (item.code().to_string(), item.name().to_string(), unit)
            }
            None => (id.to_string(), String::new(), String::new()),
        }
    }

    pub fn warehouse_name(&self, id: WarehouseId) -> String {
        self.read_models
            .warehouses
            .get(self.tenant_id, id.0)
            .map(|w| w.name().to_string())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn user_name(&self, id: UserId) -> String {
        self.read_models
            .users
            .get(self.tenant_id, AggregateId::from_uuid(*id.as_uuid()))
            .map(|u| u.display_name)
            .unwrap_or_else(|| id.to_string())
    }

    /// Number of a document of kind `D`, if it is visible to this tenant.
    pub fn document_number<D: WorkflowDocument>(&self, id: AggregateId) -> Option<String> {
        let rm = self.read_models;
        let t = self.tenant_id;
        match D::KIND {
            DocumentKind::PurchaseRequest => rm.purchase_requests.get(t, id).map(|d| d.number().to_string()),
            DocumentKind::PurchaseOrder => rm.purchase_orders.get(t, id).map(|d| d.number().to_string()),
            DocumentKind::CustomerOrder => rm.customer_orders.get(t, id).map(|d| d.number().to_string()),
            DocumentKind::DeliveryOrder => rm.delivery_orders.get(t, id).map(|d| d.number().to_string()),
            DocumentKind::SalesInvoice => rm.sales_invoices.get(t, id).map(|d| d.number().to_string()),
        }
    }
}

/// "Approved by A, B" once any step was approved.
fn approval_summary(approval: &ApprovalState, dir: &Directory<'_>) -> Option<String> {
    let approvers: Vec<String> = approval
        .history()
        .iter()
        .filter(|r| matches!(r.transition, WorkflowTransition::StepApproved { .. }))
        .map(|r| format!("{} ({})", dir.user_name(r.actor), r.at.date_naive()))
        .collect();
    (!approvers.is_empty()).then(|| format!("approved by {}", approvers.join(", ")))
}

fn date_or_blank(date: Option<NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_default()
}

pub(crate) fn bps_percent(bps: u32) -> String {
    format!("{}.{:02}%", bps / 100, bps % 100)
}
