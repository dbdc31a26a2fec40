use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use tradeflow_auth::User;
use tradeflow_catalog::{Item, ItemId, Unit, UnitId, Warehouse, WarehouseId};
use tradeflow_core::{AggregateRoot, DomainError, Money, UserId};
use tradeflow_infra::projections::{Notification, StockLevel};
use tradeflow_invoicing::SalesInvoice;
use tradeflow_parties::{ContactInfo, Party, PartyId};
use tradeflow_purchasing::{PurchaseOrder, PurchaseRequest};
use tradeflow_sales::{CustomerOrder, DeliveryOrder};
use tradeflow_workflow::{
    ApprovalState, ApprovalStep, DocumentKind, LineQuantity, WorkflowDefinition, WorkflowDocument,
};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePartyRequest {
    pub code: String,
    pub name: String,
    pub contact: Option<ContactInfo>,
    #[serde(default)]
    pub payment_terms_days: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePartyRequest {
    pub name: Option<String>,
    pub contact: Option<ContactInfo>,
    pub payment_terms_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SuspendRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub unit_id: UnitId,
    pub standard_price: Money,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub unit_id: Option<UnitId>,
    pub standard_price: Option<Money>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUnitRequest {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameUnitRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateWarehouseRequest {
    pub code: String,
    pub name: String,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWarehouseRequest {
    pub name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RequestLineBody {
    pub item_id: ItemId,
    pub quantity: i64,
    pub required_by: Option<NaiveDate>,
    pub warehouse_id: WarehouseId,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePurchaseRequestBody {
    pub department: Option<String>,
    pub remarks: Option<String>,
    #[serde(default)]
    pub lines: Vec<RequestLineBody>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequestLineBody {
    pub quantity: Option<i64>,
    pub required_by: Option<NaiveDate>,
    pub warehouse_id: Option<WarehouseId>,
    pub remarks: Option<String>,
}

/// A line with a price (purchase and customer orders).
#[derive(Debug, Deserialize)]
pub struct PricedLineBody {
    pub item_id: ItemId,
    pub quantity: i64,
    pub unit_price: Money,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePricedLineBody {
    pub quantity: Option<i64>,
    pub unit_price: Option<Money>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePurchaseOrderBody {
    pub supplier_id: PartyId,
    pub warehouse_id: WarehouseId,
    pub order_date: Option<NaiveDate>,
    pub expected_date: Option<NaiveDate>,
    #[serde(default)]
    pub lines: Vec<PricedLineBody>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCustomerOrderBody {
    pub customer_id: PartyId,
    pub order_date: Option<NaiveDate>,
    pub requested_delivery_date: Option<NaiveDate>,
    pub customer_reference: Option<String>,
    #[serde(default)]
    pub lines: Vec<PricedLineBody>,
}

#[derive(Debug, Deserialize)]
pub struct ConvertLineBody {
    pub line_no: u32,
    pub quantity: Option<i64>,
    pub unit_price: Option<Money>,
}

/// Empty `lines` converts everything still outstanding.
#[derive(Debug, Deserialize)]
pub struct ConvertRequestBody {
    pub supplier_id: PartyId,
    pub warehouse_id: Option<WarehouseId>,
    pub order_date: Option<NaiveDate>,
    pub expected_date: Option<NaiveDate>,
    #[serde(default)]
    pub lines: Vec<ConvertLineBody>,
}

#[derive(Debug, Deserialize)]
pub struct ReceiptBody {
    pub warehouse_id: Option<WarehouseId>,
    pub received_on: Option<NaiveDate>,
    pub lines: Vec<LineQuantity>,
}

#[derive(Debug, Deserialize)]
pub struct DeliveryBody {
    /// Only read by `POST /delivery-orders`; the nested route takes it from the path.
    pub customer_order_id: Option<tradeflow_sales::CustomerOrderId>,
    pub warehouse_id: WarehouseId,
    pub delivery_date: Option<NaiveDate>,
    pub shipping_address: Option<String>,
    #[serde(default)]
    pub lines: Vec<LineQuantity>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceBody {
    /// Only read by `POST /sales-invoices`.
    pub delivery_order_id: Option<tradeflow_sales::DeliveryOrderId>,
    pub invoice_date: Option<NaiveDate>,
    pub tax_rate_bps: Option<u32>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveBody {
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonBody {
    pub reason: Option<String>,
}

/// Either full steps or the `roles` shorthand (one role per step, in order).
#[derive(Debug, Deserialize)]
pub struct RouteBody {
    pub steps: Option<Vec<ApprovalStep>>,
    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserBody {
    /// Must match the `sub` of the user's tokens; generated when absent.
    pub user_id: Option<UserId>,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RoleBody {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub format: Option<String>,
    pub as_of: Option<NaiveDate>,
}

// -------------------------
// Response mapping
// -------------------------

pub fn party_to_json(p: &Party) -> JsonValue {
    json!({
        "id": p.id().to_string(),
        "kind": p.kind(),
        "code": p.code(),
        "name": p.name(),
        "contact": p.contact(),
        "payment_terms_days": p.payment_terms_days(),
        "status": p.status(),
        "version": p.version(),
    })
}

pub fn item_to_json(i: &Item) -> JsonValue {
    json!({
        "id": i.id().to_string(),
        "code": i.code(),
        "name": i.name(),
        "description": i.description(),
        "unit_id": i.unit_id().map(|u| u.to_string()),
        "standard_price": i.standard_price(),
        "status": i.status(),
        "version": i.version(),
    })
}

pub fn unit_to_json(u: &Unit) -> JsonValue {
    json!({
        "id": u.id().to_string(),
        "code": u.code(),
        "name": u.name(),
        "version": u.version(),
    })
}

pub fn warehouse_to_json(w: &Warehouse) -> JsonValue {
    json!({
        "id": w.id().to_string(),
        "code": w.code(),
        "name": w.name(),
        "address": w.address(),
        "active": w.is_active(),
        "version": w.version(),
    })
}

pub fn user_to_json(u: &User) -> JsonValue {
    json!({
        "id": u.id.to_string(),
        "email": u.email,
        "display_name": u.display_name,
        "roles": u.roles.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "status": u.status,
        "version": u.version,
    })
}

pub fn stock_to_json(level: &StockLevel) -> JsonValue {
    json!({
        "item_id": level.item_id.to_string(),
        "warehouse_id": level.warehouse_id.to_string(),
        "received": level.received,
        "dispatched": level.dispatched,
        "on_hand": level.on_hand(),
    })
}

pub fn notification_to_json(n: &Notification) -> JsonValue {
    json!({
        "id": n.id.to_string(),
        "recipient": n.recipient,
        "title": n.title,
        "message": n.message,
        "document_kind": n.document_kind,
        "document_id": n.document_id.to_string(),
        "document_number": n.document_number,
        "created_at": n.created_at,
        "read": n.read,
    })
}

pub fn definition_to_json(kind: DocumentKind, definition: Option<&WorkflowDefinition>) -> JsonValue {
    json!({
        "kind": kind,
        "title": kind.title(),
        "route": definition.map(|d| d.route().clone()).unwrap_or_default(),
        "revision": definition.map(|d| d.revision()).unwrap_or(0),
    })
}

pub fn approval_to_json(approval: &ApprovalState) -> JsonValue {
    json!({
        "status": approval.status(),
        "route": approval.route(),
        "pending_step": approval.pending_step(),
        "submitted_by": approval.submitted_by().map(|u| u.to_string()),
        "history": approval.history(),
    })
}

fn document_head(kind: DocumentKind, id: String, number: &str, approval: &ApprovalState, version: u64) -> JsonValue {
    json!({
        "id": id,
        "kind": kind,
        "number": number,
        "status": approval.status(),
        "approval": approval_to_json(approval),
        "version": version,
    })
}

fn extend(mut head: JsonValue, body: JsonValue) -> JsonValue {
    if let (Some(head), JsonValue::Object(body)) = (head.as_object_mut(), body) {
        head.extend(body);
    }
    head
}

pub fn purchase_request_to_json(pr: &PurchaseRequest) -> Result<JsonValue, DomainError> {
    let lines: Vec<_> = pr
        .lines()
        .iter()
        .map(|l| {
            json!({
                "line_no": l.data.line_no,
                "item_id": l.data.item_id.to_string(),
                "quantity": l.data.quantity,
                "required_by": l.data.required_by,
                "warehouse_id": l.data.warehouse_id.to_string(),
                "remarks": l.data.remarks,
                "ordered": l.ordered.fulfilled(),
                "outstanding": l.outstanding(),
            })
        })
        .collect();
    Ok(extend(
        document_head(DocumentKind::PurchaseRequest, pr.id().to_string(), pr.number(), pr.approval(), pr.version()),
        json!({
            "requested_by": pr.requested_by().map(|u| u.to_string()),
            "department": pr.department(),
            "remarks": pr.remarks(),
            "lines": lines,
        }),
    ))
}

pub fn purchase_order_to_json(po: &PurchaseOrder) -> Result<JsonValue, DomainError> {
    let mut lines = Vec::with_capacity(po.lines().len());
    for l in po.lines() {
        lines.push(json!({
            "line_no": l.data.line_no,
            "item_id": l.data.item_id.to_string(),
            "quantity": l.data.quantity,
            "unit_price": l.data.unit_price,
            "amount": l.data.amount()?,
            "source": l.data.source,
            "received": l.received.fulfilled(),
            "outstanding": l.outstanding(),
        }));
    }
    Ok(extend(
        document_head(DocumentKind::PurchaseOrder, po.id().to_string(), po.number(), po.approval(), po.version()),
        json!({
            "supplier_id": po.supplier_id().map(|p| p.to_string()),
            "warehouse_id": po.warehouse_id().map(|w| w.to_string()),
            "order_date": po.order_date(),
            "expected_date": po.expected_date(),
            "source_request": po.source_request().map(|r| r.to_string()),
            "total": po.total()?,
            "fully_received": po.is_fully_received(),
            "receipt_count": po.receipt_count(),
            "lines": lines,
        }),
    ))
}

pub fn customer_order_to_json(co: &CustomerOrder) -> Result<JsonValue, DomainError> {
    let mut lines = Vec::with_capacity(co.lines().len());
    for l in co.lines() {
        lines.push(json!({
            "line_no": l.data.line_no,
            "item_id": l.data.item_id.to_string(),
            "quantity": l.data.quantity,
            "unit_price": l.data.unit_price,
            "amount": l.data.amount()?,
            "delivered": l.delivered.fulfilled(),
            "outstanding": l.outstanding(),
        }));
    }
    Ok(extend(
        document_head(DocumentKind::CustomerOrder, co.id().to_string(), co.number(), co.approval(), co.version()),
        json!({
            "customer_id": co.customer_id().map(|p| p.to_string()),
            "order_date": co.order_date(),
            "requested_delivery_date": co.requested_delivery_date(),
            "customer_reference": co.customer_reference(),
            "total": co.total()?,
            "fully_delivered": co.is_fully_delivered(),
            "lines": lines,
        }),
    ))
}

pub fn delivery_order_to_json(d: &DeliveryOrder) -> Result<JsonValue, DomainError> {
    let lines: Vec<_> = d
        .lines()
        .iter()
        .map(|l| {
            json!({
                "line_no": l.data.line_no,
                "order_line_no": l.data.order_line_no,
                "item_id": l.data.item_id.to_string(),
                "quantity": l.data.quantity,
                "unit_price": l.data.unit_price,
                "invoiced": l.invoiced.fulfilled(),
                "uninvoiced": l.uninvoiced(),
            })
        })
        .collect();
    Ok(extend(
        document_head(DocumentKind::DeliveryOrder, d.id().to_string(), d.number(), d.approval(), d.version()),
        json!({
            "customer_order_id": d.customer_order_id().map(|o| o.to_string()),
            "customer_id": d.customer_id().map(|p| p.to_string()),
            "warehouse_id": d.warehouse_id().map(|w| w.to_string()),
            "delivery_date": d.delivery_date(),
            "shipping_address": d.shipping_address(),
            "dispatched": d.is_dispatched(),
            "total": d.total()?,
            "lines": lines,
        }),
    ))
}

pub fn sales_invoice_to_json(si: &SalesInvoice) -> Result<JsonValue, DomainError> {
    let totals = si.totals();
    Ok(extend(
        document_head(DocumentKind::SalesInvoice, si.id().to_string(), si.number(), si.approval(), si.version()),
        json!({
            "customer_id": si.customer_id().map(|p| p.to_string()),
            "delivery_order_id": si.delivery_order_id().map(|d| d.to_string()),
            "invoice_date": si.invoice_date(),
            "due_date": si.due_date(),
            "tax_rate_bps": si.tax_rate_bps(),
            "subtotal": totals.subtotal,
            "tax": totals.tax,
            "total": totals.total,
            "notes": si.notes(),
            "lines": si.lines(),
        }),
    ))
}
