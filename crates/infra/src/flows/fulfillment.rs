//! Customer order → delivery order → sales invoice.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

use tradeflow_catalog::WarehouseId;
use tradeflow_core::{AggregateId, DomainError, TenantId};
use tradeflow_events::{EventBus, EventEnvelope};
use tradeflow_invoicing::{
    CreateSalesInvoice, NewInvoiceLine, SalesInvoice, SalesInvoiceCommand, SalesInvoiceId,
};
use tradeflow_parties::PartyKind;
use tradeflow_sales::{
    AllocateDelivery, CreateDeliveryOrder, CustomerOrder, CustomerOrderCommand, CustomerOrderId,
    DeliveryOrder, DeliveryOrderCommand, DeliveryOrderId, NewDeliveryLine, RecordInvoiced,
    ReleaseDelivery, ReleaseInvoiced,
};
use tradeflow_workflow::{Actor, LineQuantity, WorkflowDocument};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, StoredEvent};

use super::{
    FlowError, cancel_if_needed, dispatch_document, ensure_party, ensure_warehouse, load_document,
    with_compensation,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDelivery {
    pub tenant_id: TenantId,
    pub customer_order_id: CustomerOrderId,
    pub delivery_id: DeliveryOrderId,
    pub number: String,
    pub warehouse_id: WarehouseId,
    pub delivery_date: NaiveDate,
    /// Defaults to the customer's address.
    pub shipping_address: Option<String>,
    /// Quantities per order line; empty means all outstanding.
    pub lines: Vec<LineQuantity>,
    pub occurred_at: DateTime<Utc>,
}

/// Create a draft delivery order for outstanding quantities of an approved
/// customer order.
pub fn create_delivery<S, B>(dispatcher: &CommandDispatcher<S, B>, req: CreateDelivery) -> Result<DeliveryOrder, FlowError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let tenant_id = req.tenant_id;
    let order: CustomerOrder = load_document(dispatcher, tenant_id, req.customer_order_id.0)?;
    order.approval().ensure_fulfillable().map_err(DispatchError::from)?;
    let customer_id = order
        .customer_id()
        .ok_or_else(|| DispatchError::InvariantViolation("customer order has no customer".to_string()))?;
    let customer = ensure_party(dispatcher, tenant_id, customer_id, PartyKind::Customer)?;
    ensure_warehouse(dispatcher, tenant_id, req.warehouse_id)?;

    let wanted: Vec<LineQuantity> = if req.lines.is_empty() {
        order
            .lines()
            .iter()
            .filter(|l| l.outstanding() > 0)
            .map(|l| LineQuantity { line_no: l.data.line_no, quantity: l.outstanding() })
            .collect()
    } else {
        req.lines.clone()
    };
    if wanted.is_empty() {
        return Err(DispatchError::from(DomainError::invariant("customer order has nothing left to deliver")).into());
    }

    let mut delivery_lines = Vec::with_capacity(wanted.len());
    for w in &wanted {
        let line = order
            .lines()
            .iter()
            .find(|l| l.data.line_no == w.line_no)
            .ok_or_else(|| DispatchError::Validation(format!("order line {} does not exist", w.line_no)))?;
        delivery_lines.push(NewDeliveryLine {
            order_line_no: w.line_no,
            item_id: line.data.item_id,
            quantity: w.quantity,
            unit_price: line.data.unit_price,
        });
    }

    dispatch_document::<CustomerOrder, _, _>(
        dispatcher,
        tenant_id,
        req.customer_order_id.0,
        CustomerOrderCommand::AllocateDelivery(AllocateDelivery {
            tenant_id,
            order_id: req.customer_order_id,
            delivery_order_id: req.delivery_id.0,
            lines: wanted,
            occurred_at: req.occurred_at,
        }),
    )?;

    let shipping_address = req
        .shipping_address
        .clone()
        .or_else(|| customer.contact().address.clone());
    let create = DeliveryOrderCommand::CreateDeliveryOrder(CreateDeliveryOrder {
        tenant_id,
        delivery_id: req.delivery_id,
        number: req.number.clone(),
        customer_order_id: req.customer_order_id,
        customer_id,
        warehouse_id: req.warehouse_id,
        delivery_date: req.delivery_date,
        shipping_address,
        lines: delivery_lines,
        occurred_at: req.occurred_at,
    });
    with_compensation(
        "create delivery order",
        || dispatch_document::<DeliveryOrder, _, _>(dispatcher, tenant_id, req.delivery_id.0, create),
        || release_delivery(dispatcher, tenant_id, req.customer_order_id, req.delivery_id.0, req.occurred_at),
    )?;

    info!(tenant_id = %tenant_id, order = %req.customer_order_id, delivery = %req.delivery_id, "delivery order created");
    Ok(load_document(dispatcher, tenant_id, req.delivery_id.0)?)
}

/// Cancel an undispatched delivery order and release its quantities on the
/// customer order.
pub fn cancel_delivery<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    delivery_id: DeliveryOrderId,
    actor: &Actor,
    reason: &str,
    occurred_at: DateTime<Utc>,
) -> Result<DeliveryOrder, FlowError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let delivery: DeliveryOrder = load_document(dispatcher, tenant_id, delivery_id.0)?;
    if delivery.is_dispatched() {
        return Err(DispatchError::InvariantViolation("dispatched delivery orders cannot be cancelled".to_string()).into());
    }
    cancel_if_needed(dispatcher, tenant_id, &delivery, delivery_id.0, actor, reason, occurred_at)?;

    if let Some(order_id) = delivery.customer_order_id() {
        release_delivery(dispatcher, tenant_id, order_id, delivery_id.0, occurred_at)?;
    }
    Ok(load_document(dispatcher, tenant_id, delivery_id.0)?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateInvoice {
    pub tenant_id: TenantId,
    pub delivery_order_id: DeliveryOrderId,
    pub invoice_id: SalesInvoiceId,
    pub number: String,
    pub invoice_date: NaiveDate,
    pub tax_rate_bps: u32,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Bill every uninvoiced quantity of a dispatched delivery order.
pub fn create_invoice<S, B>(dispatcher: &CommandDispatcher<S, B>, req: CreateInvoice) -> Result<SalesInvoice, FlowError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let tenant_id = req.tenant_id;
    let delivery: DeliveryOrder = load_document(dispatcher, tenant_id, req.delivery_order_id.0)?;
    if !delivery.is_open_for_invoicing() {
        return Err(DispatchError::InvariantViolation(
            "only approved, dispatched delivery orders can be invoiced".to_string(),
        )
        .into());
    }
    let customer_id = delivery
        .customer_id()
        .ok_or_else(|| DispatchError::InvariantViolation("delivery order has no customer".to_string()))?;
    let customer = ensure_party(dispatcher, tenant_id, customer_id, PartyKind::Customer)?;

    let billable = delivery.uninvoiced_lines();
    if billable.is_empty() {
        return Err(DispatchError::InvariantViolation("delivery order is fully invoiced".to_string()).into());
    }
    let invoice_lines = billable
        .iter()
        .filter_map(|q| {
            delivery.lines().iter().find(|l| l.data.line_no == q.line_no).map(|l| NewInvoiceLine {
                delivery_line_no: q.line_no,
                item_id: l.data.item_id,
                quantity: q.quantity,
                unit_price: l.data.unit_price,
            })
        })
        .collect();

    dispatch_document::<DeliveryOrder, _, _>(
        dispatcher,
        tenant_id,
        req.delivery_order_id.0,
        DeliveryOrderCommand::RecordInvoiced(RecordInvoiced {
            tenant_id,
            delivery_id: req.delivery_order_id,
            sales_invoice_id: req.invoice_id.0,
            lines: billable,
            occurred_at: req.occurred_at,
        }),
    )?;

    let create = SalesInvoiceCommand::CreateSalesInvoice(CreateSalesInvoice {
        tenant_id,
        invoice_id: req.invoice_id,
        number: req.number.clone(),
        customer_id,
        delivery_order_id: req.delivery_order_id,
        invoice_date: req.invoice_date,
        payment_terms_days: customer.payment_terms_days(),
        tax_rate_bps: req.tax_rate_bps,
        lines: invoice_lines,
        notes: req.notes.clone(),
        occurred_at: req.occurred_at,
    });
    with_compensation(
        "create sales invoice",
        || dispatch_document::<SalesInvoice, _, _>(dispatcher, tenant_id, req.invoice_id.0, create),
        || release_invoiced(dispatcher, tenant_id, req.delivery_order_id, req.invoice_id.0, req.occurred_at),
    )?;

    info!(tenant_id = %tenant_id, delivery = %req.delivery_order_id, invoice = %req.invoice_id, "sales invoice created");
    Ok(load_document(dispatcher, tenant_id, req.invoice_id.0)?)
}

/// Cancel a sales invoice and make its quantities billable again.
pub fn cancel_invoice<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    invoice_id: SalesInvoiceId,
    actor: &Actor,
    reason: &str,
    occurred_at: DateTime<Utc>,
) -> Result<SalesInvoice, FlowError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let invoice: SalesInvoice = load_document(dispatcher, tenant_id, invoice_id.0)?;
    cancel_if_needed(dispatcher, tenant_id, &invoice, invoice_id.0, actor, reason, occurred_at)?;

    if let Some(delivery_id) = invoice.delivery_order_id() {
        release_invoiced(dispatcher, tenant_id, delivery_id, invoice_id.0, occurred_at)?;
    }
    Ok(load_document(dispatcher, tenant_id, invoice_id.0)?)
}

fn release_delivery<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    order_id: CustomerOrderId,
    delivery_order_id: AggregateId,
    occurred_at: DateTime<Utc>,
) -> Result<Vec<StoredEvent>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    dispatch_document::<CustomerOrder, _, _>(
        dispatcher,
        tenant_id,
        order_id.0,
        CustomerOrderCommand::ReleaseDelivery(ReleaseDelivery {
            tenant_id,
            order_id,
            delivery_order_id,
            occurred_at,
        }),
    )
}

fn release_invoiced<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    delivery_id: DeliveryOrderId,
    sales_invoice_id: AggregateId,
    occurred_at: DateTime<Utc>,
) -> Result<Vec<StoredEvent>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    dispatch_document::<DeliveryOrder, _, _>(
        dispatcher,
        tenant_id,
        delivery_id.0,
        DeliveryOrderCommand::ReleaseInvoiced(ReleaseInvoiced {
            tenant_id,
            delivery_id,
            sales_invoice_id,
            occurred_at,
        }),
    )
}
