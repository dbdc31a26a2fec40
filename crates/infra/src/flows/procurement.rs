//! Purchase request → purchase order.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

use tradeflow_catalog::WarehouseId;
use tradeflow_core::{AggregateId, DomainError, Money, TenantId};
use tradeflow_events::{EventBus, EventEnvelope};
use tradeflow_parties::{PartyId, PartyKind};
use tradeflow_purchasing::{
    CreatePurchaseOrder, NewOrderLine, PurchaseOrder, PurchaseOrderCommand, PurchaseOrderId,
    PurchaseRequest, PurchaseRequestCommand, PurchaseRequestId, RecordOrdered, ReleaseOrdered,
    RequestLineRef,
};
use tradeflow_workflow::{Actor, LineQuantity, WorkflowDocument};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;

use super::{
    FlowError, cancel_if_needed, dispatch_document, ensure_item, ensure_party, ensure_warehouse,
    load_document, with_compensation,
};

/// One request line to carry over. Missing quantity means "all outstanding",
/// missing price means the item's standard price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertLine {
    pub line_no: u32,
    pub quantity: Option<i64>,
    pub unit_price: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertRequest {
    pub tenant_id: TenantId,
    pub request_id: PurchaseRequestId,
    pub order_id: PurchaseOrderId,
    pub number: String,
    pub supplier_id: PartyId,
    /// Defaults to the warehouse of the first converted line.
    pub warehouse_id: Option<WarehouseId>,
    pub order_date: NaiveDate,
    pub expected_date: Option<NaiveDate>,
    /// Empty means every line with outstanding quantity.
    pub lines: Vec<ConvertLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Convert an approved purchase request (fully or partly) into a draft PO.
pub fn convert_request<S, B>(dispatcher: &CommandDispatcher<S, B>, req: ConvertRequest) -> Result<PurchaseOrder, FlowError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let tenant_id = req.tenant_id;
    let request: PurchaseRequest = load_document(dispatcher, tenant_id, req.request_id.0)?;
    request.approval().ensure_fulfillable().map_err(DispatchError::from)?;
    ensure_party(dispatcher, tenant_id, req.supplier_id, PartyKind::Supplier)?;

    let wanted: Vec<ConvertLine> = if req.lines.is_empty() {
        request
            .lines()
            .iter()
            .filter(|l| l.outstanding() > 0)
            .map(|l| ConvertLine { line_no: l.data.line_no, quantity: None, unit_price: None })
            .collect()
    } else {
        req.lines.clone()
    };
    if wanted.is_empty() {
        return Err(DispatchError::from(DomainError::invariant("purchase request has nothing left to order")).into());
    }

    let mut allocations = Vec::with_capacity(wanted.len());
    let mut order_lines = Vec::with_capacity(wanted.len());
    let mut first_warehouse = None;
    for w in &wanted {
        let line = request
            .line(w.line_no)
            .ok_or_else(|| DispatchError::Validation(format!("request line {} does not exist", w.line_no)))?;
        let quantity = w.quantity.unwrap_or_else(|| line.outstanding());
        let item = ensure_item(dispatcher, tenant_id, line.data.item_id)?;
        first_warehouse.get_or_insert(line.data.warehouse_id);

        allocations.push(LineQuantity { line_no: w.line_no, quantity });
        order_lines.push(NewOrderLine {
            item_id: line.data.item_id,
            quantity,
            unit_price: w.unit_price.unwrap_or_else(|| item.standard_price()),
            source: Some(RequestLineRef { request_id: req.request_id, line_no: w.line_no }),
        });
    }

    let warehouse_id = req
        .warehouse_id
        .or(first_warehouse)
        .ok_or_else(|| DispatchError::Validation("warehouse is required".to_string()))?;
    ensure_warehouse(dispatcher, tenant_id, warehouse_id)?;

    dispatch_document::<PurchaseRequest, _, _>(
        dispatcher,
        tenant_id,
        req.request_id.0,
        PurchaseRequestCommand::RecordOrdered(RecordOrdered {
            tenant_id,
            request_id: req.request_id,
            purchase_order_id: req.order_id.0,
            lines: allocations,
            occurred_at: req.occurred_at,
        }),
    )?;

    let create = PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
        tenant_id,
        order_id: req.order_id,
        number: req.number.clone(),
        supplier_id: req.supplier_id,
        warehouse_id,
        order_date: req.order_date,
        expected_date: req.expected_date,
        source_request: Some(req.request_id),
        lines: order_lines,
        occurred_at: req.occurred_at,
    });
    with_compensation(
        "create purchase order",
        || dispatch_document::<PurchaseOrder, _, _>(dispatcher, tenant_id, req.order_id.0, create),
        || release_ordered(dispatcher, tenant_id, req.request_id, req.order_id.0, req.occurred_at),
    )?;

    info!(tenant_id = %tenant_id, request = %req.request_id, order = %req.order_id, "purchase request converted");
    Ok(load_document(dispatcher, tenant_id, req.order_id.0)?)
}

/// Cancel a purchase order and give its quantities back to the source request.
pub fn cancel_purchase_order<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    order_id: PurchaseOrderId,
    actor: &Actor,
    reason: &str,
    occurred_at: DateTime<Utc>,
) -> Result<PurchaseOrder, FlowError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let order: PurchaseOrder = load_document(dispatcher, tenant_id, order_id.0)?;
    cancel_if_needed(dispatcher, tenant_id, &order, order_id.0, actor, reason, occurred_at)?;

    if let Some(request_id) = order.source_request() {
        release_ordered(dispatcher, tenant_id, request_id, order_id.0, occurred_at)?;
    }
    Ok(load_document(dispatcher, tenant_id, order_id.0)?)
}

fn release_ordered<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    request_id: PurchaseRequestId,
    purchase_order_id: AggregateId,
    occurred_at: DateTime<Utc>,
) -> Result<Vec<crate::event_store::StoredEvent>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    dispatch_document::<PurchaseRequest, _, _>(
        dispatcher,
        tenant_id,
        request_id.0,
        PurchaseRequestCommand::ReleaseOrdered(ReleaseOrdered {
            tenant_id,
            request_id,
            purchase_order_id,
            occurred_at,
        }),
    )
}
