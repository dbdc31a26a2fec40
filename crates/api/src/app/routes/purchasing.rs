use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Json, Path},
    routing::{patch, post},
};
use chrono::Utc;

use tradeflow_auth::permissions::{PURCHASE_ORDER_WRITE, PURCHASE_RECEIVE, PURCHASE_REQUEST_WRITE};
use tradeflow_core::AggregateId;
use tradeflow_infra::flows::{ConvertLine, ConvertRequest, convert_request, dispatch_document};
use tradeflow_parties::PartyKind;
use tradeflow_purchasing::{
    AddRequestLine, CreatePurchaseOrder, CreatePurchaseRequest, NewOrderLine, NewRequestLine, PurchaseOrder,
    PurchaseOrderCommand, PurchaseOrderId, PurchaseRequest, PurchaseRequestCommand, PurchaseRequestId,
    ReceiveGoods, RemoveRequestLine, UpdateRequestLine,
};
use tradeflow_workflow::{DocumentKind, WorkflowDocument};

use crate::app::dto::{
    ConvertRequestBody, CreatePurchaseOrderBody, CreatePurchaseRequestBody, PricedLineBody, ReceiptBody,
    RequestLineBody, UpdatePricedLineBody, UpdateRequestLineBody,
};
use crate::app::errors::ApiResult;
use crate::app::routes::common::{authorized, created, ensure_items, ensure_party, ensure_warehouse, ok, parse_id, today};
use crate::app::routes::documents::{self, document_json};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn requests_router() -> Router {
    documents::routes::<PurchaseRequest>()
        .route("/", post(create_request))
        .route("/:id/lines", post(add_request_line))
        .route("/:id/lines/:line_no", patch(update_request_line).delete(remove_request_line))
        .route("/:id/convert", post(convert))
}

pub fn orders_router() -> Router {
    documents::routes::<PurchaseOrder>()
        .route("/", post(create_order))
        .route("/:id/lines", post(add_order_line))
        .route("/:id/lines/:line_no", patch(update_order_line).delete(remove_order_line))
        .route("/:id/receipts", post(receive_goods))
}

fn new_request_line(line: RequestLineBody) -> NewRequestLine {
    NewRequestLine {
        item_id: line.item_id,
        quantity: line.quantity,
        required_by: line.required_by,
        warehouse_id: line.warehouse_id,
        remarks: line.remarks,
    }
}

fn check_request_line(services: &AppServices, tenant: &TenantContext, line: &RequestLineBody) -> ApiResult<()> {
    ensure_items(services, tenant.tenant_id(), [line.item_id])?;
    ensure_warehouse(services, tenant.tenant_id(), line.warehouse_id)?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Purchase requests
// ─────────────────────────────────────────────────────────────────────────────

async fn create_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CreatePurchaseRequestBody>,
) -> ApiResult {
    require(&tenant, &principal, &PURCHASE_REQUEST_WRITE)?;
    for line in &body.lines {
        check_request_line(&services, &tenant, line)?;
    }

    let agg = AggregateId::new();
    let cmd = PurchaseRequestCommand::CreatePurchaseRequest(CreatePurchaseRequest {
        tenant_id: tenant.tenant_id(),
        request_id: PurchaseRequestId::new(agg),
        number: services.next_number(tenant.tenant_id(), DocumentKind::PurchaseRequest),
        requested_by: principal.user_id(),
        department: body.department,
        remarks: body.remarks,
        lines: body.lines.into_iter().map(new_request_line).collect(),
        occurred_at: Utc::now(),
    });
    let cmd = authorized(&tenant, &principal, cmd, PURCHASE_REQUEST_WRITE)?;
    dispatch_document::<PurchaseRequest, _, _>(services.dispatcher(), tenant.tenant_id(), agg, cmd)?;

    let request: PurchaseRequest = documents::load(&services, tenant.tenant_id(), agg)?;
    tracing::info!(tenant_id = %tenant.tenant_id(), number = request.number(), "purchase request created");
    Ok(created(document_json(&request)?))
}

async fn add_request_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(line): Json<RequestLineBody>,
) -> ApiResult {
    require(&tenant, &principal, &PURCHASE_REQUEST_WRITE)?;
    let agg = parse_id(&id)?;
    let _: PurchaseRequest = documents::load(&services, tenant.tenant_id(), agg)?;
    check_request_line(&services, &tenant, &line)?;

    let cmd = PurchaseRequestCommand::AddLine(AddRequestLine {
        tenant_id: tenant.tenant_id(),
        request_id: PurchaseRequestId::new(agg),
        line: new_request_line(line),
        occurred_at: Utc::now(),
    });
    dispatch_request(&services, &tenant, &principal, agg, cmd)
}

async fn update_request_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, line_no)): Path<(String, u32)>,
    Json(body): Json<UpdateRequestLineBody>,
) -> ApiResult {
    require(&tenant, &principal, &PURCHASE_REQUEST_WRITE)?;
    let agg = parse_id(&id)?;
    let _: PurchaseRequest = documents::load(&services, tenant.tenant_id(), agg)?;
    if let Some(warehouse_id) = body.warehouse_id {
        ensure_warehouse(&services, tenant.tenant_id(), warehouse_id)?;
    }

    let cmd = PurchaseRequestCommand::UpdateLine(UpdateRequestLine {
        tenant_id: tenant.tenant_id(),
        request_id: PurchaseRequestId::new(agg),
        line_no,
        quantity: body.quantity,
        required_by: body.required_by,
        warehouse_id: body.warehouse_id,
        remarks: body.remarks,
        occurred_at: Utc::now(),
    });
    dispatch_request(&services, &tenant, &principal, agg, cmd)
}

async fn remove_request_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, line_no)): Path<(String, u32)>,
) -> ApiResult {
    require(&tenant, &principal, &PURCHASE_REQUEST_WRITE)?;
    let agg = parse_id(&id)?;
    let _: PurchaseRequest = documents::load(&services, tenant.tenant_id(), agg)?;

    let cmd = PurchaseRequestCommand::RemoveLine(RemoveRequestLine {
        tenant_id: tenant.tenant_id(),
        request_id: PurchaseRequestId::new(agg),
        line_no,
        occurred_at: Utc::now(),
    });
    dispatch_request(&services, &tenant, &principal, agg, cmd)
}

/// Raise a purchase order from an approved request.
async fn convert(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ConvertRequestBody>,
) -> ApiResult {
    require(&tenant, &principal, &PURCHASE_ORDER_WRITE)?;
    let request_id = PurchaseRequestId::new(parse_id(&id)?);
    ensure_party(&services, tenant.tenant_id(), body.supplier_id, PartyKind::Supplier)?;
    if let Some(warehouse_id) = body.warehouse_id {
        ensure_warehouse(&services, tenant.tenant_id(), warehouse_id)?;
    }

    let order = convert_request(
        services.dispatcher(),
        ConvertRequest {
            tenant_id: tenant.tenant_id(),
            request_id,
            order_id: PurchaseOrderId::new(AggregateId::new()),
            number: services.next_number(tenant.tenant_id(), DocumentKind::PurchaseOrder),
            supplier_id: body.supplier_id,
            warehouse_id: body.warehouse_id,
            order_date: body.order_date.unwrap_or_else(today),
            expected_date: body.expected_date,
            lines: body
                .lines
                .into_iter()
                .map(|l| ConvertLine {
                    line_no: l.line_no,
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                })
                .collect(),
            occurred_at: Utc::now(),
        },
    )?;
    Ok(created(document_json(&order)?))
}

fn dispatch_request(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    agg: AggregateId,
    cmd: PurchaseRequestCommand,
) -> ApiResult {
    let cmd = authorized(tenant, principal, cmd, PURCHASE_REQUEST_WRITE)?;
    dispatch_document::<PurchaseRequest, _, _>(services.dispatcher(), tenant.tenant_id(), agg, cmd)?;
    let request: PurchaseRequest = documents::load(services, tenant.tenant_id(), agg)?;
    Ok(ok(document_json(&request)?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Purchase orders
// ─────────────────────────────────────────────────────────────────────────────

async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CreatePurchaseOrderBody>,
) -> ApiResult {
    require(&tenant, &principal, &PURCHASE_ORDER_WRITE)?;
    ensure_party(&services, tenant.tenant_id(), body.supplier_id, PartyKind::Supplier)?;
    ensure_warehouse(&services, tenant.tenant_id(), body.warehouse_id)?;
    ensure_items(&services, tenant.tenant_id(), body.lines.iter().map(|l| l.item_id))?;

    let agg = AggregateId::new();
    let cmd = PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
        tenant_id: tenant.tenant_id(),
        order_id: PurchaseOrderId::new(agg),
        number: services.next_number(tenant.tenant_id(), DocumentKind::PurchaseOrder),
        supplier_id: body.supplier_id,
        warehouse_id: body.warehouse_id,
        order_date: body.order_date.unwrap_or_else(today),
        expected_date: body.expected_date,
        source_request: None,
        lines: body
            .lines
            .into_iter()
            .map(|l| NewOrderLine {
                item_id: l.item_id,
                quantity: l.quantity,
                unit_price: l.unit_price,
                source: None,
            })
            .collect(),
        occurred_at: Utc::now(),
    });
    let cmd = authorized(&tenant, &principal, cmd, PURCHASE_ORDER_WRITE)?;
    dispatch_document::<PurchaseOrder, _, _>(services.dispatcher(), tenant.tenant_id(), agg, cmd)?;

    let order: PurchaseOrder = documents::load(&services, tenant.tenant_id(), agg)?;
    Ok(created(document_json(&order)?))
}

async fn add_order_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(line): Json<PricedLineBody>,
) -> ApiResult {
    require(&tenant, &principal, &PURCHASE_ORDER_WRITE)?;
    let agg = parse_id(&id)?;
    let _: PurchaseOrder = documents::load(&services, tenant.tenant_id(), agg)?;
    ensure_items(&services, tenant.tenant_id(), [line.item_id])?;

    let cmd = PurchaseOrderCommand::AddLine(tradeflow_purchasing::AddLine {
        tenant_id: tenant.tenant_id(),
        order_id: PurchaseOrderId::new(agg),
        item_id: line.item_id,
        quantity: line.quantity,
        unit_price: line.unit_price,
        occurred_at: Utc::now(),
    });
    dispatch_order(&services, &tenant, &principal, agg, cmd, PURCHASE_ORDER_WRITE)
}

async fn update_order_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, line_no)): Path<(String, u32)>,
    Json(body): Json<UpdatePricedLineBody>,
) -> ApiResult {
    require(&tenant, &principal, &PURCHASE_ORDER_WRITE)?;
    let agg = parse_id(&id)?;
    let _: PurchaseOrder = documents::load(&services, tenant.tenant_id(), agg)?;

    let cmd = PurchaseOrderCommand::UpdateLine(tradeflow_purchasing::UpdateLine {
        tenant_id: tenant.tenant_id(),
        order_id: PurchaseOrderId::new(agg),
        line_no,
        quantity: body.quantity,
        unit_price: body.unit_price,
        occurred_at: Utc::now(),
    });
    dispatch_order(&services, &tenant, &principal, agg, cmd, PURCHASE_ORDER_WRITE)
}

async fn remove_order_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, line_no)): Path<(String, u32)>,
) -> ApiResult {
    require(&tenant, &principal, &PURCHASE_ORDER_WRITE)?;
    let agg = parse_id(&id)?;
    let _: PurchaseOrder = documents::load(&services, tenant.tenant_id(), agg)?;

    let cmd = PurchaseOrderCommand::RemoveLine(tradeflow_purchasing::RemoveLine {
        tenant_id: tenant.tenant_id(),
        order_id: PurchaseOrderId::new(agg),
        line_no,
        occurred_at: Utc::now(),
    });
    dispatch_order(&services, &tenant, &principal, agg, cmd, PURCHASE_ORDER_WRITE)
}

/// Record a (possibly partial) goods receipt against an approved order.
async fn receive_goods(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ReceiptBody>,
) -> ApiResult {
    require(&tenant, &principal, &PURCHASE_RECEIVE)?;
    let agg = parse_id(&id)?;
    let _: PurchaseOrder = documents::load(&services, tenant.tenant_id(), agg)?;
    if let Some(warehouse_id) = body.warehouse_id {
        ensure_warehouse(&services, tenant.tenant_id(), warehouse_id)?;
    }

    let receipt_id = AggregateId::new();
    let cmd = PurchaseOrderCommand::ReceiveGoods(ReceiveGoods {
        tenant_id: tenant.tenant_id(),
        order_id: PurchaseOrderId::new(agg),
        receipt_id,
        warehouse_id: body.warehouse_id,
        received_on: body.received_on.unwrap_or_else(today),
        received_by: principal.user_id(),
        lines: body.lines,
        occurred_at: Utc::now(),
    });
    let response = dispatch_order(&services, &tenant, &principal, agg, cmd, PURCHASE_RECEIVE)?;
    tracing::info!(tenant_id = %tenant.tenant_id(), order = %agg, receipt = %receipt_id, "goods received");
    Ok(response)
}

fn dispatch_order(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    agg: AggregateId,
    cmd: PurchaseOrderCommand,
    permission: tradeflow_auth::Permission,
) -> ApiResult {
    let cmd = authorized(tenant, principal, cmd, permission)?;
    dispatch_document::<PurchaseOrder, _, _>(services.dispatcher(), tenant.tenant_id(), agg, cmd)?;
    let order: PurchaseOrder = documents::load(services, tenant.tenant_id(), agg)?;
    Ok(ok(document_json(&order)?))
}
