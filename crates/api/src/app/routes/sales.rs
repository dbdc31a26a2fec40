use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Json, Path},
    routing::{patch, post},
};
use chrono::Utc;

use tradeflow_auth::permissions::{SALES_DELIVERY_WRITE, SALES_ORDER_WRITE};
use tradeflow_core::AggregateId;
use tradeflow_infra::flows::{CreateDelivery, create_delivery, dispatch_document};
use tradeflow_parties::PartyKind;
use tradeflow_sales::{
    CreateCustomerOrder, CustomerOrder, CustomerOrderCommand, CustomerOrderId, DeliveryOrder, DeliveryOrderId,
    NewOrderLine,
};
use tradeflow_workflow::DocumentKind;

use crate::app::dto::{CreateCustomerOrderBody, DeliveryBody, PricedLineBody, UpdatePricedLineBody};
use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{authorized, created, ensure_items, ensure_party, ensure_warehouse, ok, parse_id, today};
use crate::app::routes::documents::{self, document_json};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn orders_router() -> Router {
    documents::routes::<CustomerOrder>()
        .route("/", post(create_order))
        .route("/:id/lines", post(add_line))
        .route("/:id/lines/:line_no", patch(update_line).delete(remove_line))
        .route("/:id/deliveries", post(create_order_delivery))
}

pub fn deliveries_router() -> Router {
    documents::routes::<DeliveryOrder>().route("/", post(create_delivery_order))
}

// ─────────────────────────────────────────────────────────────────────────────
// Customer orders
// ─────────────────────────────────────────────────────────────────────────────

async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CreateCustomerOrderBody>,
) -> ApiResult {
    require(&tenant, &principal, &SALES_ORDER_WRITE)?;
    ensure_party(&services, tenant.tenant_id(), body.customer_id, PartyKind::Customer)?;
    ensure_items(&services, tenant.tenant_id(), body.lines.iter().map(|l| l.item_id))?;

    let agg = AggregateId::new();
    let cmd = CustomerOrderCommand::CreateCustomerOrder(CreateCustomerOrder {
        tenant_id: tenant.tenant_id(),
        order_id: CustomerOrderId::new(agg),
        number: services.next_number(tenant.tenant_id(), DocumentKind::CustomerOrder),
        customer_id: body.customer_id,
        order_date: body.order_date.unwrap_or_else(today),
        requested_delivery_date: body.requested_delivery_date,
        customer_reference: body.customer_reference,
        lines: body.lines.into_iter().map(new_line).collect(),
        occurred_at: Utc::now(),
    });
    let cmd = authorized(&tenant, &principal, cmd, SALES_ORDER_WRITE)?;
    dispatch_document::<CustomerOrder, _, _>(services.dispatcher(), tenant.tenant_id(), agg, cmd)?;

    let order: CustomerOrder = documents::load(&services, tenant.tenant_id(), agg)?;
    tracing::info!(tenant_id = %tenant.tenant_id(), order = %agg, "customer order created");
    Ok(created(document_json(&order)?))
}

fn new_line(line: PricedLineBody) -> NewOrderLine {
    NewOrderLine {
        item_id: line.item_id,
        quantity: line.quantity,
        unit_price: line.unit_price,
    }
}

async fn add_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(line): Json<PricedLineBody>,
) -> ApiResult {
    require(&tenant, &principal, &SALES_ORDER_WRITE)?;
    let agg = parse_id(&id)?;
    let _: CustomerOrder = documents::load(&services, tenant.tenant_id(), agg)?;
    ensure_items(&services, tenant.tenant_id(), [line.item_id])?;

    let cmd = CustomerOrderCommand::AddLine(tradeflow_sales::AddLine {
        tenant_id: tenant.tenant_id(),
        order_id: CustomerOrderId::new(agg),
        line: new_line(line),
        occurred_at: Utc::now(),
    });
    dispatch_order(&services, &tenant, &principal, agg, cmd)
}

async fn update_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, line_no)): Path<(String, u32)>,
    Json(body): Json<UpdatePricedLineBody>,
) -> ApiResult {
    require(&tenant, &principal, &SALES_ORDER_WRITE)?;
    let agg = parse_id(&id)?;
    let _: CustomerOrder = documents::load(&services, tenant.tenant_id(), agg)?;

    let cmd = CustomerOrderCommand::UpdateLine(tradeflow_sales::UpdateLine {
        tenant_id: tenant.tenant_id(),
        order_id: CustomerOrderId::new(agg),
        line_no,
        quantity: body.quantity,
        unit_price: body.unit_price,
        occurred_at: Utc::now(),
    });
    dispatch_order(&services, &tenant, &principal, agg, cmd)
}

async fn remove_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, line_no)): Path<(String, u32)>,
) -> ApiResult {
    require(&tenant, &principal, &SALES_ORDER_WRITE)?;
    let agg = parse_id(&id)?;
    let _: CustomerOrder = documents::load(&services, tenant.tenant_id(), agg)?;

    let cmd = CustomerOrderCommand::RemoveLine(tradeflow_sales::RemoveLine {
        tenant_id: tenant.tenant_id(),
        order_id: CustomerOrderId::new(agg),
        line_no,
        occurred_at: Utc::now(),
    });
    dispatch_order(&services, &tenant, &principal, agg, cmd)
}

fn dispatch_order(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    agg: AggregateId,
    cmd: CustomerOrderCommand,
) -> ApiResult {
    let cmd = authorized(tenant, principal, cmd, SALES_ORDER_WRITE)?;
    dispatch_document::<CustomerOrder, _, _>(services.dispatcher(), tenant.tenant_id(), agg, cmd)?;
    let order: CustomerOrder = documents::load(services, tenant.tenant_id(), agg)?;
    Ok(ok(document_json(&order)?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Delivery orders
// ─────────────────────────────────────────────────────────────────────────────

/// POST /customer-orders/:id/deliveries
async fn create_order_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<DeliveryBody>,
) -> ApiResult {
    let order_id = CustomerOrderId::new(parse_id(&id)?);
    deliver(&services, &tenant, &principal, order_id, body)
}

/// POST /delivery-orders with the customer order in the body.
async fn create_delivery_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<DeliveryBody>,
) -> ApiResult {
    let order_id = body
        .customer_order_id
        .ok_or_else(|| ApiError::validation("customer_order_id is required"))?;
    deliver(&services, &tenant, &principal, order_id, body)
}

fn deliver(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    customer_order_id: CustomerOrderId,
    body: DeliveryBody,
) -> ApiResult {
    require(tenant, principal, &SALES_DELIVERY_WRITE)?;
    ensure_warehouse(services, tenant.tenant_id(), body.warehouse_id)?;

    let delivery = create_delivery(
        services.dispatcher(),
        CreateDelivery {
            tenant_id: tenant.tenant_id(),
            customer_order_id,
            delivery_id: DeliveryOrderId::new(AggregateId::new()),
            number: services.next_number(tenant.tenant_id(), DocumentKind::DeliveryOrder),
            warehouse_id: body.warehouse_id,
            delivery_date: body.delivery_date.unwrap_or_else(today),
            shipping_address: body.shipping_address,
            lines: body.lines,
            occurred_at: Utc::now(),
        },
    )?;
    Ok(created(document_json(&delivery)?))
}
