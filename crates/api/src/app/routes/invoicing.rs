use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Json, Path},
    routing::post,
};
use chrono::Utc;

use tradeflow_auth::permissions::SALES_INVOICE_WRITE;
use tradeflow_core::AggregateId;
use tradeflow_infra::flows::{CreateInvoice, create_invoice};
use tradeflow_invoicing::{SalesInvoice, SalesInvoiceId};
use tradeflow_sales::DeliveryOrderId;
use tradeflow_workflow::DocumentKind;

use crate::app::dto::InvoiceBody;
use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{created, parse_id, today};
use crate::app::routes::documents::{self, document_json};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    documents::routes::<SalesInvoice>().route("/", post(create_sales_invoice))
}

/// Routes nested under `/delivery-orders`.
pub fn delivery_routes() -> Router {
    Router::new().route("/:id/invoice", post(invoice_delivery))
}

/// POST /delivery-orders/:id/invoice
async fn invoice_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<InvoiceBody>>,
) -> ApiResult {
    let delivery_id = DeliveryOrderId::new(parse_id(&id)?);
    let body = body.map(|Json(b)| b).unwrap_or_default();
    invoice(&services, &tenant, &principal, delivery_id, body)
}

/// POST /sales-invoices with the delivery order in the body.
async fn create_sales_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<InvoiceBody>,
) -> ApiResult {
    let delivery_id = body
        .delivery_order_id
        .ok_or_else(|| ApiError::validation("delivery_order_id is required"))?;
    invoice(&services, &tenant, &principal, delivery_id, body)
}

fn invoice(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    delivery_order_id: DeliveryOrderId,
    body: InvoiceBody,
) -> ApiResult {
    require(tenant, principal, &SALES_INVOICE_WRITE)?;
    let tax_rate_bps = body.tax_rate_bps.unwrap_or_else(|| services.default_tax_bps());

    let invoice = create_invoice(
        services.dispatcher(),
        CreateInvoice {
            tenant_id: tenant.tenant_id(),
            delivery_order_id,
            invoice_id: SalesInvoiceId::new(AggregateId::new()),
            number: services.next_number(tenant.tenant_id(), DocumentKind::SalesInvoice),
            invoice_date: body.invoice_date.unwrap_or_else(today),
            tax_rate_bps,
            notes: body.notes,
            occurred_at: Utc::now(),
        },
    )?;
    tracing::info!(tenant_id = %tenant.tenant_id(), delivery = %delivery_order_id, "delivery invoiced");
    Ok(created(document_json(&invoice)?))
}
