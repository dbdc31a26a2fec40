//! Printable documents and registers.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path, Query},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;

use tradeflow_auth::permissions::REPORTS_READ;
use tradeflow_invoicing::SalesInvoice;
use tradeflow_purchasing::{PurchaseOrder, PurchaseRequest};
use tradeflow_reporting::{Directory, ReportFormat, ReportKind, TabularReport, pdf};
use tradeflow_sales::{CustomerOrder, DeliveryOrder};
use tradeflow_workflow::DocumentKind;

use crate::app::dto::ReportQuery;
use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{items, parse_id, today};
use crate::app::routes::documents::{self, DocumentResource};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_reports))
        .route("/registers/:report", get(register))
        .route("/documents/:kind/:id", get(document_pdf))
}

fn attachment(content_type: &'static str, file_name: String, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{file_name}\"")),
        ],
        bytes,
    )
        .into_response()
}

async fn list_reports(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&tenant, &principal, &REPORTS_READ)?;
    let body = ReportKind::ALL
        .into_iter()
        .map(|kind| {
            json!({
                "slug": kind.slug(),
                "title": kind.title(),
                "formats": ["pdf", "xlsx"],
            })
        })
        .collect();
    Ok(items(body))
}

/// GET /reports/registers/:report?format=pdf|xlsx&as_of=YYYY-MM-DD
async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(report): Path<String>,
    Query(query): Query<ReportQuery>,
) -> ApiResult {
    require(&tenant, &principal, &REPORTS_READ)?;
    let kind: ReportKind = report.parse()?;
    let format: ReportFormat = match query.format.as_deref() {
        Some(raw) => raw.parse().map_err(|_| ApiError::validation(format!("unsupported format: {raw}")))?,
        None => ReportFormat::Pdf,
    };

    let dir = Directory::new(services.read_models(), tenant.tenant_id());
    let report = TabularReport::build(kind, &dir, query.as_of.unwrap_or_else(today))?;
    let bytes = tradeflow_reporting::render(&report, format)?;

    tracing::info!(tenant_id = %tenant.tenant_id(), report = kind.slug(), rows = report.rows.len(), "register rendered");
    Ok(attachment(format.content_type(), report.file_name(format), bytes))
}

/// GET /reports/documents/:kind/:id
async fn document_pdf(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult {
    let kind: DocumentKind = kind.parse().map_err(|_| ApiError::not_found("document kind"))?;
    match kind {
        DocumentKind::PurchaseRequest => render::<PurchaseRequest>(&services, &tenant, &principal, &id),
        DocumentKind::PurchaseOrder => render::<PurchaseOrder>(&services, &tenant, &principal, &id),
        DocumentKind::CustomerOrder => render::<CustomerOrder>(&services, &tenant, &principal, &id),
        DocumentKind::DeliveryOrder => render::<DeliveryOrder>(&services, &tenant, &principal, &id),
        DocumentKind::SalesInvoice => render::<SalesInvoice>(&services, &tenant, &principal, &id),
    }
}

fn render<D: DocumentResource>(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    raw_id: &str,
) -> ApiResult {
    require(tenant, principal, &D::READ)?;
    let doc: D = documents::load(services, tenant.tenant_id(), parse_id(raw_id)?)?;

    let dir = Directory::new(services.read_models(), tenant.tenant_id());
    let printable = doc.printable(&dir)?;
    let bytes = pdf::render_document(&printable)?;
    Ok(attachment("application/pdf", printable.file_name(), bytes))
}
