//! Endpoints every workflow document shares: list, get and the six workflow
//! verbs. Each document kind plugs in through [`DocumentResource`].

use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Json, Path, Query},
    routing::{get, post},
};
use chrono::Utc;
use serde_json::Value as JsonValue;

use tradeflow_auth::Permission;
use tradeflow_auth::permissions::{
    PURCHASE_ORDER_READ, PURCHASE_ORDER_WRITE, PURCHASE_REQUEST_READ, PURCHASE_REQUEST_WRITE, SALES_DELIVERY_READ,
    SALES_DELIVERY_WRITE, SALES_INVOICE_READ, SALES_INVOICE_WRITE, SALES_ORDER_READ, SALES_ORDER_WRITE,
    WORKFLOW_APPROVE,
};
use tradeflow_core::{AggregateId, DomainError, TenantId};
use tradeflow_infra::ReadModels;
use tradeflow_infra::flows::{
    self, WorkflowRequest, cancel_delivery, cancel_invoice, cancel_purchase_order, run_workflow_action,
};
use tradeflow_infra::projections::{AggregateMirror, Mirrored};
use tradeflow_invoicing::{SalesInvoice, SalesInvoiceId};
use tradeflow_purchasing::{PurchaseOrder, PurchaseOrderId, PurchaseRequest};
use tradeflow_reporting::{Directory, PrintableDocument};
use tradeflow_sales::{CustomerOrder, DeliveryOrder, DeliveryOrderId};
use tradeflow_workflow::{Actor, WorkflowDocument};

use crate::app::dto::{self, ApproveBody, ListQuery, ReasonBody};
use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{items, ok, parse_id, parse_status};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

/// A workflow document exposed over HTTP.
pub trait DocumentResource: WorkflowDocument + Mirrored {
    const READ: Permission;
    const WRITE: Permission;

    fn mirror(read_models: &ReadModels) -> &AggregateMirror<Self>;

    fn to_json(&self) -> Result<JsonValue, DomainError>;

    fn printable(&self, dir: &Directory<'_>) -> Result<PrintableDocument, DomainError>;

    /// Documents that hold quantities on another document release them here.
    fn cancel(
        services: &AppServices,
        tenant_id: TenantId,
        id: AggregateId,
        actor: Actor,
        reason: String,
    ) -> ApiResult<Self> {
        let request = WorkflowRequest::Cancel { reason };
        Ok(run_workflow_action::<Self, _, _>(services.dispatcher(), tenant_id, id, actor, request, Utc::now())?)
    }
}

impl DocumentResource for PurchaseRequest {
    const READ: Permission = PURCHASE_REQUEST_READ;
    const WRITE: Permission = PURCHASE_REQUEST_WRITE;

    fn mirror(read_models: &ReadModels) -> &AggregateMirror<Self> {
        &read_models.purchase_requests
    }

    fn to_json(&self) -> Result<JsonValue, DomainError> {
        dto::purchase_request_to_json(self)
    }

    fn printable(&self, dir: &Directory<'_>) -> Result<PrintableDocument, DomainError> {
        Ok(PrintableDocument::purchase_request(self, dir))
    }
}

impl DocumentResource for PurchaseOrder {
    const READ: Permission = PURCHASE_ORDER_READ;
    const WRITE: Permission = PURCHASE_ORDER_WRITE;

    fn mirror(read_models: &ReadModels) -> &AggregateMirror<Self> {
        &read_models.purchase_orders
    }

    fn to_json(&self) -> Result<JsonValue, DomainError> {
        dto::purchase_order_to_json(self)
    }

    fn printable(&self, dir: &Directory<'_>) -> Result<PrintableDocument, DomainError> {
        PrintableDocument::purchase_order(self, dir)
    }

    fn cancel(services: &AppServices, tenant_id: TenantId, id: AggregateId, actor: Actor, reason: String) -> ApiResult<Self> {
        let order_id = PurchaseOrderId::new(id);
        Ok(cancel_purchase_order(services.dispatcher(), tenant_id, order_id, &actor, &reason, Utc::now())?)
    }
}

impl DocumentResource for CustomerOrder {
    const READ: Permission = SALES_ORDER_READ;
    const WRITE: Permission = SALES_ORDER_WRITE;

    fn mirror(read_models: &ReadModels) -> &AggregateMirror<Self> {
        &read_models.customer_orders
    }

    fn to_json(&self) -> Result<JsonValue, DomainError> {
        dto::customer_order_to_json(self)
    }

    fn printable(&self, dir: &Directory<'_>) -> Result<PrintableDocument, DomainError> {
        PrintableDocument::customer_order(self, dir)
    }
}

impl DocumentResource for DeliveryOrder {
    const READ: Permission = SALES_DELIVERY_READ;
    const WRITE: Permission = SALES_DELIVERY_WRITE;

    fn mirror(read_models: &ReadModels) -> &AggregateMirror<Self> {
        &read_models.delivery_orders
    }

    fn to_json(&self) -> Result<JsonValue, DomainError> {
        dto::delivery_order_to_json(self)
    }

    fn printable(&self, dir: &Directory<'_>) -> Result<PrintableDocument, DomainError> {
        Ok(PrintableDocument::delivery_order(self, dir))
    }

    fn cancel(services: &AppServices, tenant_id: TenantId, id: AggregateId, actor: Actor, reason: String) -> ApiResult<Self> {
        let delivery_id = DeliveryOrderId::new(id);
        Ok(cancel_delivery(services.dispatcher(), tenant_id, delivery_id, &actor, &reason, Utc::now())?)
    }
}

impl DocumentResource for SalesInvoice {
    const READ: Permission = SALES_INVOICE_READ;
    const WRITE: Permission = SALES_INVOICE_WRITE;

    fn mirror(read_models: &ReadModels) -> &AggregateMirror<Self> {
        &read_models.sales_invoices
    }

    fn to_json(&self) -> Result<JsonValue, DomainError> {
        dto::sales_invoice_to_json(self)
    }

    fn printable(&self, dir: &Directory<'_>) -> Result<PrintableDocument, DomainError> {
        Ok(PrintableDocument::sales_invoice(self, dir))
    }

    fn cancel(services: &AppServices, tenant_id: TenantId, id: AggregateId, actor: Actor, reason: String) -> ApiResult<Self> {
        let invoice_id = SalesInvoiceId::new(id);
        Ok(cancel_invoice(services.dispatcher(), tenant_id, invoice_id, &actor, &reason, Utc::now())?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// List, get and workflow routes of one document kind. Kind routers add
/// creation and line editing on top.
pub fn routes<D: DocumentResource>() -> Router {
    Router::new()
        .route("/", get(list::<D>))
        .route("/:id", get(get_one::<D>))
        .route("/:id/submit", post(submit::<D>))
        .route("/:id/approve", post(approve::<D>))
        .route("/:id/reject", post(reject::<D>))
        .route("/:id/recall", post(recall::<D>))
        .route("/:id/close", post(close::<D>))
        .route("/:id/cancel", post(cancel::<D>))
}

/// Serialize a freshly loaded document.
pub fn document_json<D: DocumentResource>(doc: &D) -> ApiResult<JsonValue> {
    Ok(doc.to_json()?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn list<D: DocumentResource>(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    require(&tenant, &principal, &D::READ)?;
    let status = parse_status(query.status.as_deref())?;

    let mut docs: Vec<D> = D::mirror(services.read_models())
        .list(tenant.tenant_id())
        .into_iter()
        .filter(|d| status.is_none_or(|s| d.approval().status() == s))
        .collect();
    docs.sort_by(|a, b| a.number().cmp(b.number()));

    let body = docs.iter().map(document_json).collect::<ApiResult<Vec<_>>>()?;
    Ok(items(body))
}

async fn get_one<D: DocumentResource>(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, &D::READ)?;
    let doc = D::mirror(services.read_models())
        .get(tenant.tenant_id(), parse_id(&id)?)
        .ok_or_else(|| ApiError::not_found(D::KIND.title()))?;
    Ok(ok(document_json(&doc)?))
}

async fn submit<D: DocumentResource>(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, &D::WRITE)?;
    workflow_action::<D>(&services, &tenant, &principal, &id, WorkflowRequest::Submit)
}

async fn approve<D: DocumentResource>(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<ApproveBody>>,
) -> ApiResult {
    require(&tenant, &principal, &WORKFLOW_APPROVE)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    workflow_action::<D>(&services, &tenant, &principal, &id, WorkflowRequest::Approve { comment: body.comment })
}

async fn reject<D: DocumentResource>(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<ReasonBody>>,
) -> ApiResult {
    require(&tenant, &principal, &WORKFLOW_APPROVE)?;
    let reason = body.and_then(|Json(b)| b.reason).unwrap_or_default();
    workflow_action::<D>(&services, &tenant, &principal, &id, WorkflowRequest::Reject { reason })
}

async fn recall<D: DocumentResource>(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, &D::WRITE)?;
    workflow_action::<D>(&services, &tenant, &principal, &id, WorkflowRequest::Recall)
}

async fn close<D: DocumentResource>(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, &D::WRITE)?;
    workflow_action::<D>(&services, &tenant, &principal, &id, WorkflowRequest::Close)
}

async fn cancel<D: DocumentResource>(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<ReasonBody>>,
) -> ApiResult {
    require(&tenant, &principal, &D::WRITE)?;
    let reason = body.and_then(|Json(b)| b.reason).unwrap_or_default();
    let id = parse_id(&id)?;

    let doc = D::cancel(&services, tenant.tenant_id(), id, principal.actor(), reason)?;
    tracing::info!(tenant_id = %tenant.tenant_id(), kind = D::KIND.as_str(), document = %id, "document cancelled");
    Ok(ok(document_json(&doc)?))
}

fn workflow_action<D: DocumentResource>(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    raw_id: &str,
    request: WorkflowRequest,
) -> ApiResult {
    let id = parse_id(raw_id)?;
    let doc: D = run_workflow_action(
        services.dispatcher(),
        tenant.tenant_id(),
        id,
        principal.actor(),
        request,
        Utc::now(),
    )?;
    tracing::info!(
        tenant_id = %tenant.tenant_id(),
        kind = D::KIND.as_str(),
        document = %id,
        status = %doc.approval().status(),
        "workflow action applied"
    );
    Ok(ok(document_json(&doc)?))
}

/// Load a document that must exist, straight from its stream.
pub fn load<D: DocumentResource>(services: &AppServices, tenant_id: TenantId, id: AggregateId) -> ApiResult<D> {
    Ok(flows::load_document::<D, _, _>(services.dispatcher(), tenant_id, id)?)
}
