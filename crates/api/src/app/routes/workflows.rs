//! Approval route configuration, one definition per document kind.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Json, Path},
    routing::get,
};
use chrono::Utc;

use tradeflow_auth::permissions::WORKFLOW_CONFIGURE;
use tradeflow_workflow::{ApprovalRoute, DefineRoute, DocumentKind, WorkflowDefinition, WorkflowDefinitionCommand};

use crate::app::dto::{self, RouteBody};
use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{authorized, items, ok};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_definitions))
        .route("/:kind", get(get_definition).put(define_route))
}

/// Every document kind, including the ones without a configured route.
async fn list_definitions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult {
    let definitions = &services.read_models().workflow_definitions;
    let body = DocumentKind::ALL
        .into_iter()
        .map(|kind| {
            let definition = definitions.get(tenant.tenant_id(), kind.definition_id());
            dto::definition_to_json(kind, definition.as_ref())
        })
        .collect();
    Ok(items(body))
}

async fn get_definition(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(kind): Path<String>,
) -> ApiResult {
    let kind = parse_kind(&kind)?;
    let definition = services
        .read_models()
        .workflow_definitions
        .get(tenant.tenant_id(), kind.definition_id());
    Ok(ok(dto::definition_to_json(kind, definition.as_ref())))
}

/// PUT /workflows/:kind
///
/// Takes effect for documents submitted afterwards; pending ones keep the
/// route they were submitted with.
async fn define_route(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(kind): Path<String>,
    Json(body): Json<RouteBody>,
) -> ApiResult {
    let kind = parse_kind(&kind)?;
    let route = match (body.steps, body.roles) {
        (Some(steps), None) => ApprovalRoute::new(steps)?,
        (None, Some(roles)) => ApprovalRoute::of_roles(roles)?,
        (None, None) => ApprovalRoute::default(),
        (Some(_), Some(_)) => return Err(ApiError::validation("give either steps or roles, not both")),
    };

    let cmd = WorkflowDefinitionCommand::DefineRoute(DefineRoute {
        tenant_id: tenant.tenant_id(),
        kind,
        route,
        defined_by: principal.user_id(),
        occurred_at: Utc::now(),
    });
    let cmd = authorized(&tenant, &principal, cmd, WORKFLOW_CONFIGURE)?;
    let definition: WorkflowDefinition = services.dispatch_record(tenant.tenant_id(), kind.definition_id(), cmd)?;

    tracing::info!(
        tenant_id = %tenant.tenant_id(),
        kind = kind.as_str(),
        revision = definition.revision(),
        "approval route defined"
    );
    Ok(ok(dto::definition_to_json(kind, Some(&definition))))
}

fn parse_kind(raw: &str) -> ApiResult<DocumentKind> {
    raw.parse().map_err(|_| ApiError::not_found("workflow"))
}
