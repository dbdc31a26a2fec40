use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path, Query},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use tradeflow_infra::projections::{INBOX_STREAM, Notification};
use tradeflow_workflow::{Inbox, InboxCommand, MarkRead, inbox_stream_id};

use crate::app::dto;
use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{items, ok};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_notifications))
        .route("/unread-count", get(unread_count))
        .route("/read-all", post(mark_all_read))
        .route("/:id/read", post(mark_read))
}

#[derive(Debug, Default, Deserialize)]
struct NotificationQuery {
    #[serde(default)]
    unread: bool,
}

fn visible(services: &AppServices, tenant: &TenantContext, principal: &PrincipalContext) -> Vec<Notification> {
    services
        .read_models()
        .notifications
        .list_for(tenant.tenant_id(), principal.user_id(), &principal.role_names())
}

async fn list_notifications(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<NotificationQuery>,
) -> ApiResult {
    let body = visible(&services, &tenant, &principal)
        .iter()
        .filter(|n| !query.unread || !n.read)
        .map(dto::notification_to_json)
        .collect();
    Ok(items(body))
}

async fn unread_count(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    let count = services.read_models().notifications.unread_count_for(
        tenant.tenant_id(),
        principal.user_id(),
        &principal.role_names(),
    );
    Ok(ok(json!({ "unread": count })))
}

async fn mark_read(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: Uuid = id.parse().map_err(|_| ApiError::not_found("notification"))?;
    let mut notification = services
        .read_models()
        .notifications
        .get_for(tenant.tenant_id(), id, principal.user_id(), &principal.role_names())
        .ok_or_else(|| ApiError::not_found("notification"))?;

    record_read(&services, &tenant, &principal, vec![id])?;
    notification.read = true;
    Ok(ok(dto::notification_to_json(&notification)))
}

async fn mark_all_read(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    let unread: Vec<Uuid> = visible(&services, &tenant, &principal)
        .into_iter()
        .filter(|n| !n.read)
        .map(|n| n.id)
        .collect();
    let marked = unread.len();
    if marked > 0 {
        record_read(&services, &tenant, &principal, unread)?;
    }
    Ok(ok(json!({ "marked": marked })))
}

fn record_read(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    notification_ids: Vec<Uuid>,
) -> ApiResult<()> {
    let inbox = inbox_stream_id(principal.user_id());
    let cmd = InboxCommand::MarkRead(MarkRead {
        tenant_id: tenant.tenant_id(),
        user_id: principal.user_id(),
        notification_ids,
        occurred_at: Utc::now(),
    });
    services
        .dispatcher()
        .dispatch(tenant.tenant_id(), inbox, INBOX_STREAM, cmd, |_, id| Inbox::empty(id))?;
    Ok(())
}
