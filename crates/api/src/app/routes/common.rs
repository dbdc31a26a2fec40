use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{NaiveDate, Utc};
use serde_json::{Value as JsonValue, json};

use tradeflow_auth::{CommandAuthorization, Permission};
use tradeflow_catalog::{Item, ItemId, Warehouse, WarehouseId};
use tradeflow_core::{AggregateId, TenantId};
use tradeflow_infra::DispatchError;
use tradeflow_parties::{Party, PartyId, PartyKind};
use tradeflow_workflow::WorkflowStatus;

use crate::app::errors::{ApiError, ApiResult};
use crate::app::services::AppServices;
use crate::authz::authorize_command;
use crate::context::{PrincipalContext, TenantContext};

/// Small helper wrapper to associate required permissions with a command.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

/// Authorize `command` against `permission` and hand it back for dispatch.
pub fn authorized<C>(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    command: C,
    permission: Permission,
) -> ApiResult<C> {
    let cmd_auth = CmdAuth {
        inner: command,
        required: vec![permission],
    };
    authorize_command(tenant, principal, &cmd_auth)?;
    Ok(cmd_auth.inner)
}

pub fn parse_id(raw: &str) -> ApiResult<AggregateId> {
    raw.parse()
        .map_err(|_| ApiError::validation(format!("invalid id: {raw}")))
}

pub fn parse_status(raw: Option<&str>) -> ApiResult<Option<WorkflowStatus>> {
    raw.map(|s| s.parse::<WorkflowStatus>().map_err(|e| ApiError::validation(e.to_string())))
        .transpose()
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn ok(body: JsonValue) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

pub fn created(body: JsonValue) -> Response {
    (StatusCode::CREATED, Json(body)).into_response()
}

pub fn items(items: Vec<JsonValue>) -> Response {
    ok(json!({ "items": items }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Master data referenced from request bodies
// ─────────────────────────────────────────────────────────────────────────────

/// A dangling reference in a body is a validation error, not a 404.
fn referenced<T>(what: &str, loaded: Result<T, DispatchError>) -> ApiResult<T> {
    match loaded {
        Err(DispatchError::NotFound) => Err(ApiError::validation(format!("unknown {what}"))),
        other => Ok(other?),
    }
}

pub fn ensure_party(services: &AppServices, tenant_id: TenantId, id: PartyId, kind: PartyKind) -> ApiResult<Party> {
    let party: Party = referenced(kind.as_str(), services.record(tenant_id, id.0))?;
    party.ensure_usable_as(kind)?;
    Ok(party)
}

pub fn ensure_warehouse(services: &AppServices, tenant_id: TenantId, id: WarehouseId) -> ApiResult<Warehouse> {
    let warehouse: Warehouse = referenced("warehouse", services.record(tenant_id, id.0))?;
    warehouse.ensure_operational()?;
    Ok(warehouse)
}

pub fn ensure_items(services: &AppServices, tenant_id: TenantId, ids: impl IntoIterator<Item = ItemId>) -> ApiResult<()> {
    for id in ids {
        let item: Item = referenced("item", services.record(tenant_id, id.0))?;
        item.ensure_orderable()?;
    }
    Ok(())
}
