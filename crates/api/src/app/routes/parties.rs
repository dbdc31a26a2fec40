//! Customer and supplier master data. Both collections share the handlers;
//! the router for each one carries its [`PartyKind`] as an extension.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Json, Path},
    response::Response,
    routing::{get, post},
};
use chrono::Utc;

use tradeflow_auth::permissions::{MASTERDATA_READ, MASTERDATA_WRITE};
use tradeflow_core::AggregateId;
use tradeflow_parties::{
    Party, PartyCommand, PartyId, PartyKind, ReactivateParty, RegisterParty, SuspendParty, UpdateDetails,
};

use crate::app::dto::{self, CreatePartyRequest, SuspendRequest, UpdatePartyRequest};
use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{authorized, created, items, ok, parse_id};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router(kind: PartyKind) -> Router {
    Router::new()
        .route("/", get(list_parties).post(create_party))
        .route("/:id", get(get_party).patch(update_party))
        .route("/:id/suspend", post(suspend_party))
        .route("/:id/reactivate", post(reactivate_party))
        .layer(Extension(kind))
}

async fn list_parties(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<PartyKind>,
) -> ApiResult {
    require(&tenant, &principal, &MASTERDATA_READ)?;

    let mut parties: Vec<Party> = services
        .read_models()
        .parties
        .list(tenant.tenant_id())
        .into_iter()
        .filter(|p| p.kind() == kind)
        .collect();
    parties.sort_by(|a, b| a.code().cmp(b.code()));
    Ok(items(parties.iter().map(dto::party_to_json).collect()))
}

async fn create_party(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<PartyKind>,
    Json(body): Json<CreatePartyRequest>,
) -> ApiResult {
    let agg = AggregateId::new();
    let cmd = PartyCommand::RegisterParty(RegisterParty {
        tenant_id: tenant.tenant_id(),
        party_id: PartyId::new(agg),
        kind,
        code: body.code,
        name: body.name,
        contact: body.contact,
        payment_terms_days: body.payment_terms_days,
        occurred_at: Utc::now(),
    });
    let cmd = authorized(&tenant, &principal, cmd, MASTERDATA_WRITE)?;

    let party: Party = services.dispatch_record(tenant.tenant_id(), agg, cmd)?;
    tracing::info!(tenant_id = %tenant.tenant_id(), party = %agg, kind = kind.as_str(), "party registered");
    Ok(created(dto::party_to_json(&party)))
}

async fn get_party(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<PartyKind>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, &MASTERDATA_READ)?;
    let id = parse_id(&id)?;

    services
        .read_models()
        .parties
        .get(tenant.tenant_id(), id)
        .filter(|p| p.kind() == kind)
        .map(|p| ok(dto::party_to_json(&p)))
        .ok_or_else(|| ApiError::not_found(kind.as_str()))
}

async fn update_party(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<PartyKind>,
    Path(id): Path<String>,
    Json(body): Json<UpdatePartyRequest>,
) -> ApiResult {
    let agg = existing_party(&services, &tenant, kind, &id)?;
    let cmd = PartyCommand::UpdateDetails(UpdateDetails {
        tenant_id: tenant.tenant_id(),
        party_id: PartyId::new(agg),
        name: body.name,
        contact: body.contact,
        payment_terms_days: body.payment_terms_days,
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, &principal, agg, cmd)
}

async fn suspend_party(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<PartyKind>,
    Path(id): Path<String>,
    body: Option<Json<SuspendRequest>>,
) -> ApiResult {
    let agg = existing_party(&services, &tenant, kind, &id)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let cmd = PartyCommand::SuspendParty(SuspendParty {
        tenant_id: tenant.tenant_id(),
        party_id: PartyId::new(agg),
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, &principal, agg, cmd)
}

async fn reactivate_party(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<PartyKind>,
    Path(id): Path<String>,
) -> ApiResult {
    let agg = existing_party(&services, &tenant, kind, &id)?;
    let cmd = PartyCommand::ReactivateParty(ReactivateParty {
        tenant_id: tenant.tenant_id(),
        party_id: PartyId::new(agg),
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, &principal, agg, cmd)
}

/// A customer id on the supplier routes (and vice versa) is a 404.
fn existing_party(services: &AppServices, tenant: &TenantContext, kind: PartyKind, raw_id: &str) -> ApiResult<AggregateId> {
    let agg = parse_id(raw_id)?;
    let party: Party = services.record(tenant.tenant_id(), agg)?;
    if party.kind() != kind {
        return Err(ApiError::not_found(kind.as_str()));
    }
    Ok(agg)
}

fn dispatch(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    agg: AggregateId,
    cmd: PartyCommand,
) -> ApiResult<Response> {
    let cmd = authorized(tenant, principal, cmd, MASTERDATA_WRITE)?;
    let party: Party = services.dispatch_record(tenant.tenant_id(), agg, cmd)?;
    Ok(ok(dto::party_to_json(&party)))
}
