//! Tenant user directory.
//!
//! Tokens are minted elsewhere; the directory records who may act in the
//! tenant and with which roles. A user created with an explicit `user_id`
//! is matched against the `sub` claim of their tokens.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Json, Path},
    routing::{delete, get, post},
};
use chrono::Utc;

use tradeflow_auth::permissions::USERS_MANAGE;
use tradeflow_auth::{
    ActivateUser, AssignRole, CreateUser, RevokeRole, Role, SuspendUser, User, UserCommand, user_stream_id,
};
use tradeflow_core::UserId;

use crate::app::dto::{self, CreateUserBody, ReasonBody, RoleBody};
use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{authorized, created, items, ok};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user))
        .route("/:id/roles", post(assign_role))
        .route("/:id/roles/:role", delete(revoke_role))
        .route("/:id/suspend", post(suspend_user))
        .route("/:id/activate", post(activate_user))
}

fn parse_user(raw: &str) -> ApiResult<UserId> {
    raw.parse().map_err(|_| ApiError::not_found("user"))
}

async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&tenant, &principal, &USERS_MANAGE)?;
    let mut users = services.read_models().users.list(tenant.tenant_id());
    users.sort_by(|a, b| a.email.cmp(&b.email));
    Ok(items(users.iter().map(dto::user_to_json).collect()))
}

async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, &USERS_MANAGE)?;
    let user_id = parse_user(&id)?;
    services
        .read_models()
        .users
        .get(tenant.tenant_id(), user_stream_id(user_id))
        .map(|u| ok(dto::user_to_json(&u)))
        .ok_or_else(|| ApiError::not_found("user"))
}

async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CreateUserBody>,
) -> ApiResult {
    let user_id = body.user_id.unwrap_or_default();
    let cmd = UserCommand::Create(CreateUser {
        tenant_id: tenant.tenant_id(),
        user_id,
        email: body.email,
        display_name: body.display_name,
        initial_roles: body.roles.into_iter().map(Role::new).collect(),
        actor_roles: principal.roles().to_vec(),
        occurred_at: Utc::now(),
    });
    let cmd = authorized(&tenant, &principal, cmd, USERS_MANAGE)?;
    let user: User = services.dispatch_record(tenant.tenant_id(), user_stream_id(user_id), cmd)?;

    tracing::info!(tenant_id = %tenant.tenant_id(), user_id = %user_id, "user created");
    Ok(created(dto::user_to_json(&user)))
}

async fn assign_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<RoleBody>,
) -> ApiResult {
    let user_id = existing_user(&services, &tenant, &id)?;
    let cmd = UserCommand::AssignRole(AssignRole {
        tenant_id: tenant.tenant_id(),
        user_id,
        role: Role::new(body.role),
        actor_roles: principal.roles().to_vec(),
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, &principal, user_id, cmd)
}

async fn revoke_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, role)): Path<(String, String)>,
) -> ApiResult {
    let user_id = existing_user(&services, &tenant, &id)?;
    let cmd = UserCommand::RevokeRole(RevokeRole {
        tenant_id: tenant.tenant_id(),
        user_id,
        role: Role::new(role),
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, &principal, user_id, cmd)
}

async fn suspend_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<ReasonBody>>,
) -> ApiResult {
    let user_id = existing_user(&services, &tenant, &id)?;
    if user_id == principal.user_id() {
        return Err(ApiError::new(
            axum::http::StatusCode::CONFLICT,
            "invariant_violation",
            "users cannot suspend themselves",
        ));
    }
    let cmd = UserCommand::Suspend(SuspendUser {
        tenant_id: tenant.tenant_id(),
        user_id,
        reason: body.and_then(|Json(b)| b.reason).unwrap_or_default(),
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, &principal, user_id, cmd)
}

async fn activate_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let user_id = existing_user(&services, &tenant, &id)?;
    let cmd = UserCommand::Activate(ActivateUser {
        tenant_id: tenant.tenant_id(),
        user_id,
        occurred_at: Utc::now(),
    });
    dispatch(&services, &tenant, &principal, user_id, cmd)
}

fn existing_user(services: &AppServices, tenant: &TenantContext, raw_id: &str) -> ApiResult<UserId> {
    let user_id = parse_user(raw_id)?;
    let _: User = services.record(tenant.tenant_id(), user_stream_id(user_id))?;
    Ok(user_id)
}

fn dispatch(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    user_id: UserId,
    cmd: UserCommand,
) -> ApiResult {
    let cmd = authorized(tenant, principal, cmd, USERS_MANAGE)?;
    let user: User = services.dispatch_record(tenant.tenant_id(), user_stream_id(user_id), cmd)?;
    Ok(ok(dto::user_to_json(&user)))
}
