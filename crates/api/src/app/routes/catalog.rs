use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Json, Path},
    routing::{get, post},
};
use chrono::Utc;

use tradeflow_auth::permissions::{MASTERDATA_READ, MASTERDATA_WRITE};
use tradeflow_catalog::{
    DeactivateWarehouse, DefineUnit, DiscontinueItem, Item, ItemCommand, ItemId, RegisterItem, RegisterWarehouse,
    RenameUnit, Unit, UnitCommand, UnitId, UpdateItem, UpdateWarehouse, Warehouse, WarehouseCommand, WarehouseId,
};
use tradeflow_core::AggregateId;

use crate::app::dto::{
    self, CreateItemRequest, CreateUnitRequest, CreateWarehouseRequest, RenameUnitRequest, UpdateItemRequest,
    UpdateWarehouseRequest,
};
use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{authorized, created, items, ok, parse_id};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn items_router() -> Router {
    Router::new()
        .route("/", get(list_items).post(create_item))
        .route("/:id", get(get_item).patch(update_item))
        .route("/:id/discontinue", post(discontinue_item))
        .route("/:id/stock", get(item_stock))
}

pub fn units_router() -> Router {
    Router::new()
        .route("/", get(list_units).post(create_unit))
        .route("/:id", get(get_unit).patch(rename_unit))
}

pub fn warehouses_router() -> Router {
    Router::new()
        .route("/", get(list_warehouses).post(create_warehouse))
        .route("/:id", get(get_warehouse).patch(update_warehouse))
        .route("/:id/deactivate", post(deactivate_warehouse))
}

// ─────────────────────────────────────────────────────────────────────────────
// Items
// ─────────────────────────────────────────────────────────────────────────────

async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&tenant, &principal, &MASTERDATA_READ)?;
    let mut all = services.read_models().items.list(tenant.tenant_id());
    all.sort_by(|a, b| a.code().cmp(b.code()));
    Ok(items(all.iter().map(dto::item_to_json).collect()))
}

async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CreateItemRequest>,
) -> ApiResult {
    // The unit must exist in this tenant.
    let _: Unit = services.record(tenant.tenant_id(), body.unit_id.0)?;

    let agg = AggregateId::new();
    let cmd = ItemCommand::RegisterItem(RegisterItem {
        tenant_id: tenant.tenant_id(),
        item_id: ItemId::new(agg),
        code: body.code,
        name: body.name,
        description: body.description,
        unit_id: body.unit_id,
        standard_price: body.standard_price,
        occurred_at: Utc::now(),
    });
    let cmd = authorized(&tenant, &principal, cmd, MASTERDATA_WRITE)?;
    let item: Item = services.dispatch_record(tenant.tenant_id(), agg, cmd)?;
    Ok(created(dto::item_to_json(&item)))
}

async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, &MASTERDATA_READ)?;
    services
        .read_models()
        .items
        .get(tenant.tenant_id(), parse_id(&id)?)
        .map(|i| ok(dto::item_to_json(&i)))
        .ok_or_else(|| ApiError::not_found("item"))
}

async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<UpdateItemRequest>,
) -> ApiResult {
    let agg = parse_id(&id)?;
    let _: Item = services.record(tenant.tenant_id(), agg)?;
    if let Some(unit_id) = body.unit_id {
        let _: Unit = services.record(tenant.tenant_id(), unit_id.0)?;
    }

    let cmd = ItemCommand::UpdateItem(UpdateItem {
        tenant_id: tenant.tenant_id(),
        item_id: ItemId::new(agg),
        name: body.name,
        description: body.description,
        unit_id: body.unit_id,
        standard_price: body.standard_price,
        occurred_at: Utc::now(),
    });
    let cmd = authorized(&tenant, &principal, cmd, MASTERDATA_WRITE)?;
    let item: Item = services.dispatch_record(tenant.tenant_id(), agg, cmd)?;
    Ok(ok(dto::item_to_json(&item)))
}

async fn discontinue_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let agg = parse_id(&id)?;
    let _: Item = services.record(tenant.tenant_id(), agg)?;

    let cmd = ItemCommand::DiscontinueItem(DiscontinueItem {
        tenant_id: tenant.tenant_id(),
        item_id: ItemId::new(agg),
        occurred_at: Utc::now(),
    });
    let cmd = authorized(&tenant, &principal, cmd, MASTERDATA_WRITE)?;
    let item: Item = services.dispatch_record(tenant.tenant_id(), agg, cmd)?;
    Ok(ok(dto::item_to_json(&item)))
}

/// Stock of one item across warehouses.
async fn item_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, &MASTERDATA_READ)?;
    let item_id = ItemId::new(parse_id(&id)?);
    let levels = services
        .read_models()
        .stock
        .list(tenant.tenant_id())
        .into_iter()
        .filter(|level| level.item_id == item_id)
        .map(|level| dto::stock_to_json(&level))
        .collect();
    Ok(items(levels))
}

// ─────────────────────────────────────────────────────────────────────────────
// Units
// ─────────────────────────────────────────────────────────────────────────────

async fn list_units(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&tenant, &principal, &MASTERDATA_READ)?;
    let mut all = services.read_models().units.list(tenant.tenant_id());
    all.sort_by(|a, b| a.code().cmp(b.code()));
    Ok(items(all.iter().map(dto::unit_to_json).collect()))
}

async fn create_unit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CreateUnitRequest>,
) -> ApiResult {
    let agg = AggregateId::new();
    let cmd = UnitCommand::DefineUnit(DefineUnit {
        tenant_id: tenant.tenant_id(),
        unit_id: UnitId::new(agg),
        code: body.code,
        name: body.name,
        occurred_at: Utc::now(),
    });
    let cmd = authorized(&tenant, &principal, cmd, MASTERDATA_WRITE)?;
    let unit: Unit = services.dispatch_record(tenant.tenant_id(), agg, cmd)?;
    Ok(created(dto::unit_to_json(&unit)))
}

async fn get_unit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, &MASTERDATA_READ)?;
    services
        .read_models()
        .units
        .get(tenant.tenant_id(), parse_id(&id)?)
        .map(|u| ok(dto::unit_to_json(&u)))
        .ok_or_else(|| ApiError::not_found("unit"))
}

async fn rename_unit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<RenameUnitRequest>,
) -> ApiResult {
    let agg = parse_id(&id)?;
    let _: Unit = services.record(tenant.tenant_id(), agg)?;

    let cmd = UnitCommand::RenameUnit(RenameUnit {
        tenant_id: tenant.tenant_id(),
        unit_id: UnitId::new(agg),
        name: body.name,
        occurred_at: Utc::now(),
    });
    let cmd = authorized(&tenant, &principal, cmd, MASTERDATA_WRITE)?;
    let unit: Unit = services.dispatch_record(tenant.tenant_id(), agg, cmd)?;
    Ok(ok(dto::unit_to_json(&unit)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Warehouses
// ─────────────────────────────────────────────────────────────────────────────

async fn list_warehouses(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&tenant, &principal, &MASTERDATA_READ)?;
    let mut all = services.read_models().warehouses.list(tenant.tenant_id());
    all.sort_by(|a, b| a.code().cmp(b.code()));
    Ok(items(all.iter().map(dto::warehouse_to_json).collect()))
}

async fn create_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CreateWarehouseRequest>,
) -> ApiResult {
    let agg = AggregateId::new();
    let cmd = WarehouseCommand::RegisterWarehouse(RegisterWarehouse {
        tenant_id: tenant.tenant_id(),
        warehouse_id: WarehouseId::new(agg),
        code: body.code,
        name: body.name,
        address: body.address,
        occurred_at: Utc::now(),
    });
    let cmd = authorized(&tenant, &principal, cmd, MASTERDATA_WRITE)?;
    let warehouse: Warehouse = services.dispatch_record(tenant.tenant_id(), agg, cmd)?;
    Ok(created(dto::warehouse_to_json(&warehouse)))
}

async fn get_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, &MASTERDATA_READ)?;
    services
        .read_models()
        .warehouses
        .get(tenant.tenant_id(), parse_id(&id)?)
        .map(|w| ok(dto::warehouse_to_json(&w)))
        .ok_or_else(|| ApiError::not_found("warehouse"))
}

async fn update_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<UpdateWarehouseRequest>,
) -> ApiResult {
    let agg = parse_id(&id)?;
    let _: Warehouse = services.record(tenant.tenant_id(), agg)?;

    let cmd = WarehouseCommand::UpdateWarehouse(UpdateWarehouse {
        tenant_id: tenant.tenant_id(),
        warehouse_id: WarehouseId::new(agg),
        name: body.name,
        address: body.address,
        occurred_at: Utc::now(),
    });
    let cmd = authorized(&tenant, &principal, cmd, MASTERDATA_WRITE)?;
    let warehouse: Warehouse = services.dispatch_record(tenant.tenant_id(), agg, cmd)?;
    Ok(ok(dto::warehouse_to_json(&warehouse)))
}

async fn deactivate_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let agg = parse_id(&id)?;
    let _: Warehouse = services.record(tenant.tenant_id(), agg)?;

    let cmd = WarehouseCommand::DeactivateWarehouse(DeactivateWarehouse {
        tenant_id: tenant.tenant_id(),
        warehouse_id: WarehouseId::new(agg),
        occurred_at: Utc::now(),
    });
    let cmd = authorized(&tenant, &principal, cmd, MASTERDATA_WRITE)?;
    let warehouse: Warehouse = services.dispatch_record(tenant.tenant_id(), agg, cmd)?;
    Ok(ok(dto::warehouse_to_json(&warehouse)))
}
