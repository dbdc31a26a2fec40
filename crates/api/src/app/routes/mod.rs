use axum::{Router, routing::get};

use tradeflow_parties::PartyKind;

pub mod catalog;
pub mod common;
pub mod documents;
pub mod invoicing;
pub mod notifications;
pub mod parties;
pub mod purchasing;
pub mod reports;
pub mod sales;
pub mod system;
pub mod users;
pub mod workflows;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/stream", get(system::stream))
        .nest("/customers", parties::router(PartyKind::Customer))
        .nest("/suppliers", parties::router(PartyKind::Supplier))
        .nest("/items", catalog::items_router())
        .nest("/units", catalog::units_router())
        .nest("/warehouses", catalog::warehouses_router())
        .nest("/purchase-requests", purchasing::requests_router())
        .nest("/purchase-orders", purchasing::orders_router())
        .nest("/customer-orders", sales::orders_router())
        .nest(
            "/delivery-orders",
            sales::deliveries_router().merge(invoicing::delivery_routes()),
        )
        .nest("/sales-invoices", invoicing::router())
        .nest("/workflows", workflows::router())
        .nest("/notifications", notifications::router())
        .nest("/reports", reports::router())
        .nest("/users", users::router())
}
