//! Projections (read model builders).
//!
//! Projections consume committed envelopes and build query-side views.
//! All projections are:
//! - **Rebuildable**: replayed from the event log at startup
//! - **Tenant-isolated**: data is partitioned by tenant
//! - **Idempotent**: safe for at-least-once delivery

pub mod cursor;
pub mod mirror;
pub mod notifications;
pub mod read_models;
pub mod stock_on_hand;

pub use cursor::{CursorCheck, ProjectionError, StreamCursors};
pub use mirror::{AggregateMirror, Mirrored};
pub use notifications::{INBOX_STREAM, Notification, NotificationsProjection, Recipient};
pub use read_models::ReadModels;
pub use stock_on_hand::{StockLevel, StockOnHandProjection};
