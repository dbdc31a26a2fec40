use serde::Serialize;
use serde_json::Value as JsonValue;

use tradeflow_catalog::{ItemId, WarehouseId};
use tradeflow_core::TenantId;
use tradeflow_events::EventEnvelope;
use tradeflow_purchasing::{PurchaseOrder, PurchaseOrderEvent};
use tradeflow_sales::{DeliveryOrder, DeliveryOrderEvent};
use tradeflow_workflow::WorkflowDocument;

use crate::read_model::{InMemoryTenantStore, TenantStore};

use super::cursor::{CursorCheck, ProjectionError, StreamCursors};

/// Stock of one item in one warehouse.
///
/// Receipts against purchase orders add, dispatched delivery orders subtract.
/// On-hand may go negative: dispatch is not blocked on stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub received: i64,
    pub dispatched: i64,
}

impl StockLevel {
    fn zero(item_id: ItemId, warehouse_id: WarehouseId) -> Self {
        Self {
            item_id,
            warehouse_id,
            received: 0,
            dispatched: 0,
        }
    }

    pub fn on_hand(&self) -> i64 {
        self.received - self.dispatched
    }
}

type StockKey = (ItemId, WarehouseId);

/// Stock-on-hand projection keyed by (item, warehouse).
#[derive(Debug)]
pub struct StockOnHandProjection<S = InMemoryTenantStore<StockKey, StockLevel>> {
    store: S,
    cursors: StreamCursors,
}

impl StockOnHandProjection {
    pub fn in_memory() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl Default for StockOnHandProjection {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl<S> StockOnHandProjection<S>
where
    S: TenantStore<StockKey, StockLevel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, item_id: ItemId, warehouse_id: WarehouseId) -> Option<StockLevel> {
        self.store.get(tenant_id, &(item_id, warehouse_id))
    }

    /// All stock rows of a tenant, ordered by warehouse then item.
    pub fn list(&self, tenant_id: TenantId) -> Vec<StockLevel> {
        let mut rows = self.store.list(tenant_id);
        rows.sort_by_key(|r| (*r.warehouse_id.0.as_uuid(), *r.item_id.0.as_uuid()));
        rows
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let aggregate_type = envelope.aggregate_type();
        let is_receipt_stream = aggregate_type == PurchaseOrder::KIND.aggregate_type();
        let is_dispatch_stream = aggregate_type == DeliveryOrder::KIND.aggregate_type();
        if !is_receipt_stream && !is_dispatch_stream {
            return Ok(());
        }
        if self.cursors.check(envelope)? == CursorCheck::Duplicate {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let payload = envelope.payload().clone();

        if is_receipt_stream {
            let event: PurchaseOrderEvent =
                serde_json::from_value(payload).map_err(|e| ProjectionError::deserialize(envelope, e))?;
            if let PurchaseOrderEvent::GoodsReceived(e) = event {
                ensure_tenant(tenant_id, e.tenant_id)?;
                for line in &e.lines {
                    self.book(tenant_id, line.item_id, e.warehouse_id, |s| s.received += line.quantity);
                }
            }
        } else {
            let event: DeliveryOrderEvent =
                serde_json::from_value(payload).map_err(|e| ProjectionError::deserialize(envelope, e))?;
            if let DeliveryOrderEvent::DeliveryDispatched(e) = event {
                ensure_tenant(tenant_id, e.tenant_id)?;
                for line in &e.lines {
                    self.book(tenant_id, line.item_id, e.warehouse_id, |s| s.dispatched += line.quantity);
                }
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }

    fn book(&self, tenant_id: TenantId, item_id: ItemId, warehouse_id: WarehouseId, f: impl FnOnce(&mut StockLevel)) {
        let key = (item_id, warehouse_id);
        let mut level = self
            .store
            .get(tenant_id, &key)
            .unwrap_or_else(|| StockLevel::zero(item_id, warehouse_id));
        f(&mut level);
        self.store.upsert(tenant_id, key, level);
    }
}

fn ensure_tenant(envelope_tenant: TenantId, event_tenant: TenantId) -> Result<(), ProjectionError> {
    if envelope_tenant == event_tenant {
        Ok(())
    } else {
        Err(ProjectionError::TenantIsolation(
            "event tenant_id does not match envelope tenant_id".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    use tradeflow_core::{AggregateId, UserId};
    use tradeflow_parties::PartyId;
    use tradeflow_purchasing::{GoodsReceived, PurchaseOrderId, ReceivedLine};
    use tradeflow_sales::{DeliveryDispatched, DeliveryOrderId, DispatchedLine};

    fn received(tenant_id: TenantId, item: ItemId, wh: WarehouseId, qty: i64) -> PurchaseOrderEvent {
        PurchaseOrderEvent::GoodsReceived(GoodsReceived {
            tenant_id,
            order_id: PurchaseOrderId::new(AggregateId::new()),
            receipt_id: AggregateId::new(),
            supplier_id: PartyId::new(AggregateId::new()),
            warehouse_id: wh,
            received_on: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            received_by: UserId::new(),
            lines: vec![ReceivedLine { line_no: 1, item_id: item, quantity: qty }],
            occurred_at: Utc::now(),
        })
    }

    fn dispatched(tenant_id: TenantId, item: ItemId, wh: WarehouseId, qty: i64) -> DeliveryOrderEvent {
        DeliveryOrderEvent::DeliveryDispatched(DeliveryDispatched {
            tenant_id,
            delivery_id: DeliveryOrderId::new(AggregateId::new()),
            customer_id: PartyId::new(AggregateId::new()),
            warehouse_id: wh,
            lines: vec![DispatchedLine { line_no: 1, item_id: item, quantity: qty }],
            occurred_at: Utc::now(),
        })
    }

    fn env<E: serde::Serialize>(tenant: TenantId, stream: AggregateId, ty: &str, seq: u64, e: &E) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(Uuid::now_v7(), tenant, stream, ty, seq, serde_json::to_value(e).unwrap())
    }

    #[test]
    fn receipts_add_and_dispatches_subtract() {
        let projection = StockOnHandProjection::in_memory();
        let tenant = TenantId::new();
        let item = ItemId::new(AggregateId::new());
        let wh = WarehouseId::new(AggregateId::new());
        let (po, dord) = (AggregateId::new(), AggregateId::new());

        projection
            .apply_envelope(&env(tenant, po, "purchasing.order", 4, &received(tenant, item, wh, 10)))
            .unwrap();
        projection
            .apply_envelope(&env(tenant, po, "purchasing.order", 5, &received(tenant, item, wh, 5)))
            .unwrap();
        projection
            .apply_envelope(&env(tenant, dord, "sales.delivery", 3, &dispatched(tenant, item, wh, 4)))
            .unwrap();

        let level = projection.get(tenant, item, wh).unwrap();
        assert_eq!(level.received, 15);
        assert_eq!(level.dispatched, 4);
        assert_eq!(level.on_hand(), 11);
    }

    #[test]
    fn redelivered_receipt_is_booked_once() {
        let projection = StockOnHandProjection::in_memory();
        let tenant = TenantId::new();
        let item = ItemId::new(AggregateId::new());
        let wh = WarehouseId::new(AggregateId::new());
        let e = env(tenant, AggregateId::new(), "purchasing.order", 1, &received(tenant, item, wh, 7));

        projection.apply_envelope(&e).unwrap();
        projection.apply_envelope(&e).unwrap();

        assert_eq!(projection.get(tenant, item, wh).unwrap().on_hand(), 7);
        assert!(projection.list(TenantId::new()).is_empty());
    }
}
