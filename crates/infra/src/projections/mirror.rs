//! Aggregate mirrors: read models that are simply the aggregate state.
//!
//! Master records and documents are small, so their list views fold the same
//! events the write side folds. The mirror keeps a copy of each aggregate per
//! tenant, filtered by stream type and guarded by [`StreamCursors`].

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use tradeflow_auth::User;
use tradeflow_catalog::{Item, ItemId, Unit, UnitId, Warehouse, WarehouseId};
use tradeflow_core::{Aggregate, AggregateId, TenantId, UserId};
use tradeflow_events::EventEnvelope;
use tradeflow_invoicing::SalesInvoice;
use tradeflow_parties::{Party, PartyId};
use tradeflow_purchasing::{PurchaseOrder, PurchaseRequest};
use tradeflow_sales::{CustomerOrder, DeliveryOrder};
use tradeflow_workflow::{WorkflowDefinition, WorkflowDocument};

use crate::read_model::{InMemoryTenantStore, TenantStore};

use super::cursor::{CursorCheck, ProjectionError, StreamCursors};

/// An aggregate whose state doubles as its read model.
pub trait Mirrored: Aggregate<Event: DeserializeOwned> + Clone + Send + Sync + 'static {
    /// Event-store aggregate type of the streams this mirror follows.
    fn aggregate_type() -> &'static str;

    fn unborn(id: AggregateId) -> Self;

    /// Tenant recorded by the first event, if any.
    fn owner_tenant(&self) -> Option<TenantId>;
}

macro_rules! mirrored_record {
    ($ty:ty, $stream:literal, $id:expr) => {
        impl Mirrored for $ty {
            fn aggregate_type() -> &'static str {
                $stream
            }

            fn unborn(id: AggregateId) -> Self {
                <$ty>::empty($id(id))
            }

            fn owner_tenant(&self) -> Option<TenantId> {
                self.tenant_id()
            }
        }
    };
}

mirrored_record!(Party, "parties.party", PartyId::new);
mirrored_record!(Item, "catalog.item", ItemId::new);
mirrored_record!(Unit, "catalog.unit", UnitId::new);
mirrored_record!(Warehouse, "catalog.warehouse", WarehouseId::new);
mirrored_record!(WorkflowDefinition, "workflow.definition", core::convert::identity);

impl Mirrored for User {
    fn aggregate_type() -> &'static str {
        "auth.user"
    }

    fn unborn(id: AggregateId) -> Self {
        User::empty(UserId::from_uuid(*id.as_uuid()))
    }

    fn owner_tenant(&self) -> Option<TenantId> {
        self.tenant_id
    }
}

macro_rules! mirrored_document {
    ($($ty:ty),+ $(,)?) => {$(
        impl Mirrored for $ty {
            fn aggregate_type() -> &'static str {
                <$ty as WorkflowDocument>::KIND.aggregate_type()
            }

            fn unborn(id: AggregateId) -> Self {
                <$ty as WorkflowDocument>::empty(id)
            }

            fn owner_tenant(&self) -> Option<TenantId> {
                <$ty as WorkflowDocument>::tenant_id(self)
            }
        }
    )+};
}

mirrored_document!(PurchaseRequest, PurchaseOrder, CustomerOrder, DeliveryOrder, SalesInvoice);

/// Tenant-partitioned copy of every aggregate of one type.
pub struct AggregateMirror<A, S = InMemoryTenantStore<AggregateId, A>> {
    store: S,
    cursors: StreamCursors,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A> AggregateMirror<A>
where
    A: Mirrored,
{
    pub fn in_memory() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl<A: Mirrored> Default for AggregateMirror<A> {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl<A, S> AggregateMirror<A, S>
where
    A: Mirrored,
    S: TenantStore<AggregateId, A>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
            _aggregate: PhantomData,
        }
    }

    pub fn get(&self, tenant_id: TenantId, id: AggregateId) -> Option<A> {
        self.store.get(tenant_id, &id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<A> {
        self.store.list(tenant_id)
    }

    /// Fold one envelope. Streams of other aggregate types are ignored.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != A::aggregate_type() {
            return Ok(());
        }
        if self.cursors.check(envelope)? == CursorCheck::Duplicate {
            return Ok(());
        }

        let event: A::Event = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::deserialize(envelope, e))?;

        let tenant_id = envelope.tenant_id();
        let mut state = self
            .store
            .get(tenant_id, &envelope.aggregate_id())
            .unwrap_or_else(|| A::unborn(envelope.aggregate_id()));
        state.apply(&event);

        if state.owner_tenant() != Some(tenant_id) {
            return Err(ProjectionError::TenantIsolation(format!(
                "{} stream {} does not belong to tenant {}",
                A::aggregate_type(),
                envelope.aggregate_id(),
                tenant_id
            )));
        }

        self.store.upsert(tenant_id, envelope.aggregate_id(), state);
        self.cursors.advance(envelope);
        Ok(())
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    use tradeflow_parties::{PartyCommand, PartyEvent, PartyKind, RegisterParty};

    fn registered(tenant_id: TenantId, id: AggregateId, code: &str) -> PartyEvent {
        let party = Party::empty(PartyId::new(id));
        let mut events = party
            .handle(&PartyCommand::RegisterParty(RegisterParty {
                tenant_id,
                party_id: PartyId::new(id),
                kind: PartyKind::Customer,
                code: code.to_string(),
                name: "Acme Trading".to_string(),
                contact: None,
                payment_terms_days: 30,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        events.remove(0)
    }

    fn envelope(tenant_id: TenantId, id: AggregateId, seq: u64, event: &PartyEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            id,
            "parties.party",
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    #[test]
    fn mirrors_party_and_ignores_redelivery() {
        let mirror: AggregateMirror<Party> = AggregateMirror::in_memory();
        let (tenant, id) = (TenantId::new(), AggregateId::new());
        let env = envelope(tenant, id, 1, &registered(tenant, id, "C-001"));

        mirror.apply_envelope(&env).unwrap();
        mirror.apply_envelope(&env).unwrap();

        let party = mirror.get(tenant, id).unwrap();
        assert_eq!(party.code(), "C-001");
        assert_eq!(mirror.list(tenant).len(), 1);
        assert!(mirror.list(TenantId::new()).is_empty());
    }

    #[test]
    fn skips_streams_of_other_types() {
        let mirror: AggregateMirror<Party> = AggregateMirror::in_memory();
        let (tenant, id) = (TenantId::new(), AggregateId::new());
        let env = EventEnvelope::new(Uuid::now_v7(), tenant, id, "catalog.item", 1, serde_json::json!({}));

        mirror.apply_envelope(&env).unwrap();
        assert!(mirror.get(tenant, id).is_none());
    }

    #[test]
    fn rejects_event_filed_under_foreign_tenant() {
        let mirror: AggregateMirror<Party> = AggregateMirror::in_memory();
        let (owner, intruder, id) = (TenantId::new(), TenantId::new(), AggregateId::new());
        let env = envelope(intruder, id, 1, &registered(owner, id, "C-002"));

        let err = mirror.apply_envelope(&env).unwrap_err();
        assert!(matches!(err, ProjectionError::TenantIsolation(_)));
        assert!(mirror.list(intruder).is_empty());
    }
}
