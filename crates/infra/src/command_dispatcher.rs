//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the stream (tenant-scoped) and check it is well formed
//!   ↓
//! 2. Rehydrate the aggregate by applying history
//!   ↓
//! 3. Handle the command (pure decision, yields events)
//!   ↓
//! 4. Append with ExpectedVersion::Exact(loaded version)
//!   ↓
//! 5. Publish committed envelopes on the bus
//! ```
//!
//! Publication happens only after a successful append. A publish failure is
//! reported to the caller even though the events are durable; consumers are
//! cursor-based and tolerate the redelivery a retry may cause.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use tradeflow_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use tradeflow_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure or a domain-level conflict.
    #[error("conflict: {0}")]
    Concurrency(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    /// A historical payload no longer matches the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
    #[error(transparent)]
    Store(EventStoreError),
    /// Publication failed after a successful append.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Reusable command execution engine.
///
/// Generic over the store and bus so tests run on the in-memory pair and the
/// server can swap in Postgres without touching domain code.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Rehydrate an aggregate without handling a command.
    ///
    /// Used for strongly consistent reads (e.g. a flow checking outstanding
    /// quantities right before allocating).
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Run one command through load → rehydrate → handle → append → publish.
    ///
    /// Returns the committed events; an empty vec when the command decided
    /// nothing needed to change.
    #[instrument(
        name = "dispatch",
        skip_all,
        fields(tenant_id = %tenant_id, aggregate_id = %aggregate_id, aggregate_type = tracing::field::Empty),
        err(Display)
    )]
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: tradeflow_events::Event + Serialize + DeserializeOwned,
    {
        let aggregate_type = aggregate_type.into();
        tracing::Span::current().record("aggregate_type", aggregate_type.as_str());

        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            debug!("command produced no events");
            return Ok(vec![]);
        }

        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(tenant_id, aggregate_id, aggregate_type.clone(), Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        tracing::info!(
            tenant_id = %tenant_id,
            aggregate_id = %aggregate_id,
            aggregate_type = %aggregate_type,
            event_count = committed.len(),
            "command committed"
        );
        Ok(committed)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // A misbehaving backend must never leak another tenant's events into a rehydration.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event =
            serde_json::from_value(stored.payload.clone()).map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use tradeflow_core::AggregateRoot;
    use tradeflow_events::InMemoryEventBus;
    use tradeflow_parties::{
        Party, PartyCommand, PartyId, PartyKind, RegisterParty, SuspendParty,
    };

    use crate::event_store::InMemoryEventStore;

    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
    }

    fn register(tenant_id: TenantId, party_id: PartyId) -> PartyCommand {
        PartyCommand::RegisterParty(RegisterParty {
            tenant_id,
            party_id,
            kind: PartyKind::Supplier,
            code: "acme".into(),
            name: "Acme Supplies".into(),
            contact: None,
            payment_terms_days: 30,
            occurred_at: Utc::now(),
        })
    }

    fn dispatch_party(d: &Dispatcher, tenant_id: TenantId, id: AggregateId, cmd: PartyCommand) -> Result<Vec<StoredEvent>, DispatchError> {
        d.dispatch::<Party>(tenant_id, id, "parties.party", cmd, |_, id| Party::empty(PartyId::new(id)))
    }

    #[test]
    fn dispatch_appends_then_publishes() {
        let d = dispatcher();
        let sub = d.bus().subscribe();
        let (t, id) = (TenantId::new(), AggregateId::new());

        let committed = dispatch_party(&d, t, id, register(t, PartyId::new(id))).unwrap();

        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].event_type, "parties.party.registered");
        let env = sub.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(env.sequence_number(), 1);
        assert_eq!(env.aggregate_type(), "parties.party");
    }

    #[test]
    fn load_rehydrates_current_state() {
        let d = dispatcher();
        let (t, id) = (TenantId::new(), AggregateId::new());
        dispatch_party(&d, t, id, register(t, PartyId::new(id))).unwrap();

        let party = d.load(t, id, |_, id| Party::empty(PartyId::new(id))).unwrap();
        assert!(party.is_created());
        assert_eq!(party.code(), "ACME");
        assert_eq!(party.version(), 1);
    }

    #[test]
    fn domain_errors_are_mapped_and_nothing_is_stored() {
        let d = dispatcher();
        let (t, id) = (TenantId::new(), AggregateId::new());

        let err = dispatch_party(
            &d,
            t,
            id,
            PartyCommand::SuspendParty(SuspendParty {
                tenant_id: t,
                party_id: PartyId::new(id),
                reason: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();

        assert!(matches!(err, DispatchError::NotFound));
        assert!(d.store().load_stream(t, id).unwrap().is_empty());
    }

    #[test]
    fn duplicate_create_is_a_conflict() {
        let d = dispatcher();
        let (t, id) = (TenantId::new(), AggregateId::new());
        dispatch_party(&d, t, id, register(t, PartyId::new(id))).unwrap();

        let err = dispatch_party(&d, t, id, register(t, PartyId::new(id))).unwrap_err();
        assert!(matches!(err, DispatchError::Concurrency(_)));
    }

    #[test]
    fn other_tenants_see_an_empty_stream() {
        let d = dispatcher();
        let (t1, t2, id) = (TenantId::new(), TenantId::new(), AggregateId::new());
        dispatch_party(&d, t1, id, register(t1, PartyId::new(id))).unwrap();

        let party = d.load(t2, id, |_, id| Party::empty(PartyId::new(id))).unwrap();
        assert!(!party.is_created());
    }
}
