use std::collections::HashMap;
use std::sync::RwLock;

use tradeflow_core::{AggregateId, ExpectedVersion, TenantId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, validate_batch};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<StreamKey, Vec<StoredEvent>>,
    /// Commit order across streams: (stream, index into that stream).
    log: Vec<(StreamKey, usize)>,
}

/// In-memory append-only event store.
///
/// Intended for tests and single-process development. Everything is lost on
/// restart.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };
        validate_batch(&events)?;

        let key = StreamKey {
            tenant_id: first.tenant_id,
            aggregate_id: first.aggregate_id,
        };
        let aggregate_type = first.aggregate_type.clone();

        let mut inner = self
            .inner
            .write()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;
        let Inner { streams, log } = &mut *inner;

        let stream = streams.entry(key).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                tenant_id: e.tenant_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            next += 1;
            log.push((key, stream.len()));
            stream.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };

        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        Ok(inner.streams.get(&key).cloned().unwrap_or_default())
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        Ok(inner
            .log
            .iter()
            .filter_map(|(key, idx)| inner.streams.get(key).and_then(|s| s.get(*idx)).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn ev(tenant_id: TenantId, aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: "test.thing.happened".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({}),
        }
    }

    #[test]
    fn assigns_sequence_numbers_from_one() {
        let store = InMemoryEventStore::new();
        let (t, a) = (TenantId::new(), AggregateId::new());

        let committed = store
            .append(vec![ev(t, a, "x"), ev(t, a, "x")], ExpectedVersion::Exact(0))
            .unwrap();

        assert_eq!(committed.iter().map(|e| e.sequence_number).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn stale_expected_version_is_a_concurrency_error() {
        let store = InMemoryEventStore::new();
        let (t, a) = (TenantId::new(), AggregateId::new());
        store.append(vec![ev(t, a, "x")], ExpectedVersion::Exact(0)).unwrap();

        let err = store.append(vec![ev(t, a, "x")], ExpectedVersion::Exact(0)).unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
    }

    #[test]
    fn streams_are_isolated_per_tenant() {
        let store = InMemoryEventStore::new();
        let (t1, t2, a) = (TenantId::new(), TenantId::new(), AggregateId::new());
        store.append(vec![ev(t1, a, "x")], ExpectedVersion::Exact(0)).unwrap();

        assert!(store.load_stream(t2, a).unwrap().is_empty());
        assert_eq!(store.load_stream(t1, a).unwrap().len(), 1);
    }

    #[test]
    fn rejects_mixed_batches_and_type_changes() {
        let store = InMemoryEventStore::new();
        let (t1, t2, a) = (TenantId::new(), TenantId::new(), AggregateId::new());

        let err = store
            .append(vec![ev(t1, a, "x"), ev(t2, a, "x")], ExpectedVersion::Any)
            .unwrap_err();
        assert!(matches!(err, EventStoreError::TenantIsolation(_)));

        store.append(vec![ev(t1, a, "x")], ExpectedVersion::Any).unwrap();
        let err = store.append(vec![ev(t1, a, "y")], ExpectedVersion::Any).unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
    }

    #[test]
    fn load_all_preserves_commit_order_across_streams() {
        let store = InMemoryEventStore::new();
        let t = TenantId::new();
        let (a, b) = (AggregateId::new(), AggregateId::new());
        store.append(vec![ev(t, a, "x")], ExpectedVersion::Any).unwrap();
        store.append(vec![ev(t, b, "y")], ExpectedVersion::Any).unwrap();
        store.append(vec![ev(t, a, "x")], ExpectedVersion::Any).unwrap();

        let all = store.load_all().unwrap();
        let order: Vec<_> = all.iter().map(|e| (e.aggregate_id, e.sequence_number)).collect();
        assert_eq!(order, vec![(a, 1), (b, 1), (a, 2)]);
    }
}
