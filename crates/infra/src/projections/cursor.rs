//! Per-stream cursors shared by every projection.
//!
//! Delivery is at-least-once, so each projection remembers the last sequence
//! number it applied for each (tenant, aggregate) stream. Replays at or below
//! the cursor are skipped; a gap means an event was lost and is an error.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use tradeflow_core::{AggregateId, TenantId};
use tradeflow_events::EventEnvelope;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize {aggregate_type} event: {message}")]
    Deserialize { aggregate_type: String, message: String },

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

impl ProjectionError {
    pub(crate) fn deserialize(envelope: &EventEnvelope<JsonValue>, err: serde_json::Error) -> Self {
        ProjectionError::Deserialize {
            aggregate_type: envelope.aggregate_type().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CursorCheck {
    /// Next event of the stream; apply it and advance.
    Apply,
    /// Already applied; ignore.
    Duplicate,
}

#[derive(Debug, Default)]
pub struct StreamCursors {
    positions: RwLock<HashMap<(TenantId, AggregateId), u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        self.positions
            .read()
            .ok()
            .and_then(|p| p.get(&(tenant_id, aggregate_id)).copied())
            .unwrap_or(0)
    }

    pub fn check(&self, envelope: &EventEnvelope<JsonValue>) -> Result<CursorCheck, ProjectionError> {
        let last = self.position(envelope.tenant_id(), envelope.aggregate_id());
        let found = envelope.sequence_number();

        if found == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found });
        }
        if found <= last {
            return Ok(CursorCheck::Duplicate);
        }
        // The first event seen for a stream may be anywhere (projection attached
        // late); after that increments must be exact.
        if last != 0 && found != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found });
        }
        Ok(CursorCheck::Apply)
    }

    pub fn advance(&self, envelope: &EventEnvelope<JsonValue>) {
        if let Ok(mut positions) = self.positions.write() {
            positions.insert((envelope.tenant_id(), envelope.aggregate_id()), envelope.sequence_number());
        }
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut positions) = self.positions.write() {
            positions.retain(|(t, _), _| *t != tenant_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn env(tenant_id: TenantId, aggregate_id: AggregateId, seq: u64) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(Uuid::now_v7(), tenant_id, aggregate_id, "x", seq, json!({}))
    }

    #[test]
    fn duplicates_are_skipped_and_gaps_rejected() {
        let cursors = StreamCursors::new();
        let (t, a) = (TenantId::new(), AggregateId::new());

        assert_eq!(cursors.check(&env(t, a, 1)).unwrap(), CursorCheck::Apply);
        cursors.advance(&env(t, a, 1));

        assert_eq!(cursors.check(&env(t, a, 1)).unwrap(), CursorCheck::Duplicate);
        assert!(matches!(
            cursors.check(&env(t, a, 3)),
            Err(ProjectionError::NonMonotonicSequence { last: 1, found: 3 })
        ));
        assert!(cursors.check(&env(t, a, 0)).is_err());
    }

    #[test]
    fn clearing_a_tenant_resets_its_streams_only() {
        let cursors = StreamCursors::new();
        let (t1, t2, a) = (TenantId::new(), TenantId::new(), AggregateId::new());
        cursors.advance(&env(t1, a, 4));
        cursors.advance(&env(t2, a, 2));

        cursors.clear_tenant(t1);

        assert_eq!(cursors.position(t1, a), 0);
        assert_eq!(cursors.position(t2, a), 2);
    }
}
