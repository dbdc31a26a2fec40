use chrono::{DateTime, Utc};

/// A fact emitted by an aggregate.
///
/// Events are append-only and versioned so read models can be rebuilt from the
/// log at any time.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable dotted name, e.g. `"purchasing.order.goods_received"`.
    fn event_type(&self) -> &'static str;

    /// Schema version of the payload.
    fn version(&self) -> u32;

    /// Business time of the fact.
    fn occurred_at(&self) -> DateTime<Utc>;
}
