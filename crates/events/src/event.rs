use chrono::{DateTime, Utc};

/// A fact recorded by an aggregate.
///
/// Events are immutable and append-only. `version` tracks the payload schema
/// so journal readers can evolve with it.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "order.rescheduled").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
