use chrono::{DateTime, Utc};

/// A domain fact.
///
/// Event types are stable dotted `module.aggregate.happening` strings
/// ("jobcards.job_card.completed", "inventory.spare_part.added"); the store
/// records them with a schema version so payloads can evolve without
/// rewriting history.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable dotted type name.
    fn event_type(&self) -> &'static str;

    /// Payload schema version. Override when a payload changes shape;
    /// readers pick the decoder by (type, version).
    fn version(&self) -> u32 {
        1
    }

    /// Business time: when the thing happened, not when it was stored.
    fn occurred_at(&self) -> DateTime<Utc>;
}
