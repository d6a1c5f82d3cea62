use serde::{Deserialize, Serialize};
use uuid::Uuid;

use garagekit_core::{AggregateId, GarageId};

/// Stream metadata wrapped around an event payload.
///
/// This is the unit the store appends and the bus carries. The garage id
/// rides on every envelope so a consumer can enforce tenant isolation
/// without decoding the payload, and `sequence_number` is the stream-scoped
/// position (one stream per garage + aggregate, starting at 1) that lets
/// projections drop duplicates and detect gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    garage_id: GarageId,

    aggregate_id: AggregateId,
    aggregate_type: String,

    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        garage_id: GarageId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            garage_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn garage_id(&self) -> GarageId {
        self.garage_id
    }

    /// True when this envelope sits in the given garage's partition.
    /// Consumers use this to cross-check the payload's own garage claim.
    pub fn belongs_to(&self, garage_id: GarageId) -> bool {
        self.garage_id == garage_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_check_matches_only_the_owning_garage() {
        let garage_id = GarageId::new();
        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            garage_id,
            AggregateId::new(),
            "jobcards.job_card",
            1,
            "payload",
        );

        assert!(envelope.belongs_to(garage_id));
        assert!(!envelope.belongs_to(GarageId::new()));
    }
}
