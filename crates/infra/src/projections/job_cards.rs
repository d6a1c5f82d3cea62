use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use garagekit_core::{AggregateId, GarageId, Money};
use garagekit_customers::CustomerId;
use garagekit_events::EventEnvelope;
use garagekit_jobcards::{JobCardEvent, JobCardId, JobCardStatus, RequestedPart};

use crate::read_model::GarageStore;

/// Queryable job card read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCardReadModel {
    pub job_card_id: JobCardId,
    pub customer_id: CustomerId,
    pub description: String,
    pub status: JobCardStatus,
    pub service_charge: Money,
    pub requested_parts: Vec<RequestedPart>,
    /// Present only once completed (the frozen total).
    pub total_amount: Option<Money>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    garage_id: GarageId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum JobCardsProjectionError {
    #[error("failed to deserialize job card event: {0}")]
    Deserialize(String),

    #[error("garage isolation violation: {0}")]
    GarageIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Job cards projection (workshop board view).
#[derive(Debug)]
pub struct JobCardsProjection<S>
where
    S: GarageStore<JobCardId, JobCardReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> JobCardsProjection<S>
where
    S: GarageStore<JobCardId, JobCardReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, garage_id: GarageId, job_card_id: &JobCardId) -> Option<JobCardReadModel> {
        self.store.get(garage_id, job_card_id)
    }

    pub fn list(&self, garage_id: GarageId) -> Vec<JobCardReadModel> {
        self.store.list(garage_id)
    }

    /// Pending cards, oldest first.
    pub fn list_pending(&self, garage_id: GarageId) -> Vec<JobCardReadModel> {
        let mut cards: Vec<_> = self
            .list(garage_id)
            .into_iter()
            .filter(|c| c.status == JobCardStatus::Pending)
            .collect();
        cards.sort_by_key(|c| c.created_at);
        cards
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), JobCardsProjectionError> {
        if envelope.aggregate_type() != "jobcards.job_card" {
            return Ok(());
        }

        let garage_id = envelope.garage_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if let Ok(mut cursors) = self.cursors.write() {
            let key = CursorKey {
                garage_id,
                aggregate_id,
            };
            let last = *cursors.get(&key).unwrap_or(&0);

            if seq == 0 {
                return Err(JobCardsProjectionError::NonMonotonicSequence { last, found: seq });
            }
            if seq <= last {
                return Ok(());
            }
            if seq != last + 1 && last != 0 {
                return Err(JobCardsProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: JobCardEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| JobCardsProjectionError::Deserialize(e.to_string()))?;

            let (event_garage, job_card_id) = match &event {
                JobCardEvent::JobCardOpened(e) => (e.garage_id, e.job_card_id),
                JobCardEvent::JobCardUpdated(e) => (e.garage_id, e.job_card_id),
                JobCardEvent::JobCardCompleted(e) => (e.garage_id, e.job_card_id),
            };

            if event_garage != garage_id {
                return Err(JobCardsProjectionError::GarageIsolation(
                    "event garage_id does not match envelope garage_id".to_string(),
                ));
            }
            if job_card_id.0 != aggregate_id {
                return Err(JobCardsProjectionError::GarageIsolation(
                    "event job_card_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match event {
                JobCardEvent::JobCardOpened(e) => {
                    self.store.upsert(
                        garage_id,
                        e.job_card_id,
                        JobCardReadModel {
                            job_card_id: e.job_card_id,
                            customer_id: e.customer_id,
                            description: e.description,
                            status: JobCardStatus::Pending,
                            service_charge: e.service_charge,
                            requested_parts: e.requested_parts,
                            total_amount: None,
                            created_at: e.occurred_at,
                            completed_at: None,
                        },
                    );
                }
                JobCardEvent::JobCardUpdated(e) => {
                    if let Some(mut rm) = self.store.get(garage_id, &e.job_card_id) {
                        rm.description = e.description;
                        rm.service_charge = e.service_charge;
                        rm.requested_parts = e.requested_parts;
                        self.store.upsert(garage_id, e.job_card_id, rm);
                    }
                }
                JobCardEvent::JobCardCompleted(e) => {
                    if let Some(mut rm) = self.store.get(garage_id, &e.job_card_id) {
                        rm.status = JobCardStatus::Completed;
                        rm.total_amount = Some(e.total_amount);
                        rm.completed_at = Some(e.completed_at);
                        self.store.upsert(garage_id, e.job_card_id, rm);
                    }
                }
            }

            cursors.insert(key, seq);
        }

        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), JobCardsProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        {
            let mut garages = envs.iter().map(|e| e.garage_id()).collect::<Vec<_>>();
            garages.sort_by_key(|g| *g.as_uuid().as_bytes());
            garages.dedup();
            for g in garages {
                self.store.clear_garage(g);
            }
        }

        envs.sort_by_key(|e| {
            (
                *e.garage_id().as_uuid().as_bytes(),
                *e.aggregate_id().as_uuid().as_bytes(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use garagekit_jobcards::{JobCardCompleted, JobCardOpened, PartLine};
    use garagekit_inventory::SparePartId;
    use uuid::Uuid;

    use crate::read_model::InMemoryGarageStore;

    fn envelope(
        garage_id: GarageId,
        job_card_id: JobCardId,
        seq: u64,
        event: &JobCardEvent,
    ) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            garage_id,
            job_card_id.0,
            "jobcards.job_card",
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    #[test]
    fn completion_moves_card_off_the_pending_board() {
        let projection = JobCardsProjection::new(Arc::new(InMemoryGarageStore::new()));
        let garage_id = GarageId::new();
        let job_card_id = JobCardId::new(AggregateId::new());
        let customer_id = CustomerId::new(AggregateId::new());
        let part_id = SparePartId::new(AggregateId::new());

        let opened = JobCardEvent::JobCardOpened(JobCardOpened {
            garage_id,
            job_card_id,
            customer_id,
            description: "brake noise".to_string(),
            service_charge: Money::from_minor(15000),
            requested_parts: vec![RequestedPart {
                part_id,
                part_number: "BRK-01".to_string(),
                name: "Brake Pads".to_string(),
                quantity: 2,
            }],
            occurred_at: Utc::now(),
        });
        projection
            .apply_envelope(&envelope(garage_id, job_card_id, 1, &opened))
            .unwrap();
        assert_eq!(projection.list_pending(garage_id).len(), 1);

        let completed = JobCardEvent::JobCardCompleted(JobCardCompleted {
            garage_id,
            job_card_id,
            customer_id,
            lines: vec![PartLine {
                part_id,
                part_number: "BRK-01".to_string(),
                name: "Brake Pads".to_string(),
                quantity: 2,
                unit_price: Money::from_minor(20000),
            }],
            service_charge: Money::from_minor(15000),
            total_amount: Money::from_minor(55000),
            completed_at: Utc::now(),
        });
        projection
            .apply_envelope(&envelope(garage_id, job_card_id, 2, &completed))
            .unwrap();

        assert!(projection.list_pending(garage_id).is_empty());
        let rm = projection.get(garage_id, &job_card_id).unwrap();
        assert_eq!(rm.status, JobCardStatus::Completed);
        assert_eq!(rm.total_amount, Some(Money::from_minor(55000)));
    }
}
