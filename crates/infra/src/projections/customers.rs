use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use garagekit_core::{AggregateId, GarageId, Money};
use garagekit_customers::{CustomerEvent, CustomerId, CustomerIdentity};
use garagekit_events::EventEnvelope;

use crate::read_model::GarageStore;

/// Queryable customer read model, including the derived visit aggregates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerReadModel {
    pub customer_id: CustomerId,
    pub name: String,
    pub phone: String,
    pub bike_number: String,
    pub notes: Option<String>,
    pub total_jobs: u64,
    pub total_spent: Money,
    pub last_visit: Option<DateTime<Utc>>,
}

impl CustomerReadModel {
    pub fn identity(&self) -> CustomerIdentity {
        CustomerIdentity::new(&self.name, &self.phone, &self.bike_number)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    garage_id: GarageId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum CustomersProjectionError {
    #[error("failed to deserialize customer event: {0}")]
    Deserialize(String),

    #[error("garage isolation violation: {0}")]
    GarageIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Customers projection.
///
/// Besides plain lookups, this is the index behind upsert-by-identity: the
/// job-card workflow asks for an existing customer with the same normalized
/// name + phone + bike number before creating a new one.
#[derive(Debug)]
pub struct CustomersProjection<S>
where
    S: GarageStore<CustomerId, CustomerReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> CustomersProjection<S>
where
    S: GarageStore<CustomerId, CustomerReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, garage_id: GarageId, customer_id: &CustomerId) -> Option<CustomerReadModel> {
        self.store.get(garage_id, customer_id)
    }

    pub fn list(&self, garage_id: GarageId) -> Vec<CustomerReadModel> {
        self.store.list(garage_id)
    }

    /// Find a customer by normalized identity (linear scan).
    pub fn get_by_identity(
        &self,
        garage_id: GarageId,
        identity: &CustomerIdentity,
    ) -> Option<CustomerReadModel> {
        self.list(garage_id)
            .into_iter()
            .find(|c| &c.identity() == identity)
    }

    /// Apply a published envelope into the projection.
    ///
    /// Same contract as the inventory projection: garage isolation, monotonic
    /// cursor per stream, duplicates ignored.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), CustomersProjectionError> {
        if envelope.aggregate_type() != "customers.customer" {
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
                return Err(CustomersProjectionError::NonMonotonicSequence { last, found: seq });
            }
            if seq <= last {
                return Ok(());
            }
            if seq != last + 1 && last != 0 {
                return Err(CustomersProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: CustomerEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| CustomersProjectionError::Deserialize(e.to_string()))?;

            let (event_garage, customer_id) = match &event {
                CustomerEvent::CustomerCreated(e) => (e.garage_id, e.customer_id),
                CustomerEvent::CustomerProfileUpdated(e) => (e.garage_id, e.customer_id),
                CustomerEvent::CompletedJobRecorded(e) => (e.garage_id, e.customer_id),
            };

            if event_garage != garage_id {
                return Err(CustomersProjectionError::GarageIsolation(
                    "event garage_id does not match envelope garage_id".to_string(),
                ));
            }
            if customer_id.0 != aggregate_id {
                return Err(CustomersProjectionError::GarageIsolation(
                    "event customer_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match event {
                CustomerEvent::CustomerCreated(e) => {
                    self.store.upsert(
                        garage_id,
                        e.customer_id,
                        CustomerReadModel {
                            customer_id: e.customer_id,
                            name: e.name,
                            phone: e.phone,
                            bike_number: e.bike_number,
                            notes: e.notes,
                            total_jobs: 0,
                            total_spent: Money::ZERO,
                            last_visit: None,
                        },
                    );
                }
                CustomerEvent::CustomerProfileUpdated(e) => {
                    if let Some(mut rm) = self.store.get(garage_id, &e.customer_id) {
                        rm.name = e.name;
                        rm.phone = e.phone;
                        rm.bike_number = e.bike_number;
                        rm.notes = e.notes;
                        self.store.upsert(garage_id, e.customer_id, rm);
                    }
                }
                CustomerEvent::CompletedJobRecorded(e) => {
                    if let Some(mut rm) = self.store.get(garage_id, &e.customer_id) {
                        rm.total_jobs = e.new_total_jobs;
                        rm.total_spent = e.new_total_spent;
                        rm.last_visit = Some(e.visit_at);
                        self.store.upsert(garage_id, e.customer_id, rm);
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
    ) -> Result<(), CustomersProjectionError> {
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

    use garagekit_customers::{CompletedJobRecorded, CustomerCreated};
    use uuid::Uuid;

    use crate::read_model::InMemoryGarageStore;

    fn envelope(
        garage_id: GarageId,
        customer_id: CustomerId,
        seq: u64,
        event: &CustomerEvent,
    ) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            garage_id,
            customer_id.0,
            "customers.customer",
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    fn created(garage_id: GarageId, customer_id: CustomerId) -> CustomerEvent {
        CustomerEvent::CustomerCreated(CustomerCreated {
            garage_id,
            customer_id,
            name: "Asif".to_string(),
            phone: "0300-1234567".to_string(),
            bike_number: "KA-01-X 991".to_string(),
            notes: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn identity_lookup_finds_existing_customer() {
        let projection = CustomersProjection::new(Arc::new(InMemoryGarageStore::new()));
        let garage_id = GarageId::new();
        let customer_id = CustomerId::new(AggregateId::new());

        projection
            .apply_envelope(&envelope(garage_id, customer_id, 1, &created(garage_id, customer_id)))
            .unwrap();

        let identity = CustomerIdentity::new(" ASIF ", "0300-1234567", "ka-01-x 991");
        let found = projection.get_by_identity(garage_id, &identity).unwrap();
        assert_eq!(found.customer_id, customer_id);

        let other = CustomerIdentity::new("Asif", "0300-1234567", "KA-01-X 992");
        assert!(projection.get_by_identity(garage_id, &other).is_none());
    }

    #[test]
    fn identity_lookup_is_garage_scoped() {
        let projection = CustomersProjection::new(Arc::new(InMemoryGarageStore::new()));
        let garage_a = GarageId::new();
        let garage_b = GarageId::new();
        let customer_id = CustomerId::new(AggregateId::new());

        projection
            .apply_envelope(&envelope(garage_a, customer_id, 1, &created(garage_a, customer_id)))
            .unwrap();

        let identity = CustomerIdentity::new("Asif", "0300-1234567", "KA-01-X 991");
        assert!(projection.get_by_identity(garage_a, &identity).is_some());
        assert!(projection.get_by_identity(garage_b, &identity).is_none());
    }

    #[test]
    fn job_record_updates_visit_aggregates() {
        let projection = CustomersProjection::new(Arc::new(InMemoryGarageStore::new()));
        let garage_id = GarageId::new();
        let customer_id = CustomerId::new(AggregateId::new());

        projection
            .apply_envelope(&envelope(garage_id, customer_id, 1, &created(garage_id, customer_id)))
            .unwrap();

        let visit = Utc::now();
        let record = CustomerEvent::CompletedJobRecorded(CompletedJobRecorded {
            garage_id,
            customer_id,
            amount_charged: Money::from_minor(55000),
            visit_at: visit,
            new_total_jobs: 1,
            new_total_spent: Money::from_minor(55000),
        });
        projection
            .apply_envelope(&envelope(garage_id, customer_id, 2, &record))
            .unwrap();

        let rm = projection.get(garage_id, &customer_id).unwrap();
        assert_eq!(rm.total_jobs, 1);
        assert_eq!(rm.total_spent, Money::from_minor(55000));
        assert_eq!(rm.last_visit, Some(visit));
    }
}
