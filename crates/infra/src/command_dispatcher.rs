//! Command execution pipeline (application-level orchestration).
//!
//! Implements the command dispatch pattern for event-sourced aggregates:
//! load history, rehydrate, handle the command, persist the decided events,
//! publish to the bus. Garage isolation and optimistic concurrency are
//! enforced here so domain code stays pure.

use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use garagekit_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, GarageId, StockShortage};
use garagekit_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug)]
pub enum DispatchError {
    /// Optimistic concurrency failure (e.g. stale aggregate version).
    Concurrency(String),
    /// Garage isolation violation (cross-garage or cross-aggregate stream mixing).
    GarageIsolation(String),
    /// Domain validation failure (deterministic).
    Validation(String),
    /// Domain invariant failure (deterministic).
    InvariantViolation(String),
    /// The state machine rejected the transition (e.g. editing a completed job card).
    InvalidStateTransition(String),
    /// One or more requested line items exceed available stock.
    InsufficientStock(Vec<StockShortage>),
    /// An invoice already exists for the job card.
    DuplicateInvoice,
    /// Domain authorization failure.
    Unauthorized,
    /// A super-admin operation was issued without an explicit target garage.
    GarageIdRequired,
    /// Domain-level not found.
    NotFound,
    /// Failed to deserialize historical event payloads into the aggregate event type.
    Deserialize(String),
    /// Persisting to the event store failed.
    Store(EventStoreError),
    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            EventStoreError::GarageIsolation(msg) => DispatchError::GarageIsolation(msg.clone()),
            _ => DispatchError::Store(value),
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
            DomainError::InvalidStateTransition(msg) => DispatchError::InvalidStateTransition(msg),
            DomainError::InsufficientStock { shortages } => {
                DispatchError::InsufficientStock(shortages)
            }
            DomainError::DuplicateInvoice => DispatchError::DuplicateInvoice,
            DomainError::GarageIdRequired => DispatchError::GarageIdRequired,
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Sits between the application services and the infrastructure traits.
/// Generic over the store and bus so tests can run fully in memory and a
/// real backend can be swapped in without touching domain code.
///
/// Execution guarantees:
/// - events are persisted before publication (append fails, nothing is published)
/// - garage isolation and optimistic concurrency are enforced on every dispatch
/// - each command operates on a single aggregate instance
///
/// If publication fails after a successful append the error is surfaced, the
/// events stay persisted, and redelivery gives at-least-once semantics;
/// consumers must be idempotent.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
    /// Serializes append + publish so subscribers observe envelopes in
    /// global append order. Without it a racing dispatch could publish its
    /// events between this dispatch's append and its publish, and a
    /// projection would see sequence N+1 before N.
    publish_gate: Mutex<()>,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            publish_gate: Mutex::new(()),
        }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full event-sourcing pipeline.
    ///
    /// 1. Load the garage-scoped stream and validate it.
    /// 2. Rehydrate a fresh aggregate from `make_aggregate` by applying history.
    /// 3. Let the aggregate decide events (pure, no mutation).
    /// 4. Append with `ExpectedVersion::Exact(loaded version)`; a concurrent
    ///    writer in between turns this into `DispatchError::Concurrency`.
    /// 5. Publish committed events to the bus.
    ///
    /// Returns the committed `StoredEvent`s with assigned sequence numbers.
    pub fn dispatch<A>(
        &self,
        garage_id: GarageId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(GarageId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: garagekit_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history (garage-scoped)
        let history = self.store.load_stream(garage_id, aggregate_id)?;
        validate_loaded_stream(garage_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate aggregate
        let mut aggregate = make_aggregate(garage_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic)
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    garage_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let gate = self
            .publish_gate
            .lock()
            .map_err(|_| DispatchError::Publish("publish gate poisoned".to_string()))?;
        let committed = self.store.append(uncommitted, expected)?;
        tracing::debug!(
            %garage_id,
            %aggregate_id,
            aggregate_type = %aggregate_type,
            events = committed.len(),
            "committed events"
        );

        // 5) Publish committed events (after append, still under the gate)
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }
        drop(gate);

        Ok(committed)
    }

    /// Rehydrate an aggregate without dispatching a command (read path).
    pub fn load<A>(
        &self,
        garage_id: GarageId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(GarageId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(garage_id, aggregate_id)?;
        validate_loaded_stream(garage_id, aggregate_id, &history)?;

        let mut aggregate = make_aggregate(garage_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(aggregate)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    garage_id: GarageId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Enforce garage isolation even if a buggy backend returns cross-garage data.
    // Also ensure the stream is monotonically increasing by sequence number.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.garage_id != garage_id {
            return Err(DispatchError::GarageIsolation(format!(
                "loaded stream contains wrong garage_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::GarageIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
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
    // Ensure deterministic ordering.
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
