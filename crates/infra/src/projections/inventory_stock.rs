use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use garagekit_core::{AggregateId, GarageId, Money};
use garagekit_events::EventEnvelope;
use garagekit_inventory::{InventoryEvent, SparePartId, normalize_part_number};

use crate::read_model::GarageStore;

/// Queryable inventory read model: current stock and catalogue data per part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartReadModel {
    pub part_id: SparePartId,
    pub part_number: String,
    pub name: String,
    pub quantity: i64,
    pub selling_price: Money,
    pub cost_price: Money,
    pub low_stock_threshold: i64,
}

impl PartReadModel {
    pub fn is_low_stock(&self, threshold_override: Option<i64>) -> bool {
        self.quantity <= threshold_override.unwrap_or(self.low_stock_threshold)
    }
}

/// Garage+aggregate cursor to support at-least-once delivery (idempotent projection).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    garage_id: GarageId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum InventoryProjectionError {
    #[error("failed to deserialize inventory event: {0}")]
    Deserialize(String),

    #[error("garage isolation violation: {0}")]
    GarageIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Inventory stock projection.
///
/// Consumes published envelopes (JSON payloads) and maintains a garage-isolated
/// read model. Read models are disposable and rebuildable from the event stream.
#[derive(Debug)]
pub struct InventoryStockProjection<S>
where
    S: GarageStore<SparePartId, PartReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> InventoryStockProjection<S>
where
    S: GarageStore<SparePartId, PartReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// Query read model for one garage/part.
    pub fn get(&self, garage_id: GarageId, part_id: &SparePartId) -> Option<PartReadModel> {
        self.store.get(garage_id, part_id)
    }

    /// List all parts for a garage (disposable read model).
    pub fn list(&self, garage_id: GarageId) -> Vec<PartReadModel> {
        self.store.list(garage_id)
    }

    /// Look up a part by its garage-unique part number (linear scan).
    pub fn get_by_part_number(&self, garage_id: GarageId, raw: &str) -> Option<PartReadModel> {
        let normalized = normalize_part_number(raw);
        self.list(garage_id)
            .into_iter()
            .find(|p| p.part_number == normalized)
    }

    /// Parts at or below their low-stock threshold, sorted by part number.
    ///
    /// The optional override replaces every per-part threshold for this query.
    pub fn low_stock(&self, garage_id: GarageId, threshold_override: Option<i64>) -> Vec<PartReadModel> {
        let mut parts: Vec<_> = self
            .list(garage_id)
            .into_iter()
            .filter(|p| p.is_low_stock(threshold_override))
            .collect();
        parts.sort_by(|a, b| a.part_number.cmp(&b.part_number));
        parts
    }

    /// Apply a published envelope into the projection.
    ///
    /// - Enforces garage isolation
    /// - Enforces monotonic sequence per (garage, aggregate) stream
    /// - Idempotent for at-least-once delivery (replays <= cursor are ignored)
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), InventoryProjectionError> {
        if envelope.aggregate_type() != "inventory.spare_part" {
            return Ok(());
        }

        let garage_id = envelope.garage_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        // Cursor check (per garage + aggregate stream).
        if let Ok(mut cursors) = self.cursors.write() {
            let key = CursorKey {
                garage_id,
                aggregate_id,
            };
            let last = *cursors.get(&key).unwrap_or(&0);

            if seq == 0 {
                return Err(InventoryProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(InventoryProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: InventoryEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| InventoryProjectionError::Deserialize(e.to_string()))?;

            // Validate garage isolation at the event level.
            let (event_garage, part_id) = match &event {
                InventoryEvent::SparePartAdded(e) => (e.garage_id, e.part_id),
                InventoryEvent::SparePartUpdated(e) => (e.garage_id, e.part_id),
                InventoryEvent::StockAdjusted(e) => (e.garage_id, e.part_id),
                InventoryEvent::StockReserved(e) => (e.garage_id, e.part_id),
                InventoryEvent::StockReleased(e) => (e.garage_id, e.part_id),
            };

            if event_garage != garage_id {
                return Err(InventoryProjectionError::GarageIsolation(
                    "event garage_id does not match envelope garage_id".to_string(),
                ));
            }
            if part_id.0 != aggregate_id {
                return Err(InventoryProjectionError::GarageIsolation(
                    "event part_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match event {
                InventoryEvent::SparePartAdded(e) => {
                    self.store.upsert(
                        garage_id,
                        e.part_id,
                        PartReadModel {
                            part_id: e.part_id,
                            part_number: e.part_number,
                            name: e.name,
                            quantity: e.quantity,
                            selling_price: e.selling_price,
                            cost_price: e.cost_price,
                            low_stock_threshold: e.low_stock_threshold,
                        },
                    );
                }
                InventoryEvent::SparePartUpdated(e) => {
                    if let Some(mut rm) = self.store.get(garage_id, &e.part_id) {
                        rm.name = e.name;
                        rm.selling_price = e.selling_price;
                        rm.cost_price = e.cost_price;
                        rm.low_stock_threshold = e.low_stock_threshold;
                        self.store.upsert(garage_id, e.part_id, rm);
                    }
                }
                InventoryEvent::StockAdjusted(e) => {
                    if let Some(mut rm) = self.store.get(garage_id, &e.part_id) {
                        rm.quantity = e.new_quantity;
                        self.store.upsert(garage_id, e.part_id, rm);
                    }
                }
                InventoryEvent::StockReserved(e) => {
                    if let Some(mut rm) = self.store.get(garage_id, &e.part_id) {
                        rm.quantity = e.new_quantity;
                        self.store.upsert(garage_id, e.part_id, rm);
                    }
                }
                InventoryEvent::StockReleased(e) => {
                    if let Some(mut rm) = self.store.get(garage_id, &e.part_id) {
                        rm.quantity = e.new_quantity;
                        self.store.upsert(garage_id, e.part_id, rm);
                    }
                }
            }

            // Advance cursor after successful apply.
            cursors.insert(key, seq);
        }

        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), InventoryProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        // Clear read model per garage before rebuilding.
        {
            let mut garages = envs.iter().map(|e| e.garage_id()).collect::<Vec<_>>();
            garages.sort_by_key(|g| *g.as_uuid().as_bytes());
            garages.dedup();
            for g in garages {
                self.store.clear_garage(g);
            }
        }

        // Deterministic replay order: garage, aggregate, sequence.
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
