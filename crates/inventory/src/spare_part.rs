use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use garagekit_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, GarageId, Money, StockShortage,
};
use garagekit_events::Event;

/// Low-stock threshold applied when a part is added without an explicit one.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 5;

/// Spare part identifier (garage-scoped via `garage_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SparePartId(pub AggregateId);

impl SparePartId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SparePartId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Normalize a part number for the tenant-unique, case-insensitive comparison.
pub fn normalize_part_number(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Aggregate root: SparePart.
///
/// Quantity changes only through manual adjustments and the
/// reserve/release pair issued by job-card completion. Reservation is the
/// conditional decrement: it fails rather than letting stock go negative,
/// and the optimistic stream version turns that check into a compare-and-set
/// under concurrency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparePart {
    id: SparePartId,
    garage_id: Option<GarageId>,
    part_number: String,
    name: String,
    quantity: i64,
    selling_price: Money,
    cost_price: Money,
    low_stock_threshold: i64,
    version: u64,
    created: bool,
}

impl SparePart {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SparePartId) -> Self {
        Self {
            id,
            garage_id: None,
            part_number: String::new(),
            name: String::new(),
            quantity: 0,
            selling_price: Money::ZERO,
            cost_price: Money::ZERO,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SparePartId {
        self.id
    }

    pub fn garage_id(&self) -> Option<GarageId> {
        self.garage_id
    }

    pub fn part_number(&self) -> &str {
        &self.part_number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn selling_price(&self) -> Money {
        self.selling_price
    }

    pub fn cost_price(&self) -> Money {
        self.cost_price
    }

    pub fn low_stock_threshold(&self) -> i64 {
        self.low_stock_threshold
    }

    /// Whether this part counts as low stock, optionally against an override threshold.
    pub fn is_low_stock(&self, threshold_override: Option<i64>) -> bool {
        self.quantity <= threshold_override.unwrap_or(self.low_stock_threshold)
    }
}

impl AggregateRoot for SparePart {
    type Id = SparePartId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: AddSparePart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddSparePart {
    pub garage_id: GarageId,
    pub part_id: SparePartId,
    pub part_number: String,
    pub name: String,
    pub quantity: i64,
    pub selling_price: Money,
    pub cost_price: Money,
    pub low_stock_threshold: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateSparePart (catalogue fields; never touches quantity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSparePart {
    pub garage_id: GarageId,
    pub part_id: SparePartId,
    pub name: Option<String>,
    pub selling_price: Option<Money>,
    pub cost_price: Option<Money>,
    pub low_stock_threshold: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock (manual inventory edit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub garage_id: GarageId,
    pub part_id: SparePartId,
    pub delta: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveStock (conditional decrement for a job-card line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub garage_id: GarageId,
    pub part_id: SparePartId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseStock (compensating increment for an aborted completion).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseStock {
    pub garage_id: GarageId,
    pub part_id: SparePartId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    AddSparePart(AddSparePart),
    UpdateSparePart(UpdateSparePart),
    AdjustStock(AdjustStock),
    ReserveStock(ReserveStock),
    ReleaseStock(ReleaseStock),
}

/// Event: SparePartAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparePartAdded {
    pub garage_id: GarageId,
    pub part_id: SparePartId,
    /// Normalized (trimmed, upper-case) part number.
    pub part_number: String,
    pub name: String,
    pub quantity: i64,
    pub selling_price: Money,
    pub cost_price: Money,
    pub low_stock_threshold: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SparePartUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparePartUpdated {
    pub garage_id: GarageId,
    pub part_id: SparePartId,
    pub name: String,
    pub selling_price: Money,
    pub cost_price: Money,
    pub low_stock_threshold: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAdjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub garage_id: GarageId,
    pub part_id: SparePartId,
    pub delta: i64,
    pub new_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReserved {
    pub garage_id: GarageId,
    pub part_id: SparePartId,
    pub quantity: i64,
    /// Selling price at reservation time, the snapshot the job card freezes.
    pub unit_price: Money,
    pub new_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReleased {
    pub garage_id: GarageId,
    pub part_id: SparePartId,
    pub quantity: i64,
    pub new_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    SparePartAdded(SparePartAdded),
    SparePartUpdated(SparePartUpdated),
    StockAdjusted(StockAdjusted),
    StockReserved(StockReserved),
    StockReleased(StockReleased),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::SparePartAdded(_) => "inventory.spare_part.added",
            InventoryEvent::SparePartUpdated(_) => "inventory.spare_part.updated",
            InventoryEvent::StockAdjusted(_) => "inventory.spare_part.stock_adjusted",
            InventoryEvent::StockReserved(_) => "inventory.spare_part.stock_reserved",
            InventoryEvent::StockReleased(_) => "inventory.spare_part.stock_released",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::SparePartAdded(e) => e.occurred_at,
            InventoryEvent::SparePartUpdated(e) => e.occurred_at,
            InventoryEvent::StockAdjusted(e) => e.occurred_at,
            InventoryEvent::StockReserved(e) => e.occurred_at,
            InventoryEvent::StockReleased(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SparePart {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::SparePartAdded(e) => {
                self.id = e.part_id;
                self.garage_id = Some(e.garage_id);
                self.part_number = e.part_number.clone();
                self.name = e.name.clone();
                self.quantity = e.quantity;
                self.selling_price = e.selling_price;
                self.cost_price = e.cost_price;
                self.low_stock_threshold = e.low_stock_threshold;
                self.created = true;
            }
            InventoryEvent::SparePartUpdated(e) => {
                self.name = e.name.clone();
                self.selling_price = e.selling_price;
                self.cost_price = e.cost_price;
                self.low_stock_threshold = e.low_stock_threshold;
            }
            InventoryEvent::StockAdjusted(e) => {
                self.quantity = e.new_quantity;
            }
            InventoryEvent::StockReserved(e) => {
                self.quantity = e.new_quantity;
            }
            InventoryEvent::StockReleased(e) => {
                self.quantity = e.new_quantity;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::AddSparePart(cmd) => self.handle_add(cmd),
            InventoryCommand::UpdateSparePart(cmd) => self.handle_update(cmd),
            InventoryCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
            InventoryCommand::ReserveStock(cmd) => self.handle_reserve(cmd),
            InventoryCommand::ReleaseStock(cmd) => self.handle_release(cmd),
        }
    }
}

impl SparePart {
    fn ensure_garage(&self, garage_id: GarageId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.garage_id != Some(garage_id) {
            return Err(DomainError::invariant("garage mismatch"));
        }
        Ok(())
    }

    fn ensure_part_id(&self, part_id: SparePartId) -> Result<(), DomainError> {
        if self.id != part_id {
            return Err(DomainError::invariant("part_id mismatch"));
        }
        Ok(())
    }

    fn validate_prices(selling_price: Money, cost_price: Money) -> Result<(), DomainError> {
        if selling_price.is_negative() {
            return Err(DomainError::validation("selling price cannot be negative"));
        }
        if cost_price.is_negative() {
            return Err(DomainError::validation("cost price cannot be negative"));
        }
        Ok(())
    }

    fn handle_add(&self, cmd: &AddSparePart) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("spare part already exists"));
        }

        let part_number = normalize_part_number(&cmd.part_number);
        if part_number.is_empty() {
            return Err(DomainError::validation("part number cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.quantity < 0 {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        Self::validate_prices(cmd.selling_price, cmd.cost_price)?;

        let threshold = cmd.low_stock_threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD);
        if threshold < 0 {
            return Err(DomainError::validation("low stock threshold cannot be negative"));
        }

        Ok(vec![InventoryEvent::SparePartAdded(SparePartAdded {
            garage_id: cmd.garage_id,
            part_id: cmd.part_id,
            part_number,
            name: cmd.name.trim().to_string(),
            quantity: cmd.quantity,
            selling_price: cmd.selling_price,
            cost_price: cmd.cost_price,
            low_stock_threshold: threshold,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateSparePart) -> Result<Vec<InventoryEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_garage(cmd.garage_id)?;
        self.ensure_part_id(cmd.part_id)?;

        let name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        let selling_price = cmd.selling_price.unwrap_or(self.selling_price);
        let cost_price = cmd.cost_price.unwrap_or(self.cost_price);
        Self::validate_prices(selling_price, cost_price)?;

        let threshold = cmd.low_stock_threshold.unwrap_or(self.low_stock_threshold);
        if threshold < 0 {
            return Err(DomainError::validation("low stock threshold cannot be negative"));
        }

        Ok(vec![InventoryEvent::SparePartUpdated(SparePartUpdated {
            garage_id: cmd.garage_id,
            part_id: cmd.part_id,
            name: name.trim().to_string(),
            selling_price,
            cost_price,
            low_stock_threshold: threshold,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<InventoryEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_garage(cmd.garage_id)?;
        self.ensure_part_id(cmd.part_id)?;

        if cmd.delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }

        let new_quantity = self
            .quantity
            .checked_add(cmd.delta)
            .ok_or_else(|| DomainError::invariant("stock overflow"))?;
        if new_quantity < 0 {
            return Err(DomainError::invariant("stock cannot go negative"));
        }

        Ok(vec![InventoryEvent::StockAdjusted(StockAdjusted {
            garage_id: cmd.garage_id,
            part_id: cmd.part_id,
            delta: cmd.delta,
            new_quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve(&self, cmd: &ReserveStock) -> Result<Vec<InventoryEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_garage(cmd.garage_id)?;
        self.ensure_part_id(cmd.part_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        if cmd.quantity > self.quantity {
            return Err(DomainError::insufficient_stock(vec![StockShortage {
                part_id: self.id.0,
                part_number: self.part_number.clone(),
                requested: cmd.quantity,
                available: self.quantity,
            }]));
        }

        Ok(vec![InventoryEvent::StockReserved(StockReserved {
            garage_id: cmd.garage_id,
            part_id: cmd.part_id,
            quantity: cmd.quantity,
            unit_price: self.selling_price,
            new_quantity: self.quantity - cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseStock) -> Result<Vec<InventoryEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_garage(cmd.garage_id)?;
        self.ensure_part_id(cmd.part_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let new_quantity = self
            .quantity
            .checked_add(cmd.quantity)
            .ok_or_else(|| DomainError::invariant("stock overflow"))?;

        Ok(vec![InventoryEvent::StockReleased(StockReleased {
            garage_id: cmd.garage_id,
            part_id: cmd.part_id,
            quantity: cmd.quantity,
            new_quantity,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_garage_id() -> GarageId {
        GarageId::new()
    }

    fn test_part_id() -> SparePartId {
        SparePartId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn brake_pads(garage_id: GarageId, part_id: SparePartId, quantity: i64) -> SparePart {
        let mut part = SparePart::empty(part_id);
        let cmd = AddSparePart {
            garage_id,
            part_id,
            part_number: "brk-01".to_string(),
            name: "Brake Pads".to_string(),
            quantity,
            selling_price: Money::from_minor(20000),
            cost_price: Money::from_minor(12000),
            low_stock_threshold: None,
            occurred_at: test_time(),
        };
        let events = part.handle(&InventoryCommand::AddSparePart(cmd)).unwrap();
        part.apply(&events[0]);
        part
    }

    #[test]
    fn add_part_normalizes_part_number_and_defaults_threshold() {
        let part = brake_pads(test_garage_id(), test_part_id(), 3);
        assert_eq!(part.part_number(), "BRK-01");
        assert_eq!(part.low_stock_threshold(), DEFAULT_LOW_STOCK_THRESHOLD);
        assert_eq!(part.quantity(), 3);
    }

    #[test]
    fn reserve_snapshots_current_selling_price_and_decrements() {
        let garage_id = test_garage_id();
        let part_id = test_part_id();
        let mut part = brake_pads(garage_id, part_id, 3);

        let cmd = ReserveStock {
            garage_id,
            part_id,
            quantity: 2,
            occurred_at: test_time(),
        };
        let events = part.handle(&InventoryCommand::ReserveStock(cmd)).unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            InventoryEvent::StockReserved(e) => {
                assert_eq!(e.quantity, 2);
                assert_eq!(e.unit_price, Money::from_minor(20000));
                assert_eq!(e.new_quantity, 1);
            }
            _ => panic!("Expected StockReserved event"),
        }

        part.apply(&events[0]);
        assert_eq!(part.quantity(), 1);
    }

    #[test]
    fn reserve_more_than_stock_fails_with_shortage_details() {
        let garage_id = test_garage_id();
        let part_id = test_part_id();
        let part = brake_pads(garage_id, part_id, 3);

        let cmd = ReserveStock {
            garage_id,
            part_id,
            quantity: 5,
            occurred_at: test_time(),
        };
        let err = part.handle(&InventoryCommand::ReserveStock(cmd)).unwrap_err();
        match err {
            DomainError::InsufficientStock { shortages } => {
                assert_eq!(shortages.len(), 1);
                assert_eq!(shortages[0].part_number, "BRK-01");
                assert_eq!(shortages[0].requested, 5);
                assert_eq!(shortages[0].available, 3);
            }
            _ => panic!("Expected InsufficientStock error"),
        }

        // Decision logic is pure; stock is untouched.
        assert_eq!(part.quantity(), 3);
    }

    #[test]
    fn release_restores_reserved_quantity() {
        let garage_id = test_garage_id();
        let part_id = test_part_id();
        let mut part = brake_pads(garage_id, part_id, 3);

        let reserve = ReserveStock {
            garage_id,
            part_id,
            quantity: 2,
            occurred_at: test_time(),
        };
        let events = part.handle(&InventoryCommand::ReserveStock(reserve)).unwrap();
        part.apply(&events[0]);
        assert_eq!(part.quantity(), 1);

        let release = ReleaseStock {
            garage_id,
            part_id,
            quantity: 2,
            occurred_at: test_time(),
        };
        let events = part.handle(&InventoryCommand::ReleaseStock(release)).unwrap();
        part.apply(&events[0]);
        assert_eq!(part.quantity(), 3);
    }

    #[test]
    fn manual_adjust_cannot_take_stock_negative() {
        let garage_id = test_garage_id();
        let part_id = test_part_id();
        let part = brake_pads(garage_id, part_id, 3);

        let cmd = AdjustStock {
            garage_id,
            part_id,
            delta: -4,
            occurred_at: test_time(),
        };
        let err = part.handle(&InventoryCommand::AdjustStock(cmd)).unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("stock cannot go negative") => {}
            _ => panic!("Expected InvariantViolation for negative stock"),
        }
    }

    #[test]
    fn update_changes_price_without_touching_stock() {
        let garage_id = test_garage_id();
        let part_id = test_part_id();
        let mut part = brake_pads(garage_id, part_id, 3);

        let cmd = UpdateSparePart {
            garage_id,
            part_id,
            name: None,
            selling_price: Some(Money::from_minor(25000)),
            cost_price: None,
            low_stock_threshold: Some(2),
            occurred_at: test_time(),
        };
        let events = part.handle(&InventoryCommand::UpdateSparePart(cmd)).unwrap();
        part.apply(&events[0]);

        assert_eq!(part.selling_price(), Money::from_minor(25000));
        assert_eq!(part.quantity(), 3);
        assert_eq!(part.low_stock_threshold(), 2);
    }

    #[test]
    fn low_stock_uses_per_part_threshold_or_override() {
        let part = brake_pads(test_garage_id(), test_part_id(), 3);
        // Default threshold is 5, quantity 3.
        assert!(part.is_low_stock(None));
        assert!(!part.is_low_stock(Some(2)));
        assert!(part.is_low_stock(Some(3)));
    }

    #[test]
    fn cross_garage_command_violates_invariant() {
        let part = brake_pads(test_garage_id(), test_part_id(), 3);
        let cmd = ReserveStock {
            garage_id: test_garage_id(),
            part_id: part.id_typed(),
            quantity: 1,
            occurred_at: test_time(),
        };

        let err = part.handle(&InventoryCommand::ReserveStock(cmd)).unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("garage mismatch") => {}
            _ => panic!("Expected InvariantViolation for garage mismatch"),
        }
    }
}
