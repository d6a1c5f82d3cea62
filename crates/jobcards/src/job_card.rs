use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use garagekit_core::{Aggregate, AggregateId, AggregateRoot, DomainError, GarageId, Money};
use garagekit_customers::CustomerId;
use garagekit_events::Event;
use garagekit_inventory::SparePartId;

/// Job card identifier (garage-scoped via `garage_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobCardId(pub AggregateId);

impl JobCardId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for JobCardId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Job card status lifecycle: `pending` → `completed`, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobCardStatus {
    Pending,
    Completed,
}

/// A named add-on charge on top of the base service charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAddon {
    pub label: String,
    pub amount: Money,
}

/// Service charge input: base plus optional add-ons (water wash, fuel, ...).
///
/// Resolved to a single amount when the command is handled; only the
/// resolved number is stored on the job card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCharge {
    pub base: Money,
    pub addons: Vec<ServiceAddon>,
}

impl ServiceCharge {
    pub fn flat(base: Money) -> Self {
        Self {
            base,
            addons: Vec::new(),
        }
    }

    /// Resolve to one amount, validating every component is non-negative.
    pub fn resolve(&self) -> Result<Money, DomainError> {
        if self.base.is_negative() {
            return Err(DomainError::validation("service charge cannot be negative"));
        }
        let mut total = self.base;
        for addon in &self.addons {
            if addon.amount.is_negative() {
                return Err(DomainError::validation(format!(
                    "service add-on '{}' cannot be negative",
                    addon.label
                )));
            }
            total = total.checked_add(addon.amount)?;
        }
        Ok(total)
    }
}

/// A part requested on a pending job card. No price: pending estimates use
/// live catalogue prices, which are not frozen until completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedPart {
    pub part_id: SparePartId,
    pub part_number: String,
    pub name: String,
    pub quantity: i64,
}

/// A frozen snapshot line: quantity and the selling price captured at stock
/// reservation time. Immutable once the job card is completed; later
/// catalogue edits must not reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartLine {
    pub part_id: SparePartId,
    pub part_number: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
}

impl PartLine {
    pub fn line_total(&self) -> Result<Money, DomainError> {
        self.unit_price.checked_mul_qty(self.quantity)
    }
}

/// Aggregate root: JobCard.
///
/// The snapshot-vs-live pricing duality is modeled as two read paths:
/// [`JobCard::estimate`] prices requested parts with live prices while
/// pending, and [`JobCard::finalized_total`] exposes the frozen total after
/// completion. There is no shared mutable total a pending edit could
/// accidentally overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCard {
    id: JobCardId,
    garage_id: Option<GarageId>,
    customer_id: Option<CustomerId>,
    description: String,
    service_charge: Money,
    requested_parts: Vec<RequestedPart>,
    status: JobCardStatus,
    frozen_lines: Vec<PartLine>,
    total_amount: Option<Money>,
    created_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl JobCard {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: JobCardId) -> Self {
        Self {
            id,
            garage_id: None,
            customer_id: None,
            description: String::new(),
            service_charge: Money::ZERO,
            requested_parts: Vec::new(),
            status: JobCardStatus::Pending,
            frozen_lines: Vec::new(),
            total_amount: None,
            created_at: None,
            completed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> JobCardId {
        self.id
    }

    pub fn garage_id(&self) -> Option<GarageId> {
        self.garage_id
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn service_charge(&self) -> Money {
        self.service_charge
    }

    pub fn status(&self) -> JobCardStatus {
        self.status
    }

    pub fn is_pending(&self) -> bool {
        self.status == JobCardStatus::Pending
    }

    pub fn requested_parts(&self) -> &[RequestedPart] {
        &self.requested_parts
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Frozen snapshot lines; present only once completed.
    pub fn frozen_lines(&self) -> Option<&[PartLine]> {
        match self.status {
            JobCardStatus::Pending => None,
            JobCardStatus::Completed => Some(&self.frozen_lines),
        }
    }

    /// Finalized total; present only once completed.
    pub fn finalized_total(&self) -> Option<Money> {
        self.total_amount
    }

    /// Live-price estimate for a pending job card.
    ///
    /// `price_of` looks up the current selling price of a part; a missing
    /// part (deleted since the card was opened) surfaces as not found.
    pub fn estimate(
        &self,
        price_of: impl Fn(SparePartId) -> Option<Money>,
    ) -> Result<Money, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.status != JobCardStatus::Pending {
            return Err(DomainError::invalid_transition(
                "job card is completed; totals are frozen",
            ));
        }

        let mut total = self.service_charge;
        for part in &self.requested_parts {
            let price = price_of(part.part_id).ok_or(DomainError::NotFound)?;
            total = total.checked_add(price.checked_mul_qty(part.quantity)?)?;
        }
        Ok(total)
    }
}

/// Command: OpenJobCard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenJobCard {
    pub garage_id: GarageId,
    pub job_card_id: JobCardId,
    pub customer_id: CustomerId,
    pub description: String,
    pub service_charge: ServiceCharge,
    pub requested_parts: Vec<RequestedPart>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateJobCard (allowed only while pending).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateJobCard {
    pub garage_id: GarageId,
    pub job_card_id: JobCardId,
    pub description: Option<String>,
    pub service_charge: Option<ServiceCharge>,
    pub requested_parts: Option<Vec<RequestedPart>>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteJobCard.
///
/// `lines` are the snapshot lines returned by stock reservation; the
/// aggregate recomputes the final total itself so there is a single source
/// of truth for the arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteJobCard {
    pub garage_id: GarageId,
    pub job_card_id: JobCardId,
    pub lines: Vec<PartLine>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobCardCommand {
    OpenJobCard(OpenJobCard),
    UpdateJobCard(UpdateJobCard),
    CompleteJobCard(CompleteJobCard),
}

/// Event: JobCardOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCardOpened {
    pub garage_id: GarageId,
    pub job_card_id: JobCardId,
    pub customer_id: CustomerId,
    pub description: String,
    /// Resolved service charge (base + add-ons).
    pub service_charge: Money,
    pub requested_parts: Vec<RequestedPart>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: JobCardUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCardUpdated {
    pub garage_id: GarageId,
    pub job_card_id: JobCardId,
    pub description: String,
    pub service_charge: Money,
    pub requested_parts: Vec<RequestedPart>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: JobCardCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCardCompleted {
    pub garage_id: GarageId,
    pub job_card_id: JobCardId,
    pub customer_id: CustomerId,
    pub lines: Vec<PartLine>,
    pub service_charge: Money,
    pub total_amount: Money,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobCardEvent {
    JobCardOpened(JobCardOpened),
    JobCardUpdated(JobCardUpdated),
    JobCardCompleted(JobCardCompleted),
}

impl Event for JobCardEvent {
    fn event_type(&self) -> &'static str {
        match self {
            JobCardEvent::JobCardOpened(_) => "jobcards.job_card.opened",
            JobCardEvent::JobCardUpdated(_) => "jobcards.job_card.updated",
            JobCardEvent::JobCardCompleted(_) => "jobcards.job_card.completed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            JobCardEvent::JobCardOpened(e) => e.occurred_at,
            JobCardEvent::JobCardUpdated(e) => e.occurred_at,
            JobCardEvent::JobCardCompleted(e) => e.completed_at,
        }
    }
}

impl AggregateRoot for JobCard {
    type Id = JobCardId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for JobCard {
    type Command = JobCardCommand;
    type Event = JobCardEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            JobCardEvent::JobCardOpened(e) => {
                self.id = e.job_card_id;
                self.garage_id = Some(e.garage_id);
                self.customer_id = Some(e.customer_id);
                self.description = e.description.clone();
                self.service_charge = e.service_charge;
                self.requested_parts = e.requested_parts.clone();
                self.status = JobCardStatus::Pending;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            JobCardEvent::JobCardUpdated(e) => {
                self.description = e.description.clone();
                self.service_charge = e.service_charge;
                self.requested_parts = e.requested_parts.clone();
            }
            JobCardEvent::JobCardCompleted(e) => {
                self.status = JobCardStatus::Completed;
                self.frozen_lines = e.lines.clone();
                self.total_amount = Some(e.total_amount);
                self.completed_at = Some(e.completed_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            JobCardCommand::OpenJobCard(cmd) => self.handle_open(cmd),
            JobCardCommand::UpdateJobCard(cmd) => self.handle_update(cmd),
            JobCardCommand::CompleteJobCard(cmd) => self.handle_complete(cmd),
        }
    }
}

impl JobCard {
    fn ensure_garage(&self, garage_id: GarageId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.garage_id != Some(garage_id) {
            return Err(DomainError::invariant("garage mismatch"));
        }
        Ok(())
    }

    fn ensure_job_card_id(&self, job_card_id: JobCardId) -> Result<(), DomainError> {
        if self.id != job_card_id {
            return Err(DomainError::invariant("job_card_id mismatch"));
        }
        Ok(())
    }

    fn validate_requested_parts(parts: &[RequestedPart]) -> Result<(), DomainError> {
        for part in parts {
            if part.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "requested quantity for part '{}' must be positive",
                    part.part_number
                )));
            }
        }
        for (i, part) in parts.iter().enumerate() {
            if parts[..i].iter().any(|p| p.part_id == part.part_id) {
                return Err(DomainError::validation(format!(
                    "part '{}' is listed more than once",
                    part.part_number
                )));
            }
        }
        Ok(())
    }

    fn compute_total(service_charge: Money, lines: &[PartLine]) -> Result<Money, DomainError> {
        let mut total = service_charge;
        for line in lines {
            total = total.checked_add(line.line_total()?)?;
        }
        Ok(total)
    }

    fn handle_open(&self, cmd: &OpenJobCard) -> Result<Vec<JobCardEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("job card already exists"));
        }
        if cmd.description.trim().is_empty() {
            return Err(DomainError::validation("description cannot be empty"));
        }
        Self::validate_requested_parts(&cmd.requested_parts)?;
        let service_charge = cmd.service_charge.resolve()?;

        Ok(vec![JobCardEvent::JobCardOpened(JobCardOpened {
            garage_id: cmd.garage_id,
            job_card_id: cmd.job_card_id,
            customer_id: cmd.customer_id,
            description: cmd.description.trim().to_string(),
            service_charge,
            requested_parts: cmd.requested_parts.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateJobCard) -> Result<Vec<JobCardEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_garage(cmd.garage_id)?;
        self.ensure_job_card_id(cmd.job_card_id)?;

        if self.status != JobCardStatus::Pending {
            return Err(DomainError::invalid_transition(
                "cannot edit a completed job card",
            ));
        }

        let description = cmd
            .description
            .clone()
            .unwrap_or_else(|| self.description.clone());
        if description.trim().is_empty() {
            return Err(DomainError::validation("description cannot be empty"));
        }

        let service_charge = match &cmd.service_charge {
            Some(charge) => charge.resolve()?,
            None => self.service_charge,
        };

        let requested_parts = cmd
            .requested_parts
            .clone()
            .unwrap_or_else(|| self.requested_parts.clone());
        Self::validate_requested_parts(&requested_parts)?;

        Ok(vec![JobCardEvent::JobCardUpdated(JobCardUpdated {
            garage_id: cmd.garage_id,
            job_card_id: cmd.job_card_id,
            description: description.trim().to_string(),
            service_charge,
            requested_parts,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteJobCard) -> Result<Vec<JobCardEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_garage(cmd.garage_id)?;
        self.ensure_job_card_id(cmd.job_card_id)?;

        if self.status != JobCardStatus::Pending {
            return Err(DomainError::invalid_transition(
                "job card is already completed",
            ));
        }

        // The snapshot must cover exactly the requested parts.
        if cmd.lines.len() != self.requested_parts.len() {
            return Err(DomainError::invariant(
                "snapshot lines do not match requested parts",
            ));
        }
        for requested in &self.requested_parts {
            let matched = cmd
                .lines
                .iter()
                .find(|l| l.part_id == requested.part_id)
                .ok_or_else(|| {
                    DomainError::invariant("snapshot lines do not match requested parts")
                })?;
            if matched.quantity != requested.quantity {
                return Err(DomainError::invariant(
                    "snapshot quantity does not match requested quantity",
                ));
            }
            if matched.unit_price.is_negative() {
                return Err(DomainError::validation("unit price cannot be negative"));
            }
        }

        let customer_id = self
            .customer_id
            .ok_or_else(|| DomainError::invariant("job card has no customer"))?;
        let total_amount = Self::compute_total(self.service_charge, &cmd.lines)?;

        Ok(vec![JobCardEvent::JobCardCompleted(JobCardCompleted {
            garage_id: cmd.garage_id,
            job_card_id: cmd.job_card_id,
            customer_id,
            lines: cmd.lines.clone(),
            service_charge: self.service_charge,
            total_amount,
            completed_at: cmd.completed_at,
        })])
    }
}
