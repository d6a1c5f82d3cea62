use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use garagekit_core::{Aggregate, AggregateId, AggregateRoot, DomainError, GarageId, Money};
use garagekit_events::Event;

/// Customer identifier (garage-scoped via `garage_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub AggregateId);

impl CustomerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Normalize a free-text vehicle identifier (trimmed, upper-case).
pub fn normalize_bike_number(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Deterministic identity for upsert-by-identity customer resolution.
///
/// Two customer references resolve to the same customer iff their normalized
/// name + phone + bike number match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerIdentity {
    name: String,
    phone: String,
    bike_number: String,
}

impl CustomerIdentity {
    pub fn new(name: &str, phone: &str, bike_number: &str) -> Self {
        Self {
            name: name.trim().to_lowercase(),
            phone: phone.trim().to_string(),
            bike_number: normalize_bike_number(bike_number),
        }
    }
}

/// Aggregate root: Customer.
///
/// `total_jobs` / `total_spent` / `last_visit` are derived aggregates. They
/// change only through [`RecordCompletedJob`], which the completion workflow
/// issues exactly once per job card; profile edits cannot reach them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    id: CustomerId,
    garage_id: Option<GarageId>,
    name: String,
    phone: String,
    bike_number: String,
    notes: Option<String>,
    total_jobs: u64,
    total_spent: Money,
    last_visit: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Customer {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: CustomerId) -> Self {
        Self {
            id,
            garage_id: None,
            name: String::new(),
            phone: String::new(),
            bike_number: String::new(),
            notes: None,
            total_jobs: 0,
            total_spent: Money::ZERO,
            last_visit: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CustomerId {
        self.id
    }

    pub fn garage_id(&self) -> Option<GarageId> {
        self.garage_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn bike_number(&self) -> &str {
        &self.bike_number
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn total_jobs(&self) -> u64 {
        self.total_jobs
    }

    pub fn total_spent(&self) -> Money {
        self.total_spent
    }

    pub fn last_visit(&self) -> Option<DateTime<Utc>> {
        self.last_visit
    }

    pub fn identity(&self) -> CustomerIdentity {
        CustomerIdentity::new(&self.name, &self.phone, &self.bike_number)
    }
}

impl AggregateRoot for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateCustomer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCustomer {
    pub garage_id: GarageId,
    pub customer_id: CustomerId,
    pub name: String,
    pub phone: String,
    pub bike_number: String,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateCustomerProfile.
///
/// Restricted to non-aggregate fields by construction: there is no way to
/// express a totals/visit change through this command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCustomerProfile {
    pub garage_id: GarageId,
    pub customer_id: CustomerId,
    /// Optional new name (if None, keep existing).
    pub name: Option<String>,
    pub phone: Option<String>,
    pub bike_number: Option<String>,
    /// `Some(None)` clears the notes; `None` keeps the existing ones.
    pub notes: Option<Option<String>>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordCompletedJob (ledger side of a job-card completion).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCompletedJob {
    pub garage_id: GarageId,
    pub customer_id: CustomerId,
    pub amount_charged: Money,
    pub visit_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerCommand {
    CreateCustomer(CreateCustomer),
    UpdateCustomerProfile(UpdateCustomerProfile),
    RecordCompletedJob(RecordCompletedJob),
}

/// Event: CustomerCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerCreated {
    pub garage_id: GarageId,
    pub customer_id: CustomerId,
    pub name: String,
    pub phone: String,
    /// Normalized (trimmed, upper-case) vehicle identifier.
    pub bike_number: String,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CustomerProfileUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfileUpdated {
    pub garage_id: GarageId,
    pub customer_id: CustomerId,
    pub name: String,
    pub phone: String,
    pub bike_number: String,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CompletedJobRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedJobRecorded {
    pub garage_id: GarageId,
    pub customer_id: CustomerId,
    pub amount_charged: Money,
    pub visit_at: DateTime<Utc>,
    pub new_total_jobs: u64,
    pub new_total_spent: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerEvent {
    CustomerCreated(CustomerCreated),
    CustomerProfileUpdated(CustomerProfileUpdated),
    CompletedJobRecorded(CompletedJobRecorded),
}

impl Event for CustomerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CustomerEvent::CustomerCreated(_) => "customers.customer.created",
            CustomerEvent::CustomerProfileUpdated(_) => "customers.customer.profile_updated",
            CustomerEvent::CompletedJobRecorded(_) => "customers.customer.job_recorded",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CustomerEvent::CustomerCreated(e) => e.occurred_at,
            CustomerEvent::CustomerProfileUpdated(e) => e.occurred_at,
            CustomerEvent::CompletedJobRecorded(e) => e.visit_at,
        }
    }
}

impl Aggregate for Customer {
    type Command = CustomerCommand;
    type Event = CustomerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CustomerEvent::CustomerCreated(e) => {
                self.id = e.customer_id;
                self.garage_id = Some(e.garage_id);
                self.name = e.name.clone();
                self.phone = e.phone.clone();
                self.bike_number = e.bike_number.clone();
                self.notes = e.notes.clone();
                self.total_jobs = 0;
                self.total_spent = Money::ZERO;
                self.last_visit = None;
                self.created = true;
            }
            CustomerEvent::CustomerProfileUpdated(e) => {
                self.name = e.name.clone();
                self.phone = e.phone.clone();
                self.bike_number = e.bike_number.clone();
                self.notes = e.notes.clone();
            }
            CustomerEvent::CompletedJobRecorded(e) => {
                self.total_jobs = e.new_total_jobs;
                self.total_spent = e.new_total_spent;
                self.last_visit = Some(e.visit_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CustomerCommand::CreateCustomer(cmd) => self.handle_create(cmd),
            CustomerCommand::UpdateCustomerProfile(cmd) => self.handle_update(cmd),
            CustomerCommand::RecordCompletedJob(cmd) => self.handle_record_job(cmd),
        }
    }
}

impl Customer {
    fn ensure_garage(&self, garage_id: GarageId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.garage_id != Some(garage_id) {
            return Err(DomainError::invariant("garage mismatch"));
        }
        Ok(())
    }

    fn ensure_customer_id(&self, customer_id: CustomerId) -> Result<(), DomainError> {
        if self.id != customer_id {
            return Err(DomainError::invariant("customer_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateCustomer) -> Result<Vec<CustomerEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("customer already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.phone.trim().is_empty() {
            return Err(DomainError::validation("phone cannot be empty"));
        }
        let bike_number = normalize_bike_number(&cmd.bike_number);
        if bike_number.is_empty() {
            return Err(DomainError::validation("bike number cannot be empty"));
        }

        Ok(vec![CustomerEvent::CustomerCreated(CustomerCreated {
            garage_id: cmd.garage_id,
            customer_id: cmd.customer_id,
            name: cmd.name.trim().to_string(),
            phone: cmd.phone.trim().to_string(),
            bike_number,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateCustomerProfile) -> Result<Vec<CustomerEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_garage(cmd.garage_id)?;
        self.ensure_customer_id(cmd.customer_id)?;

        let name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        let phone = cmd.phone.clone().unwrap_or_else(|| self.phone.clone());
        if phone.trim().is_empty() {
            return Err(DomainError::validation("phone cannot be empty"));
        }
        let bike_number = match &cmd.bike_number {
            Some(raw) => {
                let normalized = normalize_bike_number(raw);
                if normalized.is_empty() {
                    return Err(DomainError::validation("bike number cannot be empty"));
                }
                normalized
            }
            None => self.bike_number.clone(),
        };
        let notes = match &cmd.notes {
            Some(new_notes) => new_notes.clone(),
            None => self.notes.clone(),
        };

        Ok(vec![CustomerEvent::CustomerProfileUpdated(CustomerProfileUpdated {
            garage_id: cmd.garage_id,
            customer_id: cmd.customer_id,
            name: name.trim().to_string(),
            phone: phone.trim().to_string(),
            bike_number,
            notes,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_job(&self, cmd: &RecordCompletedJob) -> Result<Vec<CustomerEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_garage(cmd.garage_id)?;
        self.ensure_customer_id(cmd.customer_id)?;

        if cmd.amount_charged.is_negative() {
            return Err(DomainError::validation("amount charged cannot be negative"));
        }

        let new_total_jobs = self
            .total_jobs
            .checked_add(1)
            .ok_or_else(|| DomainError::invariant("job count overflow"))?;
        let new_total_spent = self.total_spent.checked_add(cmd.amount_charged)?;

        Ok(vec![CustomerEvent::CompletedJobRecorded(CompletedJobRecorded {
            garage_id: cmd.garage_id,
            customer_id: cmd.customer_id,
            amount_charged: cmd.amount_charged,
            visit_at: cmd.visit_at,
            new_total_jobs,
            new_total_spent,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_garage_id() -> GarageId {
        GarageId::new()
    }

    fn test_customer_id() -> CustomerId {
        CustomerId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created_customer(garage_id: GarageId, customer_id: CustomerId) -> Customer {
        let mut customer = Customer::empty(customer_id);
        let cmd = CreateCustomer {
            garage_id,
            customer_id,
            name: "Asif".to_string(),
            phone: "0300-1234567".to_string(),
            bike_number: "ka-01-x 991".to_string(),
            notes: None,
            occurred_at: test_time(),
        };
        let events = customer.handle(&CustomerCommand::CreateCustomer(cmd)).unwrap();
        customer.apply(&events[0]);
        customer
    }

    #[test]
    fn create_customer_normalizes_bike_number_and_zeroes_aggregates() {
        let garage_id = test_garage_id();
        let customer_id = test_customer_id();
        let customer = created_customer(garage_id, customer_id);

        assert_eq!(customer.bike_number(), "KA-01-X 991");
        assert_eq!(customer.total_jobs(), 0);
        assert_eq!(customer.total_spent(), Money::ZERO);
        assert_eq!(customer.last_visit(), None);
    }

    #[test]
    fn identity_is_insensitive_to_case_and_whitespace() {
        let a = CustomerIdentity::new("Asif", " 0300-1234567 ", "ka-01-x 991");
        let b = CustomerIdentity::new(" ASIF ", "0300-1234567", "KA-01-X 991");
        let c = CustomerIdentity::new("Asif", "0300-1234567", "KA-01-X 992");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn profile_update_cannot_reach_derived_aggregates() {
        let garage_id = test_garage_id();
        let customer_id = test_customer_id();
        let mut customer = created_customer(garage_id, customer_id);

        let record = RecordCompletedJob {
            garage_id,
            customer_id,
            amount_charged: Money::from_minor(55000),
            visit_at: test_time(),
        };
        let events = customer
            .handle(&CustomerCommand::RecordCompletedJob(record))
            .unwrap();
        customer.apply(&events[0]);

        let update = UpdateCustomerProfile {
            garage_id,
            customer_id,
            name: Some("Asif Ali".to_string()),
            phone: None,
            bike_number: None,
            notes: Some(Some("prefers morning slots".to_string())),
            occurred_at: test_time(),
        };
        let events = customer
            .handle(&CustomerCommand::UpdateCustomerProfile(update))
            .unwrap();
        customer.apply(&events[0]);

        assert_eq!(customer.name(), "Asif Ali");
        assert_eq!(customer.total_jobs(), 1);
        assert_eq!(customer.total_spent(), Money::from_minor(55000));
    }

    #[test]
    fn record_completed_job_increments_exactly_once() {
        let garage_id = test_garage_id();
        let customer_id = test_customer_id();
        let mut customer = created_customer(garage_id, customer_id);

        let visit = test_time();
        let record = RecordCompletedJob {
            garage_id,
            customer_id,
            amount_charged: Money::from_minor(55000),
            visit_at: visit,
        };
        let events = customer
            .handle(&CustomerCommand::RecordCompletedJob(record))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            CustomerEvent::CompletedJobRecorded(e) => {
                assert_eq!(e.new_total_jobs, 1);
                assert_eq!(e.new_total_spent, Money::from_minor(55000));
                assert_eq!(e.visit_at, visit);
            }
            _ => panic!("Expected CompletedJobRecorded event"),
        }

        customer.apply(&events[0]);
        assert_eq!(customer.total_jobs(), 1);
        assert_eq!(customer.total_spent(), Money::from_minor(55000));
        assert_eq!(customer.last_visit(), Some(visit));
    }

    #[test]
    fn record_completed_job_rejects_negative_amount() {
        let garage_id = test_garage_id();
        let customer_id = test_customer_id();
        let customer = created_customer(garage_id, customer_id);

        let record = RecordCompletedJob {
            garage_id,
            customer_id,
            amount_charged: Money::from_minor(-1),
            visit_at: test_time(),
        };
        let err = customer
            .handle(&CustomerCommand::RecordCompletedJob(record))
            .unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            _ => panic!("Expected Validation error for negative amount"),
        }
    }

    #[test]
    fn record_job_on_unknown_customer_is_not_found() {
        let customer = Customer::empty(test_customer_id());
        let record = RecordCompletedJob {
            garage_id: test_garage_id(),
            customer_id: test_customer_id(),
            amount_charged: Money::from_minor(100),
            visit_at: test_time(),
        };

        let err = customer
            .handle(&CustomerCommand::RecordCompletedJob(record))
            .unwrap_err();
        match err {
            DomainError::NotFound => {}
            _ => panic!("Expected NotFound error for unknown customer"),
        }
    }
}
