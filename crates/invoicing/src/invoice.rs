use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use garagekit_core::{Aggregate, AggregateId, AggregateRoot, DomainError, GarageId, Money};
use garagekit_customers::CustomerId;
use garagekit_events::Event;
use garagekit_jobcards::JobCardId;

/// Namespace for deriving invoice ids from job card ids.
///
/// Stable across processes so the same job card always maps to the same
/// invoice id, which turns concurrent invoice creation into a stream
/// collision instead of a silent duplicate.
const INVOICE_ID_NAMESPACE: Uuid = Uuid::from_u128(0x8f0d_2c7a_4b1e_4d6f_9a3c_51e8_7b2d_0c44);

/// Invoice identifier (garage-scoped via `garage_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Deterministic invoice id for a job card (UUIDv5 over the job card id).
pub fn invoice_id_for_job_card(job_card_id: JobCardId) -> InvoiceId {
    let uuid = Uuid::new_v5(&INVOICE_ID_NAMESPACE, job_card_id.0.as_uuid().as_bytes());
    InvoiceId(AggregateId::from_uuid(uuid))
}

/// Aggregate root: Invoice.
///
/// Append-only record: created exactly once per job card, never edited or
/// deleted afterwards. Corrections happen upstream before completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceId,
    garage_id: Option<GarageId>,
    job_card_id: Option<JobCardId>,
    customer_id: Option<CustomerId>,
    invoice_number: String,
    file_name: String,
    document_url: String,
    total_amount: Money,
    issued_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            garage_id: None,
            job_card_id: None,
            customer_id: None,
            invoice_number: String::new(),
            file_name: String::new(),
            document_url: String::new(),
            total_amount: Money::ZERO,
            issued_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn garage_id(&self) -> Option<GarageId> {
        self.garage_id
    }

    pub fn job_card_id(&self) -> Option<JobCardId> {
        self.job_card_id
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn invoice_number(&self) -> &str {
        &self.invoice_number
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn document_url(&self) -> &str {
        &self.document_url
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn exists(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub garage_id: GarageId,
    pub invoice_id: InvoiceId,
    pub job_card_id: JobCardId,
    pub customer_id: CustomerId,
    pub invoice_number: String,
    pub file_name: String,
    pub document_url: String,
    pub total_amount: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    CreateInvoice(CreateInvoice),
}

/// Event: InvoiceCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCreated {
    pub garage_id: GarageId,
    pub invoice_id: InvoiceId,
    pub job_card_id: JobCardId,
    pub customer_id: CustomerId,
    pub invoice_number: String,
    pub file_name: String,
    pub document_url: String,
    pub total_amount: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceCreated(InvoiceCreated),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceCreated(_) => "invoicing.invoice.created",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceCreated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceCreated(e) => {
                self.id = e.invoice_id;
                self.garage_id = Some(e.garage_id);
                self.job_card_id = Some(e.job_card_id);
                self.customer_id = Some(e.customer_id);
                self.invoice_number = e.invoice_number.clone();
                self.file_name = e.file_name.clone();
                self.document_url = e.document_url.clone();
                self.total_amount = e.total_amount;
                self.issued_at = Some(e.occurred_at);
                self.created = true;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::CreateInvoice(cmd) => self.handle_create(cmd),
        }
    }
}

impl Invoice {
    fn handle_create(&self, cmd: &CreateInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::DuplicateInvoice);
        }
        if cmd.invoice_id != invoice_id_for_job_card(cmd.job_card_id) {
            return Err(DomainError::invariant(
                "invoice_id is not derived from job_card_id",
            ));
        }
        if cmd.invoice_number.trim().is_empty() {
            return Err(DomainError::validation("invoice number cannot be empty"));
        }
        if cmd.file_name.trim().is_empty() {
            return Err(DomainError::validation("file name cannot be empty"));
        }
        if cmd.document_url.trim().is_empty() {
            return Err(DomainError::validation("document url cannot be empty"));
        }
        if cmd.total_amount.is_negative() {
            return Err(DomainError::validation("invoice total cannot be negative"));
        }

        Ok(vec![InvoiceEvent::InvoiceCreated(InvoiceCreated {
            garage_id: cmd.garage_id,
            invoice_id: cmd.invoice_id,
            job_card_id: cmd.job_card_id,
            customer_id: cmd.customer_id,
            invoice_number: cmd.invoice_number.clone(),
            file_name: cmd.file_name.clone(),
            document_url: cmd.document_url.clone(),
            total_amount: cmd.total_amount,
            occurred_at: cmd.occurred_at,
        })])
    }
}
