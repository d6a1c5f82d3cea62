//! Integration events for the notification/analytics feed.
//!
//! These are the only events meant to cross the core boundary. Downstream
//! consumers (dashboards, messaging) are read-only; nothing in the core
//! reacts to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use garagekit_core::{AggregateId, GarageId, Money};

use crate::event::Event;

/// A job card transitioned to `completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCardCompleted {
    pub garage_id: GarageId,
    pub customer_id: AggregateId,
    pub job_card_id: AggregateId,
    pub total_amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// An invoice record was created with its rendered document stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCreated {
    pub garage_id: GarageId,
    pub invoice_id: AggregateId,
    pub document_url: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrationEvent {
    JobCardCompleted(JobCardCompleted),
    InvoiceCreated(InvoiceCreated),
}

impl Event for IntegrationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            IntegrationEvent::JobCardCompleted(_) => "integration.job_card_completed",
            IntegrationEvent::InvoiceCreated(_) => "integration.invoice_created",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            IntegrationEvent::JobCardCompleted(e) => e.occurred_at,
            IntegrationEvent::InvoiceCreated(e) => e.occurred_at,
        }
    }
}
