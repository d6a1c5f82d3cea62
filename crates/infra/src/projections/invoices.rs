//! Invoices projection (financial history read model).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use garagekit_core::{GarageId, Money};
use garagekit_customers::CustomerId;
use garagekit_events::EventEnvelope;
use garagekit_invoicing::{InvoiceEvent, InvoiceId};
use garagekit_jobcards::JobCardId;

use crate::read_model::GarageStore;

/// Invoice read model for queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceReadModel {
    pub invoice_id: InvoiceId,
    pub job_card_id: JobCardId,
    pub customer_id: CustomerId,
    pub invoice_number: String,
    pub document_url: String,
    pub total_amount: Money,
    pub issued_at: DateTime<Utc>,
}

/// Projection that maintains the invoice register per garage.
///
/// Invoice streams carry exactly one event, so the full cursor machinery the
/// busier projections need buys nothing here; upserts are idempotent.
pub struct InvoicesProjection<S> {
    store: S,
}

impl<S> InvoicesProjection<S>
where
    S: GarageStore<InvoiceId, InvoiceReadModel>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<serde_json::Value>,
    ) -> Result<(), anyhow::Error> {
        if envelope.aggregate_type() != "invoicing.invoice" {
            return Ok(());
        }

        let event: InvoiceEvent = serde_json::from_value(envelope.payload().clone())?;
        let garage_id = envelope.garage_id();

        match event {
            InvoiceEvent::InvoiceCreated(e) => {
                anyhow::ensure!(
                    envelope.belongs_to(e.garage_id),
                    "event garage_id does not match envelope garage_id"
                );
                let model = InvoiceReadModel {
                    invoice_id: e.invoice_id,
                    job_card_id: e.job_card_id,
                    customer_id: e.customer_id,
                    invoice_number: e.invoice_number,
                    document_url: e.document_url,
                    total_amount: e.total_amount,
                    issued_at: e.occurred_at,
                };
                self.store.upsert(garage_id, e.invoice_id, model);
            }
        }
        Ok(())
    }

    pub fn get(&self, garage_id: GarageId, invoice_id: &InvoiceId) -> Option<InvoiceReadModel> {
        self.store.get(garage_id, invoice_id)
    }

    /// All invoices for a garage, newest first.
    pub fn list(&self, garage_id: GarageId) -> Vec<InvoiceReadModel> {
        let mut invoices = self.store.list(garage_id);
        invoices.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        invoices
    }

    /// Find the invoice cut from a job card, if any (linear scan).
    pub fn get_by_job_card(
        &self,
        garage_id: GarageId,
        job_card_id: &JobCardId,
    ) -> Option<InvoiceReadModel> {
        self.store
            .list(garage_id)
            .into_iter()
            .find(|i| &i.job_card_id == job_card_id)
    }

    /// Invoices for one customer, newest first (linear scan).
    pub fn list_for_customer(
        &self,
        garage_id: GarageId,
        customer_id: &CustomerId,
    ) -> Vec<InvoiceReadModel> {
        let mut invoices: Vec<_> = self
            .store
            .list(garage_id)
            .into_iter()
            .filter(|i| &i.customer_id == customer_id)
            .collect();
        invoices.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        invoices
    }
}
