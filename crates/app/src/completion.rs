//! Job-card completion workflow.
//!
//! The one multi-aggregate operation in the system. Ordering:
//!
//! 1. validate the card is pending and every requested part has stock
//! 2. reserve stock part by part (each reserve is a conditional decrement;
//!    any failure releases what was already reserved)
//! 3. compute totals and render the invoice document from the reservation
//!    snapshot, before anything is committed on the card
//! 4. commit `CompleteJobCard`, the point of no return; a concurrent winner
//!    surfaces here and the loser compensates
//! 5. store the document, create the invoice record, record the visit on
//!    the customer, and publish the notification events
//!
//! Once step 4 lands the remaining steps must land too: the invoice id is
//! deterministic, the document store is write-once, and the only failure a
//! concurrent writer can induce is an optimistic-concurrency conflict, which
//! is retried until the step goes through.
//!
//! Stock reservation plus the optimistic stream version is what makes the
//! decrement all-or-nothing under concurrency: two completions racing for
//! the last unit serialize on the part stream, and the loser's reserve
//! fails rather than driving the quantity negative.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use garagekit_auth::Identity;
use garagekit_core::{GarageId, Money, StockShortage};
use garagekit_customers::{Customer, CustomerCommand, CustomerId, RecordCompletedJob};
use garagekit_events::{EventBus, IntegrationEvent, integration};
use garagekit_infra::documents::document_url;
use garagekit_infra::{DocumentStore, DocumentStoreError};
use garagekit_inventory::{
    InventoryCommand, InventoryEvent, ReleaseStock, ReserveStock, SparePart,
};
use garagekit_invoicing::{
    CreateInvoice, Invoice, InvoiceCommand, InvoiceDocument, InvoiceId, InvoiceTotals,
    invoice_id_for_job_card, invoice_number,
};
use garagekit_jobcards::{
    CompleteJobCard, JobCard, JobCardCommand, JobCardId, PartLine, RequestedPart,
};

use crate::errors::{AppError, AppResult};
use crate::services::{
    CUSTOMER_AGGREGATE, INVOICE_AGGREGATE, JOB_CARD_AGGREGATE, SPARE_PART_AGGREGATE, Workshop,
};

/// What the caller gets back from a successful completion.
#[derive(Debug, Clone)]
pub struct CompletionReceipt {
    pub job_card_id: JobCardId,
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub document_url: String,
    pub total_amount: Money,
    pub completed_at: DateTime<Utc>,
}

struct PreparedInvoice {
    invoice_id: InvoiceId,
    number: String,
    document: InvoiceDocument,
    bytes: Vec<u8>,
    totals: InvoiceTotals,
}

impl Workshop {
    /// Complete a job card: freeze pricing, decrement stock, cut the invoice.
    pub fn complete_job_card(
        &self,
        identity: &Identity,
        garage: Option<GarageId>,
        job_card_id: JobCardId,
    ) -> AppResult<CompletionReceipt> {
        let garage_id = identity.garage_scope(garage)?;
        let completed_at = Utc::now();

        let card = self
            .dispatcher
            .load(garage_id, job_card_id.0, |_, _| JobCard::empty(job_card_id))?;
        let customer_id = card.customer_id().ok_or(AppError::NotFound)?;
        if !card.is_pending() {
            return Err(AppError::InvalidStateTransition(
                "job card is already completed".to_string(),
            ));
        }

        // Validate everything up front so the caller sees every shortage at
        // once instead of discovering them one reserve at a time.
        self.check_availability(garage_id, card.requested_parts())?;

        let lines = self.reserve_parts(garage_id, card.requested_parts(), completed_at)?;

        // Totals and the rendered document come from the reservation snapshot
        // and must exist before the commit point; failing here still releases
        // the reservations.
        let prepared =
            match self.prepare_invoice(garage_id, &card, job_card_id, customer_id, &lines, completed_at)
            {
                Ok(prepared) => prepared,
                Err(err) => {
                    self.release_parts(garage_id, &lines);
                    return Err(err);
                }
            };

        // Commit point. A concurrent completion loses here with a stale
        // stream version and compensates.
        let commit = self.run::<JobCard>(
            garage_id,
            job_card_id.0,
            JOB_CARD_AGGREGATE,
            JobCardCommand::CompleteJobCard(CompleteJobCard {
                garage_id,
                job_card_id,
                lines: lines.clone(),
                completed_at,
            }),
            |_, _| JobCard::empty(job_card_id),
        );
        if let Err(err) = commit {
            self.release_parts(garage_id, &lines);
            // A stale stream version at the commit means somebody else won
            // the race; report what the caller would see on a fresh attempt.
            if matches!(err, AppError::Conflict(_)) {
                let reloaded = self
                    .dispatcher
                    .load(garage_id, job_card_id.0, |_, _| JobCard::empty(job_card_id));
                if matches!(reloaded, Ok(card) if !card.is_pending()) {
                    return Err(AppError::InvalidStateTransition(
                        "job card is already completed".to_string(),
                    ));
                }
            }
            return Err(err);
        }

        let total = prepared.totals.grand_total;
        let file_name = prepared.document.file_name();

        let document_url = match self.documents.put(
            garage_id,
            prepared.invoice_id,
            &file_name,
            prepared.bytes,
        ) {
            Ok(url) => url,
            Err(DocumentStoreError::AlreadyExists(url)) => url,
            Err(err) => {
                // The URL is deterministic; the invoice record must still
                // be written, pointing at where the document belongs.
                warn!(%garage_id, invoice_id = %prepared.invoice_id, error = %err, "document store rejected invoice document");
                document_url(garage_id, prepared.invoice_id, &file_name)
            }
        };

        let invoice = self.retry_conflicts(|| {
            self.run::<Invoice>(
                garage_id,
                prepared.invoice_id.0,
                INVOICE_AGGREGATE,
                InvoiceCommand::CreateInvoice(CreateInvoice {
                    garage_id,
                    invoice_id: prepared.invoice_id,
                    job_card_id,
                    customer_id,
                    invoice_number: prepared.number.clone(),
                    file_name: file_name.clone(),
                    document_url: document_url.clone(),
                    total_amount: total,
                    occurred_at: completed_at,
                }),
                |_, _| Invoice::empty(prepared.invoice_id),
            )
        });
        match invoice {
            Ok(_) | Err(AppError::DuplicateInvoice) => {}
            Err(err) => return Err(err),
        }

        // The ledger entry loses a race against concurrent profile edits of
        // the same customer, never deterministically; retry until it lands.
        let recorded = self.retry_conflicts(|| {
            self.run::<Customer>(
                garage_id,
                customer_id.0,
                CUSTOMER_AGGREGATE,
                CustomerCommand::RecordCompletedJob(RecordCompletedJob {
                    garage_id,
                    customer_id,
                    amount_charged: total,
                    visit_at: completed_at,
                }),
                |_, _| Customer::empty(customer_id),
            )
        });
        if let Err(err) = recorded {
            warn!(%garage_id, %customer_id, error = %err, "failed to record completed job on customer ledger");
        }

        self.notify(IntegrationEvent::JobCardCompleted(
            integration::JobCardCompleted {
                garage_id,
                customer_id: customer_id.0,
                job_card_id: job_card_id.0,
                total_amount: total,
                occurred_at: completed_at,
            },
        ));
        self.notify(IntegrationEvent::InvoiceCreated(integration::InvoiceCreated {
            garage_id,
            invoice_id: prepared.invoice_id.0,
            document_url: document_url.clone(),
            occurred_at: completed_at,
        }));

        info!(%garage_id, %job_card_id, invoice_id = %prepared.invoice_id, total = %total, "job card completed");

        Ok(CompletionReceipt {
            job_card_id,
            invoice_id: prepared.invoice_id,
            invoice_number: prepared.number,
            document_url,
            total_amount: total,
            completed_at,
        })
    }

    /// Retry a post-commit step for as long as it fails on an optimistic
    /// concurrency race. Every dispatch reloads fresh state, so a conflict
    /// means another writer made progress in between; the retry lands.
    fn retry_conflicts<T>(&self, mut step: impl FnMut() -> AppResult<T>) -> AppResult<T> {
        loop {
            match step() {
                Err(AppError::Conflict(_)) => continue,
                other => return other,
            }
        }
    }

    /// Check every requested part against current stock, collecting all
    /// shortages rather than stopping at the first.
    fn check_availability(
        &self,
        garage_id: GarageId,
        requested: &[RequestedPart],
    ) -> AppResult<()> {
        let mut shortages = Vec::new();
        for req in requested {
            let part = self
                .dispatcher
                .load(garage_id, req.part_id.0, |_, _| SparePart::empty(req.part_id))?;
            if part.garage_id().is_none() {
                return Err(AppError::NotFound);
            }
            if part.quantity() < req.quantity {
                shortages.push(StockShortage {
                    part_id: req.part_id.0,
                    part_number: part.part_number().to_string(),
                    requested: req.quantity,
                    available: part.quantity(),
                });
            }
        }
        if shortages.is_empty() {
            Ok(())
        } else {
            Err(AppError::InsufficientStock(shortages))
        }
    }

    /// Reserve stock for every requested part, building the snapshot lines
    /// from the reservation events (which carry the captured unit price).
    fn reserve_parts(
        &self,
        garage_id: GarageId,
        requested: &[RequestedPart],
        at: DateTime<Utc>,
    ) -> AppResult<Vec<PartLine>> {
        let mut lines: Vec<PartLine> = Vec::with_capacity(requested.len());

        for req in requested {
            // A conflict here is two reservations racing on the same part
            // stream, not a shortage; the retry re-reads the quantity and
            // either lands or reports insufficient stock.
            let reserved = self.retry_conflicts(|| {
                self.run::<SparePart>(
                    garage_id,
                    req.part_id.0,
                    SPARE_PART_AGGREGATE,
                    InventoryCommand::ReserveStock(ReserveStock {
                        garage_id,
                        part_id: req.part_id,
                        quantity: req.quantity,
                        occurred_at: at,
                    }),
                    |_, _| SparePart::empty(req.part_id),
                )
            });
            let committed = match reserved {
                Ok(committed) => committed,
                Err(err) => {
                    self.release_parts(garage_id, &lines);
                    return Err(err);
                }
            };

            let unit_price = committed.iter().find_map(|stored| {
                serde_json::from_value::<InventoryEvent>(stored.payload.clone())
                    .ok()
                    .and_then(|event| match event {
                        InventoryEvent::StockReserved(e) => Some(e.unit_price),
                        _ => None,
                    })
            });

            let line = PartLine {
                part_id: req.part_id,
                part_number: req.part_number.clone(),
                name: req.name.clone(),
                quantity: req.quantity,
                unit_price: unit_price.unwrap_or(Money::ZERO),
            };
            lines.push(line);

            if unit_price.is_none() {
                self.release_parts(garage_id, &lines);
                return Err(AppError::Internal(
                    "stock reservation produced no reservation event".to_string(),
                ));
            }
        }

        Ok(lines)
    }

    /// Release reserved stock in reverse order. Best-effort: a failed release
    /// is logged, not surfaced, so the original error stays visible.
    fn release_parts(&self, garage_id: GarageId, lines: &[PartLine]) {
        for line in lines.iter().rev() {
            let released = self.retry_conflicts(|| {
                self.run::<SparePart>(
                    garage_id,
                    line.part_id.0,
                    SPARE_PART_AGGREGATE,
                    InventoryCommand::ReleaseStock(ReleaseStock {
                        garage_id,
                        part_id: line.part_id,
                        quantity: line.quantity,
                        occurred_at: Utc::now(),
                    }),
                    |_, _| SparePart::empty(line.part_id),
                )
            });
            if let Err(err) = released {
                warn!(%garage_id, part_id = %line.part_id, error = %err, "failed to release reserved stock");
            }
        }
    }

    fn prepare_invoice(
        &self,
        garage_id: GarageId,
        card: &JobCard,
        job_card_id: JobCardId,
        customer_id: CustomerId,
        lines: &[PartLine],
        completed_at: DateTime<Utc>,
    ) -> AppResult<PreparedInvoice> {
        let garage = self.load_garage(garage_id)?;
        let profile = garage.profile();
        let customer = self
            .customers
            .get(garage_id, &customer_id)
            .ok_or(AppError::NotFound)?;

        let totals = InvoiceTotals::compute(card.service_charge(), lines)?;
        let invoice_id = invoice_id_for_job_card(job_card_id);
        let number = invoice_number(invoice_id, completed_at);

        let document = InvoiceDocument {
            garage_name: profile.name.clone(),
            garage_phone: Some(profile.phone.clone()),
            logo: profile.logo.clone(),
            invoice_number: number.clone(),
            issued_at: completed_at,
            customer_name: customer.name,
            customer_phone: customer.phone,
            bike_number: customer.bike_number,
            description: card.description().to_string(),
            lines: lines.to_vec(),
            service_charge: card.service_charge(),
            totals,
        };
        let bytes = document.render()?;

        Ok(PreparedInvoice {
            invoice_id,
            number,
            document,
            bytes,
            totals,
        })
    }

    fn notify(&self, event: IntegrationEvent) {
        // Notifications are a best-effort feed; the books are already
        // consistent by the time these go out.
        if let Err(err) = self.notifications.publish(event) {
            warn!(?err, "notification publish failed");
        }
    }
}
