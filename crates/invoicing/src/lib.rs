//! Invoices: immutable financial records cut from completed job cards,
//! plus the rendered invoice document.

pub mod document;
pub mod invoice;
pub mod totals;

pub use document::{CURRENCY_SYMBOL, DocumentError, InvoiceDocument, invoice_number};
pub use invoice::{
    CreateInvoice, Invoice, InvoiceCommand, InvoiceCreated, InvoiceEvent, InvoiceId,
    invoice_id_for_job_card,
};
pub use totals::InvoiceTotals;
