//! Application layer: the `Workshop` service facade.
//!
//! Ties the domain crates to the infrastructure: every operation resolves the
//! caller's garage scope, dispatches commands through the event-sourcing
//! pipeline, and keeps the read models fed from the published envelopes.

pub mod completion;
pub mod errors;
pub mod services;

pub use completion::CompletionReceipt;
pub use errors::{AppError, AppResult};
pub use services::{
    CustomerDetails, CustomerPatch, GaragePatch, JobCardPatch, NewCustomer, NewJobCard,
    NewSparePart, NewUser, PartRequest, SparePartPatch, Workshop,
};
