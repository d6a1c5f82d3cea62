//! Projection implementations (read model builders).
//!
//! Projections consume domain events and build query-optimized read models.
//! All projections are:
//! - **Rebuildable**: Can be reconstructed from the event stream
//! - **Garage-isolated**: Data is partitioned by garage
//! - **Idempotent**: Safe for at-least-once delivery

pub mod customers;
pub mod inventory_stock;
pub mod invoices;
pub mod job_cards;
pub mod users;

pub use customers::{CustomerReadModel, CustomersProjection, CustomersProjectionError};
pub use inventory_stock::{InventoryProjectionError, InventoryStockProjection, PartReadModel};
pub use invoices::{InvoiceReadModel, InvoicesProjection};
pub use job_cards::{JobCardReadModel, JobCardsProjection, JobCardsProjectionError};
pub use users::{UserReadModel, UsersProjection};
