//! Application-level error type.
//!
//! Flattens domain, dispatch, and storage failures into one surface with a
//! stable `kind()` string per variant, so callers (HTTP adapters, UIs) can map
//! errors without matching on message text.

use thiserror::Error;

use garagekit_core::{DomainError, StockShortage};
use garagekit_infra::{DispatchError, DocumentStoreError};
use garagekit_invoicing::DocumentError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("insufficient stock for {} part(s)", .0.len())]
    InsufficientStock(Vec<StockShortage>),

    #[error("an invoice already exists for this job card")]
    DuplicateInvoice,

    #[error("unauthorized")]
    Unauthorized,

    #[error("a target garage_id is required")]
    GarageIdRequired,

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable, machine-readable error discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::InvariantViolation(_) => "invariant_violation",
            AppError::InvalidStateTransition(_) => "invalid_state_transition",
            AppError::InsufficientStock(_) => "insufficient_stock",
            AppError::DuplicateInvoice => "duplicate_invoice",
            AppError::Unauthorized => "unauthorized",
            AppError::GarageIdRequired => "garage_id_required",
            AppError::NotFound => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<DomainError> for AppError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => AppError::Validation(msg),
            DomainError::InvariantViolation(msg) => AppError::InvariantViolation(msg),
            DomainError::InvalidId(msg) => AppError::Validation(msg),
            DomainError::NotFound => AppError::NotFound,
            DomainError::Conflict(msg) => AppError::Conflict(msg),
            DomainError::Unauthorized => AppError::Unauthorized,
            DomainError::InvalidStateTransition(msg) => AppError::InvalidStateTransition(msg),
            DomainError::InsufficientStock { shortages } => AppError::InsufficientStock(shortages),
            DomainError::DuplicateInvoice => AppError::DuplicateInvoice,
            DomainError::GarageIdRequired => AppError::GarageIdRequired,
        }
    }
}

impl From<DispatchError> for AppError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Concurrency(msg) => AppError::Conflict(msg),
            DispatchError::GarageIsolation(msg) => AppError::Internal(msg),
            DispatchError::Validation(msg) => AppError::Validation(msg),
            DispatchError::InvariantViolation(msg) => AppError::InvariantViolation(msg),
            DispatchError::InvalidStateTransition(msg) => AppError::InvalidStateTransition(msg),
            DispatchError::InsufficientStock(shortages) => AppError::InsufficientStock(shortages),
            DispatchError::DuplicateInvoice => AppError::DuplicateInvoice,
            DispatchError::Unauthorized => AppError::Unauthorized,
            DispatchError::GarageIdRequired => AppError::GarageIdRequired,
            DispatchError::NotFound => AppError::NotFound,
            DispatchError::Deserialize(msg) => AppError::Internal(msg),
            DispatchError::Store(e) => AppError::Internal(e.to_string()),
            DispatchError::Publish(msg) => AppError::Internal(msg),
        }
    }
}

impl From<DocumentStoreError> for AppError {
    fn from(value: DocumentStoreError) -> Self {
        match value {
            DocumentStoreError::AlreadyExists(url) => {
                AppError::Conflict(format!("document already exists at '{url}'"))
            }
            DocumentStoreError::Storage(msg) => AppError::Internal(msg),
        }
    }
}

impl From<DocumentError> for AppError {
    fn from(value: DocumentError) -> Self {
        AppError::Internal(value.to_string())
    }
}
