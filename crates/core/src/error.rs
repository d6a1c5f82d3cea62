//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::AggregateId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// One spare-part line that could not be satisfied from stock.
///
/// Carried inside [`DomainError::InsufficientStock`] so callers can present a
/// precise remediation message per part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockShortage {
    pub part_id: AggregateId,
    pub part_number: String,
    pub requested: i64,
    pub available: i64,
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
///
/// Each variant maps to a stable machine-readable kind via [`DomainError::kind`];
/// the `Display` text is the human-readable half of the contract.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input, negative charge).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested record is absent or not visible to the caller's garage.
    ///
    /// Cross-garage absence is indistinguishable from true absence.
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller's garage does not match the record being accessed.
    #[error("unauthorized")]
    Unauthorized,

    /// A state machine was asked to make a transition it does not allow.
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// One or more requested line items exceed available stock.
    ///
    /// The whole batch is rejected; `shortages` names every offending part.
    #[error("insufficient stock for {} part(s)", shortages.len())]
    InsufficientStock { shortages: Vec<StockShortage> },

    /// An invoice already exists for the job card.
    #[error("invoice already exists for job card")]
    DuplicateInvoice,

    /// A super-admin operation was issued without an explicit target garage.
    #[error("garage id required for super admin operations")]
    GarageIdRequired,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidStateTransition(msg.into())
    }

    pub fn insufficient_stock(shortages: Vec<StockShortage>) -> Self {
        Self::InsufficientStock { shortages }
    }

    /// Stable machine-readable error kind (wire contract for callers).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::InvariantViolation(_) => "invariant_violation",
            Self::InvalidId(_) => "invalid_id",
            Self::NotFound => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Unauthorized => "authorization_error",
            Self::InvalidStateTransition(_) => "invalid_state_transition",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::DuplicateInvoice => "duplicate_invoice",
            Self::GarageIdRequired => "garage_id_required",
        }
    }
}
