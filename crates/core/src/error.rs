//! Domain error model.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::{ProductId, WarehouseId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested action is not legal in the current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A ledger row does not hold enough stock for a decrement.
    #[error(transparent)]
    InsufficientStock(InsufficientStock),
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

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

/// Details of a rejected decrement.
///
/// `line_no` is filled in when the decrement originated from a document line,
/// so callers can point at the offending line without re-deriving it.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error(
    "insufficient stock: available {available}, required {required} \
     (warehouse {warehouse_id}, product {product_id}{})",
    line_suffix(.line_no)
)]
pub struct InsufficientStock {
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub line_no: Option<u32>,
    pub available: Decimal,
    pub required: Decimal,
}

impl InsufficientStock {
    pub fn at_line(mut self, line_no: u32) -> Self {
        self.line_no = Some(line_no);
        self
    }
}

fn line_suffix(line_no: &Option<u32>) -> String {
    match line_no {
        Some(n) => format!(", line {n}"),
        None => String::new(),
    }
}
