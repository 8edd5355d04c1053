//! Error taxonomy of the movement core.
//!
//! Domain failures arrive as [`DomainError`], scoping failures as
//! [`ScopeError`], persistence failures as [`StoreError`]. Everything is
//! folded into [`ServiceError`], which callers classify through
//! [`ServiceError::kind`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockflow_auth::ScopeError;
use stockflow_core::{DomainError, InsufficientStock};

/// Failures raised by a [`PersistenceStore`](crate::store::PersistenceStore) backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A row lock could not be acquired within the configured timeout.
    #[error("lock wait timed out on {0}")]
    LockTimeout(String),

    /// A unique constraint (e.g. document number per company) was violated.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A backend returned or was asked to write a row outside the predicate.
    #[error("tenant isolation violated: {0}")]
    TenantIsolation(String),

    /// Internal synchronisation state is unusable (a holder panicked).
    #[error("store state poisoned")]
    Poisoned,

    /// The database or its driver failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Coarse classification surfaced to callers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Internal,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    InsufficientStock(InsufficientStock),

    #[error("missing tenant context: {0} is required")]
    MissingTenantContext(&'static str),

    /// A row crossed the tenant/company boundary. Always a bug, never user error.
    #[error("tenant isolation violated: {0}")]
    TenantIsolation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(_) | ServiceError::MissingTenantContext(_) => {
                ErrorKind::Validation
            }
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Conflict(_) | ServiceError::InsufficientStock(_) => ErrorKind::Conflict,
            ServiceError::TenantIsolation(_) | ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Document line that caused the failure, when known.
    pub fn line_no(&self) -> Option<u32> {
        match self {
            ServiceError::InsufficientStock(detail) => detail.line_no,
            _ => None,
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
            DomainError::NotFound(what) => Self::NotFound(what),
            DomainError::Conflict(msg) => Self::Conflict(msg),
            DomainError::InsufficientStock(detail) => Self::InsufficientStock(detail),
            DomainError::InvariantViolation(msg) => Self::Internal(msg),
        }
    }
}

impl From<ScopeError> for ServiceError {
    fn from(value: ScopeError) -> Self {
        match value {
            ScopeError::MissingTenantContext(field) => Self::MissingTenantContext(field),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::TenantIsolation(msg) => Self::TenantIsolation(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<InsufficientStock> for ServiceError {
    fn from(value: InsufficientStock) -> Self {
        Self::InsufficientStock(value)
    }
}
