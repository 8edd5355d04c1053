//! `stockflow-auth` — request context and tenant/company scoping.
//!
//! This crate is intentionally decoupled from HTTP and storage: it turns the
//! context handed over by the authentication layer into row predicates that
//! the persistence layer must apply.

pub mod context;
pub mod guard;

pub use context::{Access, AuthContext};
pub use guard::{
    EntityLevel, RowPredicate, ScopeEnforcement, ScopeError, TenantScope, TenantScopeGuard,
};
