//! Entity trait: identity + continuity across state changes.

use crate::id::{CompanyId, TenantId};

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// Ownership of a record inside the tenant/company hierarchy.
///
/// Tenant-level records (companies) report `None` for `company_id`; every
/// transactional record reports both.
pub trait Owned {
    fn tenant_id(&self) -> TenantId;

    fn company_id(&self) -> Option<CompanyId>;
}
