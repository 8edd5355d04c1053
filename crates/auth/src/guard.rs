//! Tenant/company scoping guard.
//!
//! Every read or write against a transactional record is filtered by a
//! [`RowPredicate`] derived from the request's [`AuthContext`]. A missing
//! predicate is a cross-tenant leak, so the guard fails closed: in strict mode
//! an operation without context is rejected instead of running unscoped.

use std::borrow::Cow;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockflow_core::{CompanyId, TenantId};

use crate::context::{Access, AuthContext};

/// What the guard does when context is missing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeEnforcement {
    /// Reject the operation with [`ScopeError::MissingTenantContext`].
    #[default]
    Strict,
    /// Log a warning and narrow to whatever context is present.
    Permissive,
}

impl FromStr for ScopeEnforcement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "permissive" => Ok(Self::Permissive),
            other => Err(format!(
                "unknown scope enforcement '{other}' (expected strict or permissive)"
            )),
        }
    }
}

/// Which ownership columns a record carries.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntityLevel {
    /// Owned by a tenant only (companies).
    Tenant,
    /// Owned by a company inside a tenant (warehouses, products, transfers, stock).
    Company,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("missing tenant context: {0} is required")]
    MissingTenantContext(&'static str),
}

/// Filter applied to every store access.
///
/// `None` means the column is not constrained. Only a system bypass or a
/// permissive guard ever produces an unconstrained tenant column.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RowPredicate {
    tenant_id: Option<TenantId>,
    company_id: Option<CompanyId>,
}

impl RowPredicate {
    pub fn tenant(tenant_id: TenantId) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            company_id: None,
        }
    }

    pub fn company(tenant_id: TenantId, company_id: CompanyId) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            company_id: Some(company_id),
        }
    }

    pub fn unrestricted() -> Self {
        Self {
            tenant_id: None,
            company_id: None,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn company_id(&self) -> Option<CompanyId> {
        self.company_id
    }

    pub fn is_unrestricted(&self) -> bool {
        self.tenant_id.is_none() && self.company_id.is_none()
    }

    /// Whether a row owned by (`tenant_id`, `company_id`) passes the filter.
    pub fn matches(&self, tenant_id: TenantId, company_id: Option<CompanyId>) -> bool {
        if let Some(t) = self.tenant_id {
            if t != tenant_id {
                return false;
            }
        }
        if let Some(c) = self.company_id {
            if company_id != Some(c) {
                return false;
            }
        }
        true
    }
}

impl core::fmt::Display for RowPredicate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match (self.tenant_id, self.company_id) {
            (Some(t), Some(c)) => write!(f, "tenant_id = {t} AND company_id = {c}"),
            (Some(t), None) => write!(f, "tenant_id = {t}"),
            (None, Some(c)) => write!(f, "company_id = {c}"),
            (None, None) => f.write_str("TRUE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScopeKind {
    Company {
        tenant_id: TenantId,
        company_id: CompanyId,
    },
    Tenant {
        tenant_id: TenantId,
    },
    System {
        pinned: Option<(TenantId, CompanyId)>,
        reason: Cow<'static, str>,
    },
    Unscoped,
}

/// Resolved scope of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope {
    kind: ScopeKind,
    enforcement: ScopeEnforcement,
}

impl TenantScope {
    /// Predicate for records of the given level.
    ///
    /// A tenant-only scope cannot read company-level records in strict mode.
    pub fn predicate(&self, level: EntityLevel) -> Result<RowPredicate, ScopeError> {
        match (&self.kind, level) {
            (ScopeKind::Company { tenant_id, .. }, EntityLevel::Tenant) => {
                Ok(RowPredicate::tenant(*tenant_id))
            }
            (
                ScopeKind::Company {
                    tenant_id,
                    company_id,
                },
                EntityLevel::Company,
            ) => Ok(RowPredicate::company(*tenant_id, *company_id)),
            (ScopeKind::Tenant { tenant_id }, EntityLevel::Tenant) => {
                Ok(RowPredicate::tenant(*tenant_id))
            }
            (ScopeKind::Tenant { tenant_id }, EntityLevel::Company) => match self.enforcement {
                ScopeEnforcement::Strict => Err(ScopeError::MissingTenantContext("company_id")),
                ScopeEnforcement::Permissive => {
                    tracing::warn!(
                        tenant_id = %tenant_id,
                        "company-level access without company_id; narrowing to tenant only"
                    );
                    Ok(RowPredicate::tenant(*tenant_id))
                }
            },
            (ScopeKind::System { .. }, _) => Ok(RowPredicate::unrestricted()),
            (ScopeKind::Unscoped, _) => Ok(RowPredicate::unrestricted()),
        }
    }

    /// Whether a record owned by (`tenant_id`, `company_id`) is visible/writable.
    pub fn admits(
        &self,
        level: EntityLevel,
        tenant_id: TenantId,
        company_id: Option<CompanyId>,
    ) -> bool {
        match self.predicate(level) {
            Ok(p) => p.matches(tenant_id, company_id),
            Err(_) => false,
        }
    }

    /// Owner stamped on newly created company-level records.
    ///
    /// Required regardless of enforcement mode: a row cannot be written
    /// without an owner, bypass or not.
    pub fn require_company(&self) -> Result<(TenantId, CompanyId), ScopeError> {
        match &self.kind {
            ScopeKind::Company {
                tenant_id,
                company_id,
            } => Ok((*tenant_id, *company_id)),
            ScopeKind::System {
                pinned: Some(pair), ..
            } => Ok(*pair),
            ScopeKind::Tenant { .. } | ScopeKind::System { pinned: None, .. } => {
                Err(ScopeError::MissingTenantContext("company_id"))
            }
            ScopeKind::Unscoped => Err(ScopeError::MissingTenantContext("tenant_id")),
        }
    }

    /// Owner stamped on newly created tenant-level records (companies).
    pub fn require_tenant(&self) -> Result<TenantId, ScopeError> {
        match &self.kind {
            ScopeKind::Company { tenant_id, .. } | ScopeKind::Tenant { tenant_id } => {
                Ok(*tenant_id)
            }
            ScopeKind::System {
                pinned: Some((tenant_id, _)),
                ..
            } => Ok(*tenant_id),
            ScopeKind::System { pinned: None, .. } | ScopeKind::Unscoped => {
                Err(ScopeError::MissingTenantContext("tenant_id"))
            }
        }
    }

    /// The single company this scope acts for, if any.
    ///
    /// A pinned system bypass reads everything but may only write rows of
    /// its pinned company; an unpinned bypass has no such pair.
    pub fn pinned_owner(&self) -> Option<(TenantId, CompanyId)> {
        match &self.kind {
            ScopeKind::Company {
                tenant_id,
                company_id,
            } => Some((*tenant_id, *company_id)),
            ScopeKind::System { pinned, .. } => *pinned,
            ScopeKind::Tenant { .. } | ScopeKind::Unscoped => None,
        }
    }

    /// Whether a write of a record owned by (`tenant_id`, `company_id`) is
    /// allowed: it must be visible and, when the scope is pinned, owned by
    /// the pinned company.
    pub fn may_write(
        &self,
        level: EntityLevel,
        tenant_id: TenantId,
        company_id: Option<CompanyId>,
    ) -> bool {
        if !self.admits(level, tenant_id, company_id) {
            return false;
        }
        match (self.pinned_owner(), level) {
            (None, _) => true,
            (Some((t, _)), EntityLevel::Tenant) => t == tenant_id,
            (Some((t, c)), EntityLevel::Company) => t == tenant_id && company_id == Some(c),
        }
    }

    pub fn is_bypass(&self) -> bool {
        matches!(self.kind, ScopeKind::System { .. })
    }

    pub fn enforcement(&self) -> ScopeEnforcement {
        self.enforcement
    }
}

/// Turns an [`AuthContext`] into a [`TenantScope`], failing closed.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TenantScopeGuard {
    enforcement: ScopeEnforcement,
}

impl TenantScopeGuard {
    pub fn new(enforcement: ScopeEnforcement) -> Self {
        Self { enforcement }
    }

    pub fn strict() -> Self {
        Self::new(ScopeEnforcement::Strict)
    }

    pub fn permissive() -> Self {
        Self::new(ScopeEnforcement::Permissive)
    }

    pub fn enforcement(&self) -> ScopeEnforcement {
        self.enforcement
    }

    pub fn scope(&self, ctx: &AuthContext) -> Result<TenantScope, ScopeError> {
        let kind = match ctx.access() {
            Access::SystemBypass { reason } => {
                let pinned = ctx.tenant_id().zip(ctx.company_id());
                tracing::info!(
                    reason = %reason,
                    pinned_company = ?pinned.map(|(_, c)| c),
                    "tenant scope bypassed by system context"
                );
                ScopeKind::System {
                    pinned,
                    reason: reason.clone(),
                }
            }
            Access::Scoped => match (ctx.tenant_id(), ctx.company_id()) {
                (Some(tenant_id), Some(company_id)) => ScopeKind::Company {
                    tenant_id,
                    company_id,
                },
                (Some(tenant_id), None) => ScopeKind::Tenant { tenant_id },
                (None, _) => match self.enforcement {
                    ScopeEnforcement::Strict => {
                        return Err(ScopeError::MissingTenantContext("tenant_id"));
                    }
                    ScopeEnforcement::Permissive => {
                        tracing::warn!("operation issued without tenant context; running unscoped");
                        ScopeKind::Unscoped
                    }
                },
            },
        };

        Ok(TenantScope {
            kind,
            enforcement: self.enforcement,
        })
    }
}
