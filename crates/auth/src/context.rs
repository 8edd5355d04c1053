use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use stockflow_core::{CompanyId, TenantId, UserId};

/// How a request is allowed to reach tenant data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Access {
    /// Normal request: every query is predicated on the attached tenant/company.
    Scoped,
    /// Trusted system-internal job (scheduled cleanup, migrations).
    ///
    /// Never produced implicitly; the only constructors are
    /// [`AuthContext::system`] and [`AuthContext::system_for_company`].
    SystemBypass { reason: Cow<'static, str> },
}

/// Identity and tenancy context of the current request.
///
/// Supplied by the authentication layer and passed explicitly to every scoped
/// operation. Fields are optional because upstream code can (wrongly) issue an
/// operation without context; the scope guard decides what happens then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    tenant_id: Option<TenantId>,
    company_id: Option<CompanyId>,
    user_id: Option<UserId>,
    access: Access,
}

impl AuthContext {
    /// Context of a user acting within one company.
    pub fn for_company(tenant_id: TenantId, company_id: CompanyId, user_id: UserId) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            company_id: Some(company_id),
            user_id: Some(user_id),
            access: Access::Scoped,
        }
    }

    /// Context of a user acting at tenant level (no company selected).
    pub fn for_tenant(tenant_id: TenantId, user_id: UserId) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            company_id: None,
            user_id: Some(user_id),
            access: Access::Scoped,
        }
    }

    /// A context carrying no tenancy information at all.
    pub fn anonymous() -> Self {
        Self {
            tenant_id: None,
            company_id: None,
            user_id: None,
            access: Access::Scoped,
        }
    }

    /// Explicit bypass for a trusted system job. Reads are unconstrained.
    pub fn system(reason: impl Into<Cow<'static, str>>) -> Self {
        Self {
            tenant_id: None,
            company_id: None,
            user_id: None,
            access: Access::SystemBypass {
                reason: reason.into(),
            },
        }
    }

    /// Explicit bypass that still names the company it writes on behalf of.
    pub fn system_for_company(
        tenant_id: TenantId,
        company_id: CompanyId,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            company_id: Some(company_id),
            user_id: None,
            access: Access::SystemBypass {
                reason: reason.into(),
            },
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn company_id(&self) -> Option<CompanyId> {
        self.company_id
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn access(&self) -> &Access {
        &self.access
    }

    pub fn is_bypass(&self) -> bool {
        matches!(self.access, Access::SystemBypass { .. })
    }
}
