//! Master data the movement core reads but does not manage.
//!
//! Creation and editing of these records belongs to the surrounding CRUD
//! surface; the core only needs ownership and the `active` flag.

use serde::{Deserialize, Serialize};

use stockflow_core::{
    CompanyId, DomainError, DomainResult, Entity, Owned, ProductId, TenantId, WarehouseId,
};

/// Operating entity under a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub tenant_id: TenantId,
    pub name: String,
}

impl Company {
    pub fn new(tenant_id: TenantId, name: impl Into<String>) -> DomainResult<Self> {
        let name = required("name", name.into())?;
        Ok(Self {
            id: CompanyId::new(),
            tenant_id,
            name,
        })
    }
}

impl Entity for Company {
    type Id = CompanyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Owned for Company {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn company_id(&self) -> Option<CompanyId> {
        None
    }
}

/// Stock location owned by one company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub code: String,
    pub name: String,
    pub active: bool,
}

impl Warehouse {
    pub fn new(
        tenant_id: TenantId,
        company_id: CompanyId,
        code: impl Into<String>,
        name: impl Into<String>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id: WarehouseId::new(),
            tenant_id,
            company_id,
            code: required("code", code.into())?,
            name: required("name", name.into())?,
            active: true,
        })
    }

    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }
}

impl Entity for Warehouse {
    type Id = WarehouseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Owned for Warehouse {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn company_id(&self) -> Option<CompanyId> {
        Some(self.company_id)
    }
}

/// Catalog product; quantities are always expressed in `base_unit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub sku: String,
    pub name: String,
    pub base_unit: String,
    pub active: bool,
}

impl Product {
    pub fn new(
        tenant_id: TenantId,
        company_id: CompanyId,
        sku: impl Into<String>,
        name: impl Into<String>,
        base_unit: impl Into<String>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id: ProductId::new(),
            tenant_id,
            company_id,
            sku: required("sku", sku.into())?,
            name: required("name", name.into())?,
            base_unit: required("base_unit", base_unit.into())?,
            active: true,
        })
    }

    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Owned for Product {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn company_id(&self) -> Option<CompanyId> {
        Some(self.company_id)
    }
}

fn required(field: &str, value: String) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field}: cannot be empty")));
    }
    Ok(trimmed.to_string())
}
