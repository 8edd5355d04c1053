//! Registration of the master data the movement core depends on.
//!
//! Only creation is offered here; editing and browsing master data belongs to
//! the surrounding CRUD surface. Owners are always taken from the caller's
//! scope, never from input.

use stockflow_auth::{AuthContext, TenantScopeGuard};
use stockflow_core::{CompanyId, WarehouseId};
use stockflow_inventory::{Company, Product, Warehouse};

use crate::coordinator::TransactionCoordinator;
use crate::error::ServiceError;
use crate::store::PersistenceStore;

#[derive(Debug)]
pub struct MasterDataService<S> {
    coordinator: TransactionCoordinator<S>,
    guard: TenantScopeGuard,
}

impl<S> MasterDataService<S> {
    pub fn new(store: S, guard: TenantScopeGuard) -> Self {
        Self {
            coordinator: TransactionCoordinator::new(store),
            guard,
        }
    }
}

impl<S: PersistenceStore> MasterDataService<S> {
    /// Register a company under the caller's tenant.
    pub fn register_company(&self, ctx: &AuthContext, name: &str) -> Result<Company, ServiceError> {
        let scope = self.guard.scope(ctx)?;
        let tenant_id = scope.require_tenant()?;
        let company = Company::new(tenant_id, name)?;

        self.coordinator.execute(&scope, "register_company", |tx| {
            tx.insert_company(company.clone())?;
            Ok(company)
        })
    }

    pub fn company(&self, ctx: &AuthContext, id: CompanyId) -> Result<Company, ServiceError> {
        let scope = self.guard.scope(ctx)?;
        self.coordinator.execute(&scope, "company", |tx| {
            tx.company(id)?
                .ok_or_else(|| ServiceError::not_found(format!("company {id}")))
        })
    }

    /// Register a warehouse in the caller's company.
    pub fn register_warehouse(
        &self,
        ctx: &AuthContext,
        code: &str,
        name: &str,
    ) -> Result<Warehouse, ServiceError> {
        let scope = self.guard.scope(ctx)?;
        self.coordinator.execute(&scope, "register_warehouse", |tx| {
            let (tenant_id, company_id) = tx.owner()?;
            if tx.company(company_id)?.is_none() {
                return Err(ServiceError::validation(format!(
                    "company_id: company {company_id} not found"
                )));
            }
            let warehouse = Warehouse::new(tenant_id, company_id, code, name)?;
            tx.insert_warehouse(warehouse.clone())?;
            Ok(warehouse)
        })
    }

    /// Mark a warehouse inactive; it can no longer be used on new or edited transfers.
    pub fn deactivate_warehouse(
        &self,
        ctx: &AuthContext,
        id: WarehouseId,
    ) -> Result<Warehouse, ServiceError> {
        let scope = self.guard.scope(ctx)?;
        self.coordinator.execute(&scope, "deactivate_warehouse", |tx| {
            let warehouse = tx
                .warehouse(id)?
                .ok_or_else(|| ServiceError::not_found(format!("warehouse {id}")))?
                .deactivated();
            tx.update_warehouse(warehouse.clone())?;
            Ok(warehouse)
        })
    }

    /// Register a product in the caller's company.
    pub fn register_product(
        &self,
        ctx: &AuthContext,
        sku: &str,
        name: &str,
        base_unit: &str,
    ) -> Result<Product, ServiceError> {
        let scope = self.guard.scope(ctx)?;
        self.coordinator.execute(&scope, "register_product", |tx| {
            let (tenant_id, company_id) = tx.owner()?;
            if tx.company(company_id)?.is_none() {
                return Err(ServiceError::validation(format!(
                    "company_id: company {company_id} not found"
                )));
            }
            let product = Product::new(tenant_id, company_id, sku, name, base_unit)?;
            tx.insert_product(product.clone())?;
            Ok(product)
        })
    }
}
