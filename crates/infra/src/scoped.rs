//! Scope-enforcing wrapper around a store transaction.
//!
//! Service code never sees a raw [`StoreTransaction`]. Every read is issued
//! with the predicate derived from the caller's [`TenantScope`], every row
//! coming back is checked against the scope again (a backend that ignores
//! the predicate is caught here), and every row written must be owned by
//! the scope.

use stockflow_auth::{EntityLevel, RowPredicate, TenantScope};
use stockflow_core::{CompanyId, Owned, ProductId, TenantId, WarehouseId};
use stockflow_inventory::{
    Company, DocumentType, Product, SequenceKey, StockKey, StockMovementRecord, StockTransfer,
    TransferId, Warehouse, WarehouseStock,
};

use crate::error::ServiceError;
use crate::store::{LockMode, StoreResult, StoreTransaction};

pub struct ScopedTransaction<'a> {
    inner: Box<dyn StoreTransaction + 'a>,
    scope: &'a TenantScope,
}

impl<'a> ScopedTransaction<'a> {
    pub fn new(inner: Box<dyn StoreTransaction + 'a>, scope: &'a TenantScope) -> Self {
        Self { inner, scope }
    }

    pub fn scope(&self) -> &TenantScope {
        self.scope
    }

    /// Owner stamped on new company-level rows.
    pub fn owner(&self) -> Result<(TenantId, CompanyId), ServiceError> {
        Ok(self.scope.require_company()?)
    }

    pub fn commit(self) -> StoreResult<()> {
        self.inner.commit()
    }

    pub fn rollback(self) -> StoreResult<()> {
        self.inner.rollback()
    }

    fn predicate(&self, level: EntityLevel) -> Result<RowPredicate, ServiceError> {
        Ok(self.scope.predicate(level)?)
    }

    fn checked<R: Owned>(
        &self,
        level: EntityLevel,
        what: &str,
        row: Option<R>,
    ) -> Result<Option<R>, ServiceError> {
        match row {
            Some(r) if !self.scope.admits(level, r.tenant_id(), r.company_id()) => {
                tracing::error!(
                    row_tenant = %r.tenant_id(),
                    row_company = ?r.company_id(),
                    "{what} row returned outside of the caller's scope"
                );
                Err(ServiceError::TenantIsolation(format!(
                    "{what} row outside scope"
                )))
            }
            other => Ok(other),
        }
    }

    fn writable<R: Owned>(&self, level: EntityLevel, what: &str, row: &R) -> Result<(), ServiceError> {
        // Missing context is reported as such, not as an isolation breach.
        self.predicate(level)?;
        if self.scope.may_write(level, row.tenant_id(), row.company_id()) {
            Ok(())
        } else {
            tracing::error!(
                row_tenant = %row.tenant_id(),
                row_company = ?row.company_id(),
                pinned = ?self.scope.pinned_owner(),
                "refusing {what} write outside the caller's scope"
            );
            Err(ServiceError::TenantIsolation(format!(
                "refusing to write {what} owned by tenant {} outside scope",
                row.tenant_id()
            )))
        }
    }

    /// Whether rows owned by (`tenant_id`, `company_id`) may be written here.
    ///
    /// Reads under a pinned bypass are unrestricted, so lookups that precede
    /// a write check this before trusting what they found.
    pub fn acts_for(&self, tenant_id: TenantId, company_id: CompanyId) -> bool {
        self.scope
            .may_write(EntityLevel::Company, tenant_id, Some(company_id))
    }

    pub fn company(&mut self, id: CompanyId) -> Result<Option<Company>, ServiceError> {
        let predicate = self.predicate(EntityLevel::Tenant)?;
        let row = self.inner.load_company(&predicate, id)?;
        self.checked(EntityLevel::Tenant, "company", row)
    }

    pub fn insert_company(&mut self, company: Company) -> Result<(), ServiceError> {
        self.writable(EntityLevel::Tenant, "company", &company)?;
        Ok(self.inner.insert_company(company)?)
    }

    pub fn warehouse(&mut self, id: WarehouseId) -> Result<Option<Warehouse>, ServiceError> {
        let predicate = self.predicate(EntityLevel::Company)?;
        let row = self.inner.load_warehouse(&predicate, id)?;
        self.checked(EntityLevel::Company, "warehouse", row)
    }

    pub fn insert_warehouse(&mut self, warehouse: Warehouse) -> Result<(), ServiceError> {
        self.writable(EntityLevel::Company, "warehouse", &warehouse)?;
        Ok(self.inner.insert_warehouse(warehouse)?)
    }

    pub fn update_warehouse(&mut self, warehouse: Warehouse) -> Result<(), ServiceError> {
        self.writable(EntityLevel::Company, "warehouse", &warehouse)?;
        Ok(self.inner.update_warehouse(warehouse)?)
    }

    pub fn product(&mut self, id: ProductId) -> Result<Option<Product>, ServiceError> {
        let predicate = self.predicate(EntityLevel::Company)?;
        let row = self.inner.load_product(&predicate, id)?;
        self.checked(EntityLevel::Company, "product", row)
    }

    pub fn insert_product(&mut self, product: Product) -> Result<(), ServiceError> {
        self.writable(EntityLevel::Company, "product", &product)?;
        Ok(self.inner.insert_product(product)?)
    }

    pub fn transfer(
        &mut self,
        id: TransferId,
        mode: LockMode,
    ) -> Result<Option<StockTransfer>, ServiceError> {
        let predicate = self.predicate(EntityLevel::Company)?;
        let row = self.inner.load_transfer(&predicate, id, mode)?;
        self.checked(EntityLevel::Company, "transfer", row)
    }

    pub fn insert_transfer(&mut self, transfer: StockTransfer) -> Result<(), ServiceError> {
        self.writable(EntityLevel::Company, "transfer", &transfer)?;
        Ok(self.inner.insert_transfer(transfer)?)
    }

    pub fn update_transfer(&mut self, transfer: StockTransfer) -> Result<(), ServiceError> {
        self.writable(EntityLevel::Company, "transfer", &transfer)?;
        Ok(self.inner.update_transfer(transfer)?)
    }

    pub fn delete_transfer(&mut self, id: TransferId) -> Result<bool, ServiceError> {
        let predicate = self.predicate(EntityLevel::Company)?;
        Ok(self.inner.delete_transfer(&predicate, id)?)
    }

    pub fn transfers(&mut self) -> Result<Vec<StockTransfer>, ServiceError> {
        let predicate = self.predicate(EntityLevel::Company)?;
        let rows = self.inner.list_transfers(&predicate)?;
        let mut admitted = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(t) = self.checked(EntityLevel::Company, "transfer", Some(row))? {
                admitted.push(t);
            }
        }
        Ok(admitted)
    }

    pub fn stock(
        &mut self,
        key: StockKey,
        mode: LockMode,
    ) -> Result<Option<WarehouseStock>, ServiceError> {
        let predicate = self.predicate(EntityLevel::Company)?;
        let row = self.inner.load_stock(&predicate, key, mode)?;
        self.checked(EntityLevel::Company, "stock", row)
    }

    pub fn upsert_stock(&mut self, row: WarehouseStock) -> Result<(), ServiceError> {
        self.writable(EntityLevel::Company, "stock", &row)?;
        Ok(self.inner.upsert_stock(row)?)
    }

    pub fn append_movement(&mut self, record: StockMovementRecord) -> Result<(), ServiceError> {
        self.writable(EntityLevel::Company, "stock movement", &record)?;
        Ok(self.inner.append_movement(record)?)
    }

    pub fn movements(&mut self, key: StockKey) -> Result<Vec<StockMovementRecord>, ServiceError> {
        let predicate = self.predicate(EntityLevel::Company)?;
        let rows = self.inner.list_movements(&predicate, key)?;
        for row in &rows {
            if !self.scope.admits(EntityLevel::Company, row.tenant_id, Some(row.company_id)) {
                return Err(ServiceError::TenantIsolation(
                    "stock movement row outside scope".to_string(),
                ));
            }
        }
        Ok(rows)
    }

    /// Sequence partitions are always those of the owning company.
    fn sequence_key(&self, doc_type: DocumentType, year: i32) -> Result<SequenceKey, ServiceError> {
        let (tenant_id, company_id) = self.owner()?;
        Ok(SequenceKey {
            tenant_id,
            company_id,
            doc_type,
            year,
        })
    }

    pub fn lock_sequence(
        &mut self,
        doc_type: DocumentType,
        year: i32,
    ) -> Result<(SequenceKey, Option<u64>), ServiceError> {
        let key = self.sequence_key(doc_type, year)?;
        let last = self.inner.lock_sequence(&key)?;
        Ok((key, last))
    }

    pub fn store_sequence(&mut self, key: &SequenceKey, last_issued: u64) -> Result<(), ServiceError> {
        let (tenant_id, company_id) = self.owner()?;
        if key.tenant_id != tenant_id || key.company_id != company_id {
            return Err(ServiceError::TenantIsolation(format!(
                "refusing to advance {key} from another company"
            )));
        }
        Ok(self.inner.store_sequence(key, last_issued)?)
    }

    /// Highest sequence already used by documents of the owning company.
    pub fn max_document_sequence(
        &mut self,
        doc_type: DocumentType,
        year: i32,
    ) -> Result<Option<u64>, ServiceError> {
        let (tenant_id, company_id) = self.owner()?;
        let predicate = RowPredicate::company(tenant_id, company_id);
        Ok(self.inner.max_document_sequence(&predicate, doc_type, year)?)
    }
}
