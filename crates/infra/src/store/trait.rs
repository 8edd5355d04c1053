use std::sync::Arc;

use stockflow_auth::RowPredicate;
use stockflow_core::{CompanyId, ProductId, WarehouseId};
use stockflow_inventory::{
    Company, DocumentType, Product, SequenceKey, StockKey, StockMovementRecord, StockTransfer,
    TransferId, Warehouse, WarehouseStock,
};

use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// How a read participates in locking.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LockMode {
    /// Plain read of committed state (plus this transaction's own writes).
    Read,
    /// Exclusive row lock held until commit/rollback (`SELECT ... FOR UPDATE`).
    ForUpdate,
}

/// Transactional persistence boundary.
///
/// Every unit of work runs inside exactly one [`StoreTransaction`]. Backends
/// must guarantee:
/// - writes become visible to others only on `commit`
/// - `rollback` (or dropping the transaction) discards every write
/// - row locks are exclusive, held until the transaction ends, and bounded
///   by a timeout reported as [`StoreError::LockTimeout`]
/// - document numbers are unique per (tenant, company)
pub trait PersistenceStore: Send + Sync {
    fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + '_>>;
}

impl<S> PersistenceStore for Arc<S>
where
    S: PersistenceStore + ?Sized,
{
    fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + '_>> {
        (**self).begin()
    }
}

/// One open transaction.
///
/// Every read takes the [`RowPredicate`] of the caller's scope; backends
/// apply it as a filter (`WHERE tenant_id = ? AND company_id = ?`). Rows
/// that don't match are reported as absent.
pub trait StoreTransaction {
    fn load_company(&mut self, predicate: &RowPredicate, id: CompanyId) -> StoreResult<Option<Company>>;

    fn insert_company(&mut self, company: Company) -> StoreResult<()>;

    fn load_warehouse(
        &mut self,
        predicate: &RowPredicate,
        id: WarehouseId,
    ) -> StoreResult<Option<Warehouse>>;

    fn insert_warehouse(&mut self, warehouse: Warehouse) -> StoreResult<()>;

    fn update_warehouse(&mut self, warehouse: Warehouse) -> StoreResult<()>;

    fn load_product(&mut self, predicate: &RowPredicate, id: ProductId) -> StoreResult<Option<Product>>;

    fn insert_product(&mut self, product: Product) -> StoreResult<()>;

    fn load_transfer(
        &mut self,
        predicate: &RowPredicate,
        id: TransferId,
        mode: LockMode,
    ) -> StoreResult<Option<StockTransfer>>;

    /// Fails with [`StoreError::UniqueViolation`] on a duplicate document number.
    fn insert_transfer(&mut self, transfer: StockTransfer) -> StoreResult<()>;

    fn update_transfer(&mut self, transfer: StockTransfer) -> StoreResult<()>;

    /// Returns whether a row was removed.
    fn delete_transfer(&mut self, predicate: &RowPredicate, id: TransferId) -> StoreResult<bool>;

    fn list_transfers(&mut self, predicate: &RowPredicate) -> StoreResult<Vec<StockTransfer>>;

    fn load_stock(
        &mut self,
        predicate: &RowPredicate,
        key: StockKey,
        mode: LockMode,
    ) -> StoreResult<Option<WarehouseStock>>;

    fn upsert_stock(&mut self, row: WarehouseStock) -> StoreResult<()>;

    fn append_movement(&mut self, record: StockMovementRecord) -> StoreResult<()>;

    fn list_movements(
        &mut self,
        predicate: &RowPredicate,
        key: StockKey,
    ) -> StoreResult<Vec<StockMovementRecord>>;

    /// Lock the counter of `key` (whether or not it exists yet) and return its
    /// last issued sequence.
    fn lock_sequence(&mut self, key: &SequenceKey) -> StoreResult<Option<u64>>;

    fn store_sequence(&mut self, key: &SequenceKey, last_issued: u64) -> StoreResult<()>;

    /// Highest sequence among stored documents numbered `{PREFIX}-{YEAR}-…`.
    fn max_document_sequence(
        &mut self,
        predicate: &RowPredicate,
        doc_type: DocumentType,
        year: i32,
    ) -> StoreResult<Option<u64>>;

    fn commit(self: Box<Self>) -> StoreResult<()>;

    fn rollback(self: Box<Self>) -> StoreResult<()>;
}
