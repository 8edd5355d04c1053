use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard};
use std::time::Duration;

use stockflow_auth::RowPredicate;
use stockflow_core::{AggregateRoot, CompanyId, Owned, ProductId, WarehouseId};
use stockflow_inventory::{
    Company, DocumentType, Product, SequenceKey, StockKey, StockMovementRecord, StockTransfer,
    TransferId, Warehouse, WarehouseStock,
};

use super::locks::{LockKey, LockManager, TxId};
use super::r#trait::{LockMode, PersistenceStore, StoreResult, StoreTransaction};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Tables {
    companies: HashMap<CompanyId, Company>,
    warehouses: HashMap<WarehouseId, Warehouse>,
    products: HashMap<ProductId, Product>,
    transfers: BTreeMap<TransferId, StockTransfer>,
    stock: BTreeMap<StockKey, WarehouseStock>,
    movements: Vec<StockMovementRecord>,
    sequences: BTreeMap<SequenceKey, u64>,
}

/// Writes buffered by one transaction until commit.
#[derive(Debug, Default)]
struct PendingWrites {
    companies: HashMap<CompanyId, Company>,
    warehouses: HashMap<WarehouseId, Warehouse>,
    products: HashMap<ProductId, Product>,
    /// `None` marks a deletion.
    transfers: BTreeMap<TransferId, Option<StockTransfer>>,
    stock: BTreeMap<StockKey, WarehouseStock>,
    movements: Vec<StockMovementRecord>,
    sequences: BTreeMap<SequenceKey, u64>,
}

/// In-memory transactional store.
///
/// Intended for tests/dev and embedded use. Isolation is read-committed:
/// uncommitted writes are invisible to other transactions, and rows read
/// with [`LockMode::ForUpdate`] are current because committers apply their
/// writes before releasing locks.
#[derive(Debug)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    locks: LockManager,
    next_tx: AtomicU64,
}

impl InMemoryStore {
    pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new() -> Self {
        Self::with_lock_timeout(Self::DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(timeout: Duration) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            locks: LockManager::new(timeout),
            next_tx: AtomicU64::new(0),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistenceStore for InMemoryStore {
    fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + '_>> {
        let id = self.next_tx.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(Box::new(InMemoryTransaction {
            store: self,
            id,
            held: Vec::new(),
            pending: PendingWrites::default(),
            finished: false,
        }))
    }
}

struct InMemoryTransaction<'a> {
    store: &'a InMemoryStore,
    id: TxId,
    held: Vec<LockKey>,
    pending: PendingWrites,
    finished: bool,
}

impl InMemoryTransaction<'_> {
    fn lock(&mut self, key: LockKey) -> StoreResult<()> {
        if self.store.locks.acquire(self.id, key)? {
            self.held.push(key);
        }
        Ok(())
    }

    fn tables(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.store.tables.read().map_err(|_| StoreError::Poisoned)
    }

    fn release(&mut self) {
        self.store.locks.release_all(self.id, &self.held);
        self.held.clear();
        self.finished = true;
    }

    fn transfer_row(&self, id: TransferId) -> StoreResult<Option<StockTransfer>> {
        if let Some(pending) = self.pending.transfers.get(&id) {
            return Ok(pending.clone());
        }
        Ok(self.tables()?.transfers.get(&id).cloned())
    }
}

/// Committed transfers overlaid with a transaction's pending writes.
fn effective_transfers<'t>(
    tables: &'t Tables,
    pending: &'t PendingWrites,
) -> impl Iterator<Item = &'t StockTransfer> {
    tables
        .transfers
        .iter()
        .filter(|(id, _)| !pending.transfers.contains_key(id))
        .map(|(_, t)| t)
        .chain(pending.transfers.values().flatten())
}

fn check_unique_numbers(tables: &Tables, pending: &PendingWrites) -> StoreResult<()> {
    for candidate in pending.transfers.values().flatten() {
        let Some(number) = candidate.number() else {
            continue;
        };
        let duplicate = effective_transfers(tables, pending).any(|other| {
            other.id() != candidate.id()
                && other.tenant_id() == candidate.tenant_id()
                && other.company_id() == candidate.company_id()
                && other.number() == Some(number)
        });
        if duplicate {
            return Err(StoreError::UniqueViolation(format!(
                "document number {number} already exists in company"
            )));
        }
    }
    Ok(())
}

fn visible<R: Owned>(predicate: &RowPredicate, row: &R) -> bool {
    predicate.matches(row.tenant_id(), row.company_id())
}

impl StoreTransaction for InMemoryTransaction<'_> {
    fn load_company(&mut self, predicate: &RowPredicate, id: CompanyId) -> StoreResult<Option<Company>> {
        let row = match self.pending.companies.get(&id) {
            Some(c) => Some(c.clone()),
            None => self.tables()?.companies.get(&id).cloned(),
        };
        Ok(row.filter(|c| visible(predicate, c)))
    }

    fn insert_company(&mut self, company: Company) -> StoreResult<()> {
        if self.tables()?.companies.contains_key(&company.id)
            || self.pending.companies.contains_key(&company.id)
        {
            return Err(StoreError::UniqueViolation(format!("company {}", company.id)));
        }
        self.pending.companies.insert(company.id, company);
        Ok(())
    }

    fn load_warehouse(
        &mut self,
        predicate: &RowPredicate,
        id: WarehouseId,
    ) -> StoreResult<Option<Warehouse>> {
        let row = match self.pending.warehouses.get(&id) {
            Some(w) => Some(w.clone()),
            None => self.tables()?.warehouses.get(&id).cloned(),
        };
        Ok(row.filter(|w| visible(predicate, w)))
    }

    fn insert_warehouse(&mut self, warehouse: Warehouse) -> StoreResult<()> {
        if self.tables()?.warehouses.contains_key(&warehouse.id)
            || self.pending.warehouses.contains_key(&warehouse.id)
        {
            return Err(StoreError::UniqueViolation(format!("warehouse {}", warehouse.id)));
        }
        self.pending.warehouses.insert(warehouse.id, warehouse);
        Ok(())
    }

    fn update_warehouse(&mut self, warehouse: Warehouse) -> StoreResult<()> {
        let exists = self.pending.warehouses.contains_key(&warehouse.id)
            || self.tables()?.warehouses.contains_key(&warehouse.id);
        if !exists {
            return Err(StoreError::TenantIsolation(format!(
                "update of missing warehouse {}",
                warehouse.id
            )));
        }
        self.pending.warehouses.insert(warehouse.id, warehouse);
        Ok(())
    }

    fn load_product(&mut self, predicate: &RowPredicate, id: ProductId) -> StoreResult<Option<Product>> {
        let row = match self.pending.products.get(&id) {
            Some(p) => Some(p.clone()),
            None => self.tables()?.products.get(&id).cloned(),
        };
        Ok(row.filter(|p| visible(predicate, p)))
    }

    fn insert_product(&mut self, product: Product) -> StoreResult<()> {
        if self.tables()?.products.contains_key(&product.id)
            || self.pending.products.contains_key(&product.id)
        {
            return Err(StoreError::UniqueViolation(format!("product {}", product.id)));
        }
        self.pending.products.insert(product.id, product);
        Ok(())
    }

    fn load_transfer(
        &mut self,
        predicate: &RowPredicate,
        id: TransferId,
        mode: LockMode,
    ) -> StoreResult<Option<StockTransfer>> {
        if mode == LockMode::ForUpdate {
            self.lock(LockKey::Transfer(id))?;
        }
        Ok(self.transfer_row(id)?.filter(|t| visible(predicate, t)))
    }

    fn insert_transfer(&mut self, transfer: StockTransfer) -> StoreResult<()> {
        let id = transfer.id_typed();
        self.lock(LockKey::Transfer(id))?;
        if self.transfer_row(id)?.is_some() {
            return Err(StoreError::UniqueViolation(format!("transfer {id}")));
        }
        self.pending.transfers.insert(id, Some(transfer));

        let tables = self.store.tables.read().map_err(|_| StoreError::Poisoned)?;
        let checked = check_unique_numbers(&tables, &self.pending);
        drop(tables);
        if checked.is_err() {
            self.pending.transfers.remove(&id);
        }
        checked
    }

    fn update_transfer(&mut self, transfer: StockTransfer) -> StoreResult<()> {
        let id = transfer.id_typed();
        self.lock(LockKey::Transfer(id))?;
        if self.transfer_row(id)?.is_none() {
            return Err(StoreError::TenantIsolation(format!(
                "update of missing transfer {id}"
            )));
        }
        self.pending.transfers.insert(id, Some(transfer));
        Ok(())
    }

    fn delete_transfer(&mut self, predicate: &RowPredicate, id: TransferId) -> StoreResult<bool> {
        self.lock(LockKey::Transfer(id))?;
        match self.transfer_row(id)? {
            Some(t) if visible(predicate, &t) => {
                self.pending.transfers.insert(id, None);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn list_transfers(&mut self, predicate: &RowPredicate) -> StoreResult<Vec<StockTransfer>> {
        let tables = self.tables()?;
        let mut rows: Vec<StockTransfer> = effective_transfers(&tables, &self.pending)
            .filter(|t| visible(predicate, *t))
            .cloned()
            .collect();
        rows.sort_by_key(|t| (t.number(), t.id_typed()));
        Ok(rows)
    }

    fn load_stock(
        &mut self,
        predicate: &RowPredicate,
        key: StockKey,
        mode: LockMode,
    ) -> StoreResult<Option<WarehouseStock>> {
        if mode == LockMode::ForUpdate {
            self.lock(LockKey::Stock(key))?;
        }
        let row = match self.pending.stock.get(&key) {
            Some(row) => Some(row.clone()),
            None => self.tables()?.stock.get(&key).cloned(),
        };
        Ok(row.filter(|r| visible(predicate, r)))
    }

    fn upsert_stock(&mut self, row: WarehouseStock) -> StoreResult<()> {
        let key = row.key();
        self.lock(LockKey::Stock(key))?;
        self.pending.stock.insert(key, row);
        Ok(())
    }

    fn append_movement(&mut self, record: StockMovementRecord) -> StoreResult<()> {
        self.pending.movements.push(record);
        Ok(())
    }

    fn list_movements(
        &mut self,
        predicate: &RowPredicate,
        key: StockKey,
    ) -> StoreResult<Vec<StockMovementRecord>> {
        let tables = self.tables()?;
        Ok(tables
            .movements
            .iter()
            .chain(self.pending.movements.iter())
            .filter(|m| m.key() == key && visible(predicate, *m))
            .cloned()
            .collect())
    }

    fn lock_sequence(&mut self, key: &SequenceKey) -> StoreResult<Option<u64>> {
        self.lock(LockKey::Sequence(*key))?;
        if let Some(last) = self.pending.sequences.get(key) {
            return Ok(Some(*last));
        }
        Ok(self.tables()?.sequences.get(key).copied())
    }

    fn store_sequence(&mut self, key: &SequenceKey, last_issued: u64) -> StoreResult<()> {
        self.lock(LockKey::Sequence(*key))?;
        self.pending.sequences.insert(*key, last_issued);
        Ok(())
    }

    fn max_document_sequence(
        &mut self,
        predicate: &RowPredicate,
        doc_type: DocumentType,
        year: i32,
    ) -> StoreResult<Option<u64>> {
        let tables = self.tables()?;
        Ok(effective_transfers(&tables, &self.pending)
            .filter(|t| visible(predicate, *t))
            .filter_map(|t| t.number())
            .filter(|n| n.belongs_to(doc_type, year))
            .map(|n| n.sequence())
            .max())
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        let pending = std::mem::take(&mut self.pending);
        {
            let mut tables = self.store.tables.write().map_err(|_| StoreError::Poisoned)?;
            check_unique_numbers(&tables, &pending)?;

            tables.companies.extend(pending.companies);
            tables.warehouses.extend(pending.warehouses);
            tables.products.extend(pending.products);
            for (id, row) in pending.transfers {
                match row {
                    Some(t) => {
                        tables.transfers.insert(id, t);
                    }
                    None => {
                        tables.transfers.remove(&id);
                    }
                }
            }
            tables.stock.extend(pending.stock);
            tables.movements.extend(pending.movements);
            tables.sequences.extend(pending.sequences);
        }
        // Locks go only after the writes are visible.
        self.release();
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> StoreResult<()> {
        self.pending = PendingWrites::default();
        self.release();
        Ok(())
    }
}

impl Drop for InMemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(tx = self.id, "transaction dropped without commit; rolling back");
            self.release();
        }
    }
}
