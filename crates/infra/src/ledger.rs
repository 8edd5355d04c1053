//! Warehouse stock ledger: the only writer of [`WarehouseStock`] rows.
//!
//! Quantities never go negative. Every mutation made through
//! [`WarehouseStockLedger::apply`] is journalled as a
//! [`StockMovementRecord`] in the same transaction.
//!
//! Locking: all rows a unit touches are locked up front, in ascending
//! (warehouse, product) order, so two multi-line transitions touching the
//! same rows in a different line order can't deadlock.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use stockflow_core::{Quantity, UserId};
use stockflow_inventory::{
    StockDirection, StockKey, StockMovement, StockMovementRecord, TransferId, WarehouseStock,
};

use crate::error::ServiceError;
use crate::scoped::ScopedTransaction;
use crate::store::LockMode;

/// Provenance copied onto every journal row of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementOrigin {
    pub reference: Option<String>,
    pub transfer_id: Option<TransferId>,
    pub user_id: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Default, Copy, Clone)]
pub struct WarehouseStockLedger;

impl WarehouseStockLedger {
    pub fn new() -> Self {
        Self
    }

    /// On-hand quantity; an absent row reads as zero.
    pub fn on_hand(
        &self,
        tx: &mut ScopedTransaction<'_>,
        key: StockKey,
    ) -> Result<Quantity, ServiceError> {
        Ok(tx
            .stock(key, LockMode::Read)?
            .map(|row| row.quantity())
            .unwrap_or(Quantity::ZERO))
    }

    /// Reduce the row by `qty` under a row lock.
    ///
    /// Fails with `InsufficientStock` if the row holds less than `qty` (or
    /// does not exist). The caller is responsible for journalling; prefer
    /// [`apply`](Self::apply).
    pub fn decrement(
        &self,
        tx: &mut ScopedTransaction<'_>,
        key: StockKey,
        qty: Quantity,
        at: DateTime<Utc>,
    ) -> Result<WarehouseStock, ServiceError> {
        let mut row = match tx.stock(key, LockMode::ForUpdate)? {
            Some(row) => row,
            None => fresh_row(tx, key, at)?,
        };
        row.decrement(qty, at)?;
        tx.upsert_stock(row.clone())?;
        Ok(row)
    }

    /// Add `qty` to the row under a row lock, creating it if absent.
    ///
    /// A created row belongs to the warehouse's company, never to the caller.
    pub fn increment(
        &self,
        tx: &mut ScopedTransaction<'_>,
        key: StockKey,
        qty: Quantity,
        at: DateTime<Utc>,
    ) -> Result<WarehouseStock, ServiceError> {
        let mut row = match tx.stock(key, LockMode::ForUpdate)? {
            Some(row) => row,
            None => fresh_row(tx, key, at)?,
        };
        row.increment(qty, at)?;
        tx.upsert_stock(row.clone())?;
        Ok(row)
    }

    /// Apply `movements` in order, all-or-nothing, journalling each one.
    ///
    /// On insufficient stock the error names the offending line; nothing has
    /// been written that the coordinator won't roll back.
    pub fn apply(
        &self,
        tx: &mut ScopedTransaction<'_>,
        movements: &[StockMovement],
        origin: &MovementOrigin,
    ) -> Result<Vec<StockMovementRecord>, ServiceError> {
        let keys: BTreeSet<StockKey> = movements.iter().map(|m| m.key).collect();
        for key in &keys {
            tx.stock(*key, LockMode::ForUpdate)?;
        }

        let mut records = Vec::with_capacity(movements.len());
        for movement in movements {
            let row = match movement.direction {
                StockDirection::Decrement => self
                    .decrement(tx, movement.key, movement.quantity, origin.occurred_at)
                    .map_err(|err| match (err, movement.line_no) {
                        (ServiceError::InsufficientStock(detail), Some(line)) => {
                            ServiceError::InsufficientStock(detail.at_line(line))
                        }
                        (other, _) => other,
                    })?,
                StockDirection::Increment => {
                    self.increment(tx, movement.key, movement.quantity, origin.occurred_at)?
                }
            };

            let record = StockMovementRecord {
                id: Uuid::now_v7(),
                tenant_id: row.tenant_id,
                company_id: row.company_id,
                warehouse_id: row.warehouse_id,
                product_id: row.product_id,
                delta: movement.signed_delta(),
                balance_after: row.quantity(),
                reason: movement.reason,
                reference: origin.reference.clone(),
                transfer_id: origin.transfer_id,
                line_no: movement.line_no,
                occurred_at: origin.occurred_at,
                user_id: origin.user_id,
            };
            tx.append_movement(record.clone())?;
            records.push(record);
        }

        tracing::debug!(
            rows = keys.len(),
            movements = records.len(),
            "ledger movements applied"
        );
        Ok(records)
    }
}

/// Empty row for `key`, owned by whoever owns the warehouse.
fn fresh_row(
    tx: &mut ScopedTransaction<'_>,
    key: StockKey,
    at: DateTime<Utc>,
) -> Result<WarehouseStock, ServiceError> {
    let warehouse = tx
        .warehouse(key.warehouse_id)?
        .ok_or_else(|| ServiceError::not_found(format!("warehouse {}", key.warehouse_id)))?;
    Ok(WarehouseStock::empty(
        warehouse.tenant_id,
        warehouse.company_id,
        key,
        at,
    ))
}
