//! Stock queries and opening balances.

use rust_decimal::Decimal;
use tracing::instrument;

use stockflow_auth::{AuthContext, TenantScopeGuard};
use stockflow_core::{Clock, DomainError, ProductId, Quantity, WarehouseId};
use stockflow_inventory::{
    MovementReason, Product, StockDirection, StockKey, StockMovement, StockMovementRecord,
    Warehouse, WarehouseStock,
};

use crate::coordinator::TransactionCoordinator;
use crate::error::ServiceError;
use crate::ledger::{MovementOrigin, WarehouseStockLedger};
use crate::scoped::ScopedTransaction;
use crate::store::{LockMode, PersistenceStore};

#[derive(Debug)]
pub struct StockService<S, C> {
    coordinator: TransactionCoordinator<S>,
    guard: TenantScopeGuard,
    ledger: WarehouseStockLedger,
    clock: C,
}

impl<S, C> StockService<S, C> {
    pub fn new(store: S, clock: C, guard: TenantScopeGuard) -> Self {
        Self {
            coordinator: TransactionCoordinator::new(store),
            guard,
            ledger: WarehouseStockLedger::new(),
            clock,
        }
    }
}

impl<S, C> StockService<S, C>
where
    S: PersistenceStore,
    C: Clock,
{
    /// Book initial stock into a warehouse.
    ///
    /// The only way quantity enters the ledger outside of a transfer; it is
    /// journalled as [`MovementReason::OpeningBalance`] with `reference`.
    #[instrument(
        skip_all,
        fields(
            tenant_id = ?ctx.tenant_id(),
            company_id = ?ctx.company_id(),
            warehouse_id = %warehouse_id,
            product_id = %product_id
        ),
        err
    )]
    pub fn post_opening_balance(
        &self,
        ctx: &AuthContext,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        quantity: Decimal,
        reference: &str,
    ) -> Result<WarehouseStock, ServiceError> {
        let quantity = Quantity::positive(quantity).map_err(|e| match e {
            DomainError::Validation(msg) => ServiceError::validation(format!("quantity: {msg}")),
            other => other.into(),
        })?;
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ServiceError::validation("reference: cannot be empty"));
        }

        let scope = self.guard.scope(ctx)?;
        let key = StockKey::new(warehouse_id, product_id);
        let origin = MovementOrigin {
            reference: Some(reference.to_string()),
            transfer_id: None,
            user_id: ctx.user_id(),
            occurred_at: self.clock.now(),
        };

        self.coordinator.execute(&scope, "post_opening_balance", |tx| {
            check_location(tx, key)?;
            let movement = StockMovement {
                key,
                direction: StockDirection::Increment,
                quantity,
                line_no: None,
                reason: MovementReason::OpeningBalance,
            };
            self.ledger.apply(tx, &[movement], &origin)?;
            tx.stock(key, LockMode::Read)?
                .ok_or_else(|| ServiceError::internal(format!("{key} vanished after increment")))
        })
    }

    /// Current on-hand quantity (zero if nothing was ever booked).
    ///
    /// The warehouse and product must be visible to the caller.
    #[instrument(
        skip_all,
        fields(
            tenant_id = ?ctx.tenant_id(),
            company_id = ?ctx.company_id(),
            warehouse_id = %warehouse_id,
            product_id = %product_id
        ),
        err
    )]
    pub fn on_hand(
        &self,
        ctx: &AuthContext,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> Result<Quantity, ServiceError> {
        let scope = self.guard.scope(ctx)?;
        let key = StockKey::new(warehouse_id, product_id);
        self.coordinator.execute(&scope, "on_hand", |tx| {
            locate(tx, key)?;
            self.ledger.on_hand(tx, key)
        })
    }

    /// Movement journal of one (warehouse, product), oldest first.
    #[instrument(
        skip_all,
        fields(
            tenant_id = ?ctx.tenant_id(),
            company_id = ?ctx.company_id(),
            warehouse_id = %warehouse_id,
            product_id = %product_id
        ),
        err
    )]
    pub fn movements(
        &self,
        ctx: &AuthContext,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> Result<Vec<StockMovementRecord>, ServiceError> {
        let scope = self.guard.scope(ctx)?;
        let key = StockKey::new(warehouse_id, product_id);
        self.coordinator.execute(&scope, "movements", |tx| {
            locate(tx, key)?;
            tx.movements(key)
        })
    }
}

/// Warehouse and product of `key`, both visible in scope and of one company.
fn locate(
    tx: &mut ScopedTransaction<'_>,
    key: StockKey,
) -> Result<(Warehouse, Product), ServiceError> {
    let warehouse = tx.warehouse(key.warehouse_id)?.ok_or_else(|| {
        ServiceError::not_found(format!("warehouse {} (warehouse_id)", key.warehouse_id))
    })?;
    let product = tx
        .product(key.product_id)?
        .filter(|p| p.tenant_id == warehouse.tenant_id && p.company_id == warehouse.company_id)
        .ok_or_else(|| ServiceError::not_found(format!("product {} (product_id)", key.product_id)))?;
    Ok((warehouse, product))
}

/// [`locate`], restricted to rows the caller may write, and both active.
fn check_location(tx: &mut ScopedTransaction<'_>, key: StockKey) -> Result<(), ServiceError> {
    let (warehouse, product) = locate(tx, key)?;
    if !tx.acts_for(warehouse.tenant_id, warehouse.company_id) {
        return Err(ServiceError::not_found(format!(
            "warehouse {} (warehouse_id)",
            key.warehouse_id
        )));
    }
    if !warehouse.active {
        return Err(ServiceError::validation(format!(
            "warehouse_id: warehouse {} is inactive",
            warehouse.code
        )));
    }
    if !product.active {
        return Err(ServiceError::validation(format!(
            "product_id: product {} is inactive",
            product.sku
        )));
    }
    Ok(())
}
