//! Warehouse stock rows and the movement journal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockflow_core::{
    CompanyId, DomainError, DomainResult, InsufficientStock, Owned, ProductId, Quantity, TenantId,
    UserId, WarehouseId,
};

use crate::transfer::TransferId;

/// Ledger row identity. Ordering is (warehouse, product), which is also the
/// order rows are locked in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
}

impl StockKey {
    pub fn new(warehouse_id: WarehouseId, product_id: ProductId) -> Self {
        Self {
            warehouse_id,
            product_id,
        }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "stock(warehouse {}, product {})",
            self.warehouse_id, self.product_id
        )
    }
}

/// On-hand quantity of one product in one warehouse.
///
/// Created lazily on first receipt, never deleted (only zeroed). The quantity
/// can't go below zero: `decrement` refuses instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseStock {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    quantity: Quantity,
    pub updated_at: DateTime<Utc>,
}

impl WarehouseStock {
    pub fn empty(
        tenant_id: TenantId,
        company_id: CompanyId,
        key: StockKey,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id,
            company_id,
            warehouse_id: key.warehouse_id,
            product_id: key.product_id,
            quantity: Quantity::ZERO,
            updated_at: at,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.warehouse_id, self.product_id)
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn decrement(&mut self, qty: Quantity, at: DateTime<Utc>) -> Result<(), InsufficientStock> {
        let remaining = self.quantity.checked_sub(qty).ok_or(InsufficientStock {
            warehouse_id: self.warehouse_id,
            product_id: self.product_id,
            line_no: None,
            available: self.quantity.value(),
            required: qty.value(),
        })?;
        self.quantity = remaining;
        self.updated_at = at;
        Ok(())
    }

    pub fn increment(&mut self, qty: Quantity, at: DateTime<Utc>) -> DomainResult<()> {
        self.quantity = self
            .quantity
            .checked_add(qty)
            .ok_or_else(|| DomainError::invariant(format!("stock overflow on {}", self.key())))?;
        self.updated_at = at;
        Ok(())
    }
}

impl Owned for WarehouseStock {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn company_id(&self) -> Option<CompanyId> {
        Some(self.company_id)
    }
}

/// Why a ledger row changed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    TransferShipped,
    TransferReceived,
    /// Reversal of a shipment when a shipped transfer is cancelled.
    TransferCancelled,
    OpeningBalance,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockDirection {
    Increment,
    Decrement,
}

/// A planned ledger mutation, before it is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub key: StockKey,
    pub direction: StockDirection,
    pub quantity: Quantity,
    /// Originating document line, if any.
    pub line_no: Option<u32>,
    pub reason: MovementReason,
}

impl StockMovement {
    pub fn signed_delta(&self) -> Decimal {
        match self.direction {
            StockDirection::Increment => self.quantity.value(),
            StockDirection::Decrement => -self.quantity.value(),
        }
    }
}

/// Journal row written alongside every ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovementRecord {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub delta: Decimal,
    pub balance_after: Quantity,
    pub reason: MovementReason,
    /// Document number of a transfer, or free-form reference for opening balances.
    pub reference: Option<String>,
    pub transfer_id: Option<TransferId>,
    pub line_no: Option<u32>,
    pub occurred_at: DateTime<Utc>,
    pub user_id: Option<UserId>,
}

impl StockMovementRecord {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.warehouse_id, self.product_id)
    }
}

impl Owned for StockMovementRecord {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn company_id(&self) -> Option<CompanyId> {
        Some(self.company_id)
    }
}
