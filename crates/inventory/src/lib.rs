//! Inventory movement domain.
//!
//! This crate contains the business rules of stock transfers and the
//! warehouse stock ledger, implemented purely as deterministic domain logic
//! (no IO, no locking, no storage). The infrastructure layer runs these
//! rules inside a transaction.

pub mod master;
pub mod numbering;
pub mod status;
pub mod stock;
pub mod transfer;

pub use master::{Company, Product, Warehouse};
pub use numbering::{DocumentNumber, DocumentType, SequenceKey};
pub use status::{TransferAction, TransferStatus};
pub use stock::{
    MovementReason, StockDirection, StockKey, StockMovement, StockMovementRecord, WarehouseStock,
};
pub use transfer::{
    CancelTransfer, CreateTransfer, NewTransfer, StockTransfer, TransferActor, TransferCancelled,
    TransferCommand, TransferCreated, TransferDeleted, TransferDraft, TransferEvent, TransferId,
    TransferItem, TransferLine, TransferReceived, TransferShipped, TransferUpdated, UpdateTransfer,
};
