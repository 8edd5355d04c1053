//! Infrastructure layer: transactional store, scoping, ledger, numbering,
//! and the services that run transfer transitions as single units of work.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod master_data;
pub mod numbering;
pub mod scoped;
pub mod stock_service;
pub mod store;
pub mod transfer_service;

#[cfg(test)]
mod integration_tests;

pub use config::EngineConfig;
pub use coordinator::TransactionCoordinator;
pub use error::{ErrorKind, ServiceError, StoreError};
pub use ledger::{MovementOrigin, WarehouseStockLedger};
pub use master_data::MasterDataService;
pub use numbering::DocumentNumberAllocator;
pub use scoped::ScopedTransaction;
pub use stock_service::StockService;
pub use store::{InMemoryStore, LockMode, PersistenceStore, PostgresStore, StoreTransaction};
pub use transfer_service::{TRANSFER_AGGREGATE_TYPE, TransferService};
