//! Durable ledger of per-(product, warehouse) stock counters.
//!
//! The store only persists rows and runs transactions. Business rules such as
//! "available may not go negative" live one layer up in `domain`; the
//! PostgreSQL schema additionally rejects negative counters as a last line of
//! defence.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use common::{GroupId, OrderId, ProductId, WarehouseId};
pub use error::{LedgerError, Result};
pub use memory::{InMemoryLedgerStore, InMemoryLedgerTx};
pub use model::{
    NewAllocation, NewWarehouse, OrderWarehouseAllocation, StockCell, StockDelta, StockScope,
    Warehouse, WarehouseFilter, WarehouseStatus,
};
pub use postgres::{PostgresLedgerStore, PostgresLedgerTx};
pub use store::{LedgerStore, LedgerTx};
