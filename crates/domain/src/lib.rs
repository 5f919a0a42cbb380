//! Domain layer for the warehouse stock service.
//!
//! This crate provides:
//! - `StockLedger`, the guarded arithmetic on a cell's counters
//! - the allocation algorithm that splits a quantity across warehouses
//! - typed stock commands and outbound events
//! - warehouse administration

pub mod allocation;
pub mod commands;
pub mod error;
pub mod events;
pub mod stock_ledger;
pub mod warehouse;

pub use allocation::{Allocation, AllocationPlan, allocate};
pub use commands::{
    CommandKind, ProductQuantity, ReserveStock, StockCommand, StockOperation, TransferStock,
};
pub use error::{ErrorClass, StockError, ledger_error_class};
pub use events::{ORDER_UPDATE_STATUS, OrderStatus, OrderUpdateStatus};
pub use stock_ledger::StockLedger;
pub use warehouse::{RegisterWarehouse, WarehouseService};
