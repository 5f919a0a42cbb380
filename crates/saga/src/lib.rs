//! Reservation saga for the warehouse stock service.
//!
//! `StockCoordinator` runs transfer, add, deduct, release, return, and reserve
//! as single units of work against the ledger store:
//! 1. Open a ledger transaction
//! 2. Check every quantity against the locked cells
//! 3. Apply the ledger arithmetic and record allocations
//! 4. Commit, or roll back everything on the first failure
//!
//! A reservation that cannot be covered is compensated by publishing an
//! `order.update_status` cancel event for the order.

pub mod coordinator;
pub mod error;
pub mod reservation;

pub use coordinator::{Reservation, StockCoordinator};
pub use error::{Result, SagaError};
