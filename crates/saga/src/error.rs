//! Saga error types.

use bus::BusError;
use domain::{ErrorClass, StockError, ledger_error_class};
use ledger::{LedgerError, OrderId, ProductId};
use thiserror::Error;

/// Errors that can occur while running a stock operation.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A stock ledger operation failed.
    #[error(transparent)]
    Stock(#[from] StockError),

    /// A return asked for more than is reserved across all warehouses.
    #[error(
        "Cannot return {requested} of product {product_id}: only {reserved} reserved across warehouses"
    )]
    ReturnExceedsReserved {
        product_id: ProductId,
        requested: i64,
        reserved: i64,
    },

    /// The cancel event for an uncovered reservation could not be published.
    #[error("Failed to publish cancellation for order {order_id}: {source}")]
    CompensationFailed {
        order_id: OrderId,
        #[source]
        source: BusError,
    },

    /// Ledger store error.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Bus error.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

impl SagaError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SagaError::Stock(e) => e.class(),
            SagaError::ReturnExceedsReserved { .. } => ErrorClass::InvalidState,
            SagaError::CompensationFailed { .. } => ErrorClass::Transient,
            SagaError::Ledger(e) => ledger_error_class(e),
            SagaError::Bus(e) if e.is_transient() => ErrorClass::Transient,
            SagaError::Bus(_) => ErrorClass::Validation,
        }
    }

    pub fn is_insufficient_stock(&self) -> bool {
        self.class() == ErrorClass::InsufficientStock
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
