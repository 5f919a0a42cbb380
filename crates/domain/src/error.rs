//! Domain error types.

use ledger::{LedgerError, ProductId, WarehouseId};
use thiserror::Error;

/// Coarse classification every error in the service maps onto.
///
/// The dispatcher decides ack/requeue and the HTTP layer picks a status code
/// from the class alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Not enough available stock. Final for the operation.
    InsufficientStock,
    /// The operation would break a ledger invariant.
    InvalidState,
    /// A referenced warehouse or stock cell does not exist.
    NotFound,
    /// The resource already exists.
    Conflict,
    /// Malformed command or request.
    Validation,
    /// Infrastructure failure; retrying later may succeed.
    Transient,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::InsufficientStock => "insufficient_stock",
            ErrorClass::InvalidState => "invalid_state",
            ErrorClass::NotFound => "not_found",
            ErrorClass::Conflict => "conflict",
            ErrorClass::Validation => "validation",
            ErrorClass::Transient => "transient",
        }
    }

    /// Returns true if redelivering the same command may change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by stock ledger operations and warehouse administration.
#[derive(Debug, Error)]
pub enum StockError {
    /// Available stock does not cover the requested quantity.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        warehouse_id: Option<WarehouseId>,
        requested: i64,
        available: i64,
    },

    /// Reserved stock does not cover the requested quantity.
    #[error(
        "Invalid state for product {product_id} in warehouse {warehouse_id}: requested {requested}, reserved {reserved}"
    )]
    InvalidState {
        product_id: ProductId,
        warehouse_id: WarehouseId,
        requested: i64,
        reserved: i64,
    },

    /// Invalid input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Warehouse does not exist.
    #[error("Warehouse not found: {0}")]
    WarehouseNotFound(WarehouseId),

    /// Stock was already registered for the pair.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An error occurred in the ledger store.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl StockError {
    pub fn validation(message: impl Into<String>) -> Self {
        StockError::Validation(message.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            StockError::InsufficientStock { .. } => ErrorClass::InsufficientStock,
            StockError::InvalidState { .. } => ErrorClass::InvalidState,
            StockError::Validation(_) => ErrorClass::Validation,
            StockError::WarehouseNotFound(_) => ErrorClass::NotFound,
            StockError::Conflict(_) => ErrorClass::Conflict,
            StockError::Ledger(e) => ledger_error_class(e),
        }
    }
}

/// Classifies a ledger store error.
pub fn ledger_error_class(error: &LedgerError) -> ErrorClass {
    match error {
        LedgerError::CellNotFound { .. } | LedgerError::WarehouseNotFound(_) => {
            ErrorClass::NotFound
        }
        LedgerError::DuplicateCell { .. } => ErrorClass::Conflict,
        LedgerError::ConstraintViolation(_) => ErrorClass::InvalidState,
        LedgerError::DuplicateAllocation { .. }
        | LedgerError::Unavailable(_)
        | LedgerError::Database(_)
        | LedgerError::Migration(_) => ErrorClass::Transient,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::OrderId;

    #[test]
    fn test_classification() {
        let insufficient = StockError::InsufficientStock {
            product_id: ProductId::new(1),
            warehouse_id: None,
            requested: 3,
            available: 1,
        };
        assert_eq!(insufficient.class(), ErrorClass::InsufficientStock);
        assert!(!insufficient.class().is_retryable());

        let missing = StockError::from(LedgerError::CellNotFound {
            product_id: ProductId::new(1),
            warehouse_id: WarehouseId::new(2),
        });
        assert_eq!(missing.class(), ErrorClass::NotFound);

        let duplicate = StockError::from(LedgerError::DuplicateAllocation {
            order_id: OrderId::new(1),
            product_id: ProductId::new(1),
            warehouse_id: WarehouseId::new(2),
        });
        assert_eq!(duplicate.class(), ErrorClass::Transient);
        assert!(duplicate.class().is_retryable());

        let down = StockError::from(LedgerError::Unavailable("down".into()));
        assert_eq!(down.class(), ErrorClass::Transient);
    }

    #[test]
    fn test_messages() {
        let err = StockError::InvalidState {
            product_id: ProductId::new(1),
            warehouse_id: WarehouseId::new(2),
            requested: 5,
            reserved: 2,
        };
        assert_eq!(
            err.to_string(),
            "Invalid state for product 1 in warehouse 2: requested 5, reserved 2"
        );
        assert_eq!(ErrorClass::InsufficientStock.to_string(), "insufficient_stock");
    }
}
