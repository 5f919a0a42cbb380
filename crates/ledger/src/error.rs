use thiserror::Error;

use crate::{OrderId, ProductId, WarehouseId};

/// Errors that can occur when interacting with the ledger store.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No stock cell exists for the product/warehouse pair.
    #[error("No stock registered for product {product_id} in warehouse {warehouse_id}")]
    CellNotFound {
        product_id: ProductId,
        warehouse_id: WarehouseId,
    },

    /// The warehouse does not exist.
    #[error("Warehouse not found: {0}")]
    WarehouseNotFound(WarehouseId),

    /// Stock for the product/warehouse pair was already registered.
    #[error("Stock for product {product_id} in warehouse {warehouse_id} is already registered")]
    DuplicateCell {
        product_id: ProductId,
        warehouse_id: WarehouseId,
    },

    /// An allocation row for the order/product/warehouse triple already exists.
    #[error(
        "Allocation for order {order_id}, product {product_id}, warehouse {warehouse_id} already exists"
    )]
    DuplicateAllocation {
        order_id: OrderId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    },

    /// A row-level constraint (e.g. non-negative stock) rejected the write.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// The store could not be reached or refused the operation.
    #[error("Ledger store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for ledger store operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = LedgerError::CellNotFound {
            product_id: ProductId::new(1),
            warehouse_id: WarehouseId::new(2),
        };
        assert_eq!(
            err.to_string(),
            "No stock registered for product 1 in warehouse 2"
        );
    }
}
