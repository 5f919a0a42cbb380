use async_trait::async_trait;

use crate::{
    NewAllocation, NewWarehouse, OrderId, OrderWarehouseAllocation, ProductId, Result, StockCell,
    StockDelta, StockScope, Warehouse, WarehouseFilter, WarehouseId, WarehouseStatus,
};

/// Core trait for ledger store implementations.
///
/// Reads and administrative writes run directly against the store. Stock
/// mutations always go through a [`LedgerTx`] obtained from [`begin`](Self::begin)
/// so that every cell touched by one logical operation lands together or not
/// at all. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// The transaction handle this store hands out.
    type Tx: LedgerTx;

    /// Starts a transaction.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Registers a warehouse with status `active`.
    async fn insert_warehouse(&self, warehouse: NewWarehouse) -> Result<Warehouse>;

    /// Changes a warehouse's status.
    ///
    /// Fails with `WarehouseNotFound` if the warehouse does not exist.
    async fn update_warehouse_status(
        &self,
        id: WarehouseId,
        status: WarehouseStatus,
    ) -> Result<Warehouse>;

    /// Retrieves a warehouse by id.
    async fn get_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>>;

    /// Registers stock for a product/warehouse pair.
    ///
    /// Fails with `WarehouseNotFound` or `DuplicateCell`.
    async fn insert_cell(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        available: i64,
    ) -> Result<StockCell>;

    /// Retrieves a single cell.
    async fn get_cell(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<StockCell>>;

    /// Retrieves a product's cells in ascending cell id order.
    async fn cells_for_product(
        &self,
        product_id: ProductId,
        filter: WarehouseFilter,
    ) -> Result<Vec<StockCell>>;

    /// Sums `available` for a product over the active warehouses in `scope`,
    /// saturating at `i64::MAX`.
    async fn aggregate_available(&self, product_id: ProductId, scope: &StockScope)
    -> Result<i64>;

    /// Retrieves the allocation rows recorded for an order, oldest first.
    async fn allocations_for_order(&self, order_id: OrderId)
    -> Result<Vec<OrderWarehouseAllocation>>;
}

/// A unit of work against the ledger store.
///
/// Cells read through `lock_*` stay locked against concurrent transactions
/// until the transaction ends, so a sufficiency check followed by
/// [`apply_delta`](Self::apply_delta) cannot be interleaved with another
/// writer. Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait LedgerTx: Send {
    /// Reads and locks a cell. Returns `None` if the pair has no cell.
    async fn lock_cell(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<StockCell>>;

    /// Reads and locks a cell, creating an empty one first if needed.
    ///
    /// Fails with `WarehouseNotFound` if the warehouse does not exist.
    async fn lock_or_create_cell(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<StockCell>;

    /// Reads and locks a product's cells in ascending cell id order.
    async fn lock_cells_for_product(
        &mut self,
        product_id: ProductId,
        filter: WarehouseFilter,
    ) -> Result<Vec<StockCell>>;

    /// Sums `available` for a product over the active warehouses in `scope`,
    /// saturating at `i64::MAX`.
    async fn aggregate_available(
        &mut self,
        product_id: ProductId,
        scope: &StockScope,
    ) -> Result<i64>;

    /// Adds `delta` to a cell's counters and returns the updated cell.
    ///
    /// Fails with `CellNotFound` if the pair has no cell, and with
    /// `ConstraintViolation` if a counter would become negative.
    async fn apply_delta(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        delta: StockDelta,
    ) -> Result<StockCell>;

    /// Records an allocation row.
    async fn insert_allocation(
        &mut self,
        allocation: NewAllocation,
    ) -> Result<OrderWarehouseAllocation>;

    /// Retrieves the allocation rows recorded for an order, oldest first.
    async fn allocations_for_order(
        &mut self,
        order_id: OrderId,
    ) -> Result<Vec<OrderWarehouseAllocation>>;

    /// Makes every write of this transaction durable.
    async fn commit(self) -> Result<()>;

    /// Discards every write of this transaction.
    async fn rollback(self) -> Result<()>;
}
