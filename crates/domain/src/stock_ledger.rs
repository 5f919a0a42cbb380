//! Arithmetic on a cell's available and reserved counters.

use ledger::{
    LedgerTx, ProductId, StockCell, StockDelta, StockScope, WarehouseFilter, WarehouseId,
};

use crate::error::StockError;

type Result<T> = std::result::Result<T, StockError>;

/// Stock operations bound to one ledger transaction.
///
/// Every mutation locks the cell first and checks the quantity against the
/// locked value, so the check and the write see the same row. A counter that
/// would leave the `i64` range is a `Validation` error. Whether a failed
/// operation fails the surrounding unit of work is up to the caller.
pub struct StockLedger<'a, T: LedgerTx> {
    tx: &'a mut T,
}

impl<'a, T: LedgerTx> StockLedger<'a, T> {
    pub fn new(tx: &'a mut T) -> Self {
        Self { tx }
    }

    /// `available += qty`. Creates the cell if the pair has none yet.
    #[tracing::instrument(skip(self))]
    pub async fn increase_available(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: i64,
    ) -> Result<StockCell> {
        ensure_positive(qty)?;
        let cell = self.tx.lock_or_create_cell(product_id, warehouse_id).await?;
        ensure_room(cell.available, qty, "available_stock")?;
        let cell = self
            .tx
            .apply_delta(product_id, warehouse_id, StockDelta::available(qty))
            .await?;
        Ok(cell)
    }

    /// `available -= qty`, failing with `InsufficientStock` if `available < qty`.
    #[tracing::instrument(skip(self))]
    pub async fn decrease_available(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: i64,
    ) -> Result<StockCell> {
        ensure_positive(qty)?;
        self.require_available(product_id, warehouse_id, qty).await?;
        let cell = self
            .tx
            .apply_delta(product_id, warehouse_id, StockDelta::available(-qty))
            .await?;
        Ok(cell)
    }

    /// Moves `qty` from available to reserved.
    #[tracing::instrument(skip(self))]
    pub async fn move_available_to_reserved(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: i64,
    ) -> Result<StockCell> {
        ensure_positive(qty)?;
        let cell = self.require_available(product_id, warehouse_id, qty).await?;
        ensure_room(cell.reserved, qty, "reserved_stock")?;
        let cell = self
            .tx
            .apply_delta(product_id, warehouse_id, StockDelta::reserve(qty))
            .await?;
        Ok(cell)
    }

    /// Moves `qty` from reserved back to available.
    ///
    /// Fails with `InvalidState` if `reserved < qty`; the counter is never
    /// clamped.
    #[tracing::instrument(skip(self))]
    pub async fn move_reserved_to_available(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: i64,
    ) -> Result<StockCell> {
        ensure_positive(qty)?;
        let cell = self.require_reserved(product_id, warehouse_id, qty).await?;
        ensure_room(cell.available, qty, "available_stock")?;
        let cell = self
            .tx
            .apply_delta(product_id, warehouse_id, StockDelta::unreserve(qty))
            .await?;
        Ok(cell)
    }

    /// `reserved -= qty` without crediting available: the stock is consumed.
    #[tracing::instrument(skip(self))]
    pub async fn release_reserved(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: i64,
    ) -> Result<StockCell> {
        ensure_positive(qty)?;
        self.require_reserved(product_id, warehouse_id, qty).await?;
        let cell = self
            .tx
            .apply_delta(product_id, warehouse_id, StockDelta::reserved(-qty))
            .await?;
        Ok(cell)
    }

    /// Reads and locks one cell, creating an empty one if the pair has none.
    pub async fn lock_or_create_cell(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<StockCell> {
        Ok(self.tx.lock_or_create_cell(product_id, warehouse_id).await?)
    }

    /// Reads and locks one cell.
    pub async fn get_cell(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<StockCell>> {
        Ok(self.tx.lock_cell(product_id, warehouse_id).await?)
    }

    /// Reads and locks a product's cells in ascending id order.
    pub async fn cells_for_product(
        &mut self,
        product_id: ProductId,
        filter: WarehouseFilter,
    ) -> Result<Vec<StockCell>> {
        Ok(self.tx.lock_cells_for_product(product_id, filter).await?)
    }

    pub async fn aggregate_available(
        &mut self,
        product_id: ProductId,
        scope: &StockScope,
    ) -> Result<i64> {
        Ok(self.tx.aggregate_available(product_id, scope).await?)
    }

    /// Locks the cell and checks `available >= qty`; a missing cell has 0.
    async fn require_available(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: i64,
    ) -> Result<StockCell> {
        let cell = self.tx.lock_cell(product_id, warehouse_id).await?;
        let available = cell.map_or(0, |cell| cell.available);
        match cell {
            Some(cell) if available >= qty => Ok(cell),
            _ => Err(StockError::InsufficientStock {
                product_id,
                warehouse_id: Some(warehouse_id),
                requested: qty,
                available,
            }),
        }
    }

    async fn require_reserved(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: i64,
    ) -> Result<StockCell> {
        let cell = self.tx.lock_cell(product_id, warehouse_id).await?;
        let reserved = cell.map_or(0, |cell| cell.reserved);
        match cell {
            Some(cell) if reserved >= qty => Ok(cell),
            _ => Err(StockError::InvalidState {
                product_id,
                warehouse_id,
                requested: qty,
                reserved,
            }),
        }
    }
}

fn ensure_room(current: i64, qty: i64, counter: &str) -> Result<()> {
    if current.checked_add(qty).is_none() {
        return Err(StockError::validation(format!(
            "{counter} {current} cannot grow by {qty}"
        )));
    }
    Ok(())
}

fn ensure_positive(qty: i64) -> Result<()> {
    if qty <= 0 {
        return Err(StockError::validation(format!(
            "quantity must be greater than 0, got {qty}"
        )));
    }
    Ok(())
}
