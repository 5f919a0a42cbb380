//! Stock coordinator running every stock operation as one unit of work.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Instant;

use bus::{Envelope, Publisher, PublisherExt};
use domain::{
    ORDER_UPDATE_STATUS, OrderUpdateStatus, ProductQuantity, ReserveStock, StockCommand,
    StockError, StockLedger, StockOperation, TransferStock,
};
use ledger::{
    LedgerError, LedgerStore, LedgerTx, OrderId, OrderWarehouseAllocation, ProductId, StockCell,
    StockScope, WarehouseId,
};

use crate::error::{Result, SagaError};
use crate::reservation::{ReserveOutcome, reserve_lines, return_lines};

/// Result of a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub order_id: OrderId,
    pub allocations: Vec<OrderWarehouseAllocation>,
    /// True if the order already had allocations and nothing was changed.
    pub already_applied: bool,
}

/// Orchestrates stock operations over the ledger store.
///
/// Every mutating operation opens one ledger transaction, runs all of its
/// steps in it, and commits only when every step succeeded; any failure rolls
/// the whole operation back. An uncovered reservation additionally publishes
/// an `order.update_status` cancel event.
pub struct StockCoordinator<L, P>
where
    L: LedgerStore,
    P: Publisher,
{
    store: L,
    publisher: P,
}

impl<L, P> StockCoordinator<L, P>
where
    L: LedgerStore,
    P: Publisher,
{
    pub fn new(store: L, publisher: P) -> Self {
        Self { store, publisher }
    }

    /// Runs a decoded command.
    pub async fn execute(&self, command: StockCommand) -> Result<()> {
        match command {
            StockCommand::Transfer(cmd) => self.transfer(cmd).await,
            StockCommand::Add(cmd) => self.add_stock(cmd).await.map(drop),
            StockCommand::Deduct(cmd) => self.deduct_stock(cmd).await.map(drop),
            StockCommand::Release(cmd) => self.release_reserved(cmd).await.map(drop),
            StockCommand::Return(lines) => self.return_reserved(&lines).await,
            StockCommand::Reserve(cmd) => self.reserve(&cmd).await.map(drop),
        }
    }

    /// Validates a command and publishes it on its topic for asynchronous
    /// processing.
    #[tracing::instrument(skip(self), fields(topic = %command.kind()))]
    pub async fn request(&self, command: StockCommand) -> Result<()> {
        command.validate()?;
        let envelope = Envelope::new(command.kind().topic(), command.to_data()?);
        self.publisher.publish(envelope).await?;
        tracing::info!("Stock command queued");
        Ok(())
    }

    /// Moves available stock from one warehouse to another, creating the
    /// destination cell if needed.
    #[tracing::instrument(skip(self))]
    pub async fn transfer(&self, cmd: TransferStock) -> Result<()> {
        observe("transfer", async {
            StockCommand::Transfer(cmd).validate()?;
            let mut tx = self.store.begin().await?;
            let result = async {
                let mut ledger = StockLedger::new(&mut tx);
                // Both cells are locked in ascending warehouse id order.
                let from = if cmd.from_warehouse_id < cmd.to_warehouse_id {
                    let from = ledger.get_cell(cmd.product_id, cmd.from_warehouse_id).await?;
                    ledger
                        .lock_or_create_cell(cmd.product_id, cmd.to_warehouse_id)
                        .await?;
                    from
                } else {
                    ledger
                        .lock_or_create_cell(cmd.product_id, cmd.to_warehouse_id)
                        .await?;
                    ledger.get_cell(cmd.product_id, cmd.from_warehouse_id).await?
                };
                let available = from.map_or(0, |cell| cell.available);
                if available < cmd.quantity {
                    return Err(StockError::InsufficientStock {
                        product_id: cmd.product_id,
                        warehouse_id: Some(cmd.from_warehouse_id),
                        requested: cmd.quantity,
                        available,
                    });
                }
                ledger
                    .increase_available(cmd.product_id, cmd.to_warehouse_id, cmd.quantity)
                    .await?;
                ledger
                    .decrease_available(cmd.product_id, cmd.from_warehouse_id, cmd.quantity)
                    .await?;
                Ok(())
            }
            .await
            .map_err(SagaError::from);
            settle(tx, result).await
        })
        .await
    }

    /// Adds available stock to one cell, creating it if needed.
    #[tracing::instrument(skip(self))]
    pub async fn add_stock(&self, cmd: StockOperation) -> Result<StockCell> {
        observe("add", async {
            StockCommand::Add(cmd).validate()?;
            let mut tx = self.store.begin().await?;
            let result = StockLedger::new(&mut tx)
                .increase_available(cmd.product_id, cmd.warehouse_id, cmd.quantity)
                .await
                .map_err(SagaError::from);
            settle(tx, result).await
        })
        .await
    }

    /// Removes available stock from one cell.
    #[tracing::instrument(skip(self))]
    pub async fn deduct_stock(&self, cmd: StockOperation) -> Result<StockCell> {
        observe("deduct", async {
            StockCommand::Deduct(cmd).validate()?;
            let mut tx = self.store.begin().await?;
            let result = StockLedger::new(&mut tx)
                .decrease_available(cmd.product_id, cmd.warehouse_id, cmd.quantity)
                .await
                .map_err(SagaError::from);
            settle(tx, result).await
        })
        .await
    }

    /// Consumes reserved stock of one cell, e.g. when an order ships.
    #[tracing::instrument(skip(self))]
    pub async fn release_reserved(&self, cmd: StockOperation) -> Result<StockCell> {
        observe("release", async {
            StockCommand::Release(cmd).validate()?;
            let mut tx = self.store.begin().await?;
            let result = StockLedger::new(&mut tx)
                .release_reserved(cmd.product_id, cmd.warehouse_id, cmd.quantity)
                .await
                .map_err(SagaError::from);
            settle(tx, result).await
        })
        .await
    }

    /// Gives reserved stock back to available across warehouses.
    #[tracing::instrument(skip(self))]
    pub async fn return_reserved(&self, lines: &[ProductQuantity]) -> Result<()> {
        observe("return", async {
            StockCommand::Return(lines.to_vec()).validate()?;
            let mut tx = self.store.begin().await?;
            let result = return_lines(&mut tx, lines).await;
            settle(tx, result).await
        })
        .await
    }

    /// Reserves every line of an order across active warehouses.
    ///
    /// An order that already has allocation rows is left untouched and
    /// reported as `already_applied`. If any line cannot be covered nothing is
    /// reserved, a cancel event is published for the order, and the call fails
    /// with `InsufficientStock`; if that publish fails the error is transient
    /// so the command gets redelivered.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn reserve(&self, cmd: &ReserveStock) -> Result<Reservation> {
        observe("reserve", async {
            StockCommand::Reserve(cmd.clone()).validate()?;
            let mut tx = self.store.begin().await?;

            let result = reserve_lines(&mut tx, cmd.order_id, &cmd.operations).await;
            match settle(tx, result).await {
                Ok(ReserveOutcome::Reserved(allocations)) => {
                    tracing::info!(allocations = allocations.len(), "Order reserved");
                    Ok(Reservation {
                        order_id: cmd.order_id,
                        allocations,
                        already_applied: false,
                    })
                }
                Ok(ReserveOutcome::AlreadyApplied(allocations)) => {
                    tracing::info!("Order already reserved, skipping");
                    Ok(Reservation {
                        order_id: cmd.order_id,
                        allocations,
                        already_applied: true,
                    })
                }
                Err(e) if e.is_insufficient_stock() => {
                    self.cancel_order(cmd.order_id).await?;
                    Err(e)
                }
                Err(e) => Err(e),
            }
        })
        .await
    }

    /// Registers stock for a product in a warehouse.
    #[tracing::instrument(skip(self))]
    pub async fn register_stock(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        available: i64,
    ) -> Result<StockCell> {
        if !product_id.is_valid() || !warehouse_id.is_valid() {
            return Err(StockError::validation("product_id and warehouse_id are required").into());
        }
        if available < 0 {
            return Err(StockError::validation("available_stock must not be negative").into());
        }

        match self
            .store
            .insert_cell(product_id, warehouse_id, available)
            .await
        {
            Ok(cell) => {
                tracing::info!("Stock registered");
                Ok(cell)
            }
            Err(LedgerError::WarehouseNotFound(id)) => {
                Err(StockError::WarehouseNotFound(id).into())
            }
            Err(e @ LedgerError::DuplicateCell { .. }) => {
                Err(StockError::Conflict(e.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_cell(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<StockCell>> {
        Ok(self.store.get_cell(product_id, warehouse_id).await?)
    }

    /// Sums available stock of a product over the active warehouses in `scope`.
    pub async fn available_stock(&self, product_id: ProductId, scope: &StockScope) -> Result<i64> {
        Ok(self.store.aggregate_available(product_id, scope).await?)
    }

    /// [`available_stock`](Self::available_stock) for several products.
    pub async fn available_stock_bulk(
        &self,
        product_ids: &[ProductId],
        scope: &StockScope,
    ) -> Result<BTreeMap<ProductId, i64>> {
        let mut totals = BTreeMap::new();
        for &product_id in product_ids {
            if totals.contains_key(&product_id) {
                continue;
            }
            let total = self.store.aggregate_available(product_id, scope).await?;
            totals.insert(product_id, total);
        }
        Ok(totals)
    }

    pub async fn allocations_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<OrderWarehouseAllocation>> {
        Ok(self.store.allocations_for_order(order_id).await?)
    }

    async fn cancel_order(&self, order_id: OrderId) -> Result<()> {
        self.publisher
            .publish_event(ORDER_UPDATE_STATUS, &OrderUpdateStatus::cancel(order_id))
            .await
            .map_err(|source| SagaError::CompensationFailed { order_id, source })?;

        metrics::counter!("stock_reservations_cancelled_total").increment(1);
        tracing::warn!(order_id = %order_id, "Reservation not covered, order cancel published");
        Ok(())
    }
}

/// Commits on success and rolls back on failure.
async fn settle<T, X: LedgerTx>(tx: X, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_error) = tx.rollback().await {
                tracing::warn!(error = %rollback_error, "Rollback failed");
            }
            Err(e)
        }
    }
}

/// Records count, duration, and failure class of one operation.
async fn observe<T, F>(operation: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    metrics::counter!("stock_operations_total", "operation" => operation).increment(1);
    let start = Instant::now();

    let result = fut.await;

    metrics::histogram!("stock_operation_duration_seconds", "operation" => operation)
        .record(start.elapsed().as_secs_f64());

    if let Err(e) = &result {
        let class = e.class();
        metrics::counter!(
            "stock_operation_failures_total",
            "operation" => operation,
            "class" => class.as_str()
        )
        .increment(1);
        tracing::warn!(operation, class = %class, error = %e, "Stock operation failed");
    }

    result
}
