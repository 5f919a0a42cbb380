use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    LedgerError, NewAllocation, NewWarehouse, OrderId, OrderWarehouseAllocation, ProductId,
    Result, StockCell, StockDelta, StockScope, Warehouse, WarehouseFilter, WarehouseId,
    WarehouseStatus,
    store::{LedgerStore, LedgerTx},
};

#[derive(Debug, Clone, Default)]
struct LedgerState {
    warehouses: BTreeMap<WarehouseId, Warehouse>,
    /// Keyed by cell id, so iteration is ascending id order.
    cells: BTreeMap<i64, StockCell>,
    allocations: Vec<OrderWarehouseAllocation>,
    next_warehouse_id: i64,
    next_cell_id: i64,
    next_allocation_id: i64,
}

impl LedgerState {
    fn find_cell(&self, product_id: ProductId, warehouse_id: WarehouseId) -> Option<&StockCell> {
        self.cells
            .values()
            .find(|c| c.product_id == product_id && c.warehouse_id == warehouse_id)
    }

    fn cells_for_product(&self, product_id: ProductId, filter: WarehouseFilter) -> Vec<StockCell> {
        self.cells
            .values()
            .filter(|c| c.product_id == product_id)
            .filter(|c| {
                self.warehouses
                    .get(&c.warehouse_id)
                    .is_some_and(|w| filter.admits(w))
            })
            .copied()
            .collect()
    }

    fn aggregate_available(&self, product_id: ProductId, scope: &StockScope) -> i64 {
        self.cells
            .values()
            .filter(|c| c.product_id == product_id)
            .filter(|c| {
                self.warehouses
                    .get(&c.warehouse_id)
                    .is_some_and(|w| scope.includes(w))
            })
            .fold(0i64, |total, c| total.saturating_add(c.available))
    }

    fn insert_cell(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        available: i64,
    ) -> Result<StockCell> {
        if !self.warehouses.contains_key(&warehouse_id) {
            return Err(LedgerError::WarehouseNotFound(warehouse_id));
        }
        if self.find_cell(product_id, warehouse_id).is_some() {
            return Err(LedgerError::DuplicateCell {
                product_id,
                warehouse_id,
            });
        }
        if available < 0 {
            return Err(LedgerError::ConstraintViolation(
                "available_stock_non_negative".to_string(),
            ));
        }

        self.next_cell_id += 1;
        let cell = StockCell {
            id: self.next_cell_id,
            product_id,
            warehouse_id,
            available,
            reserved: 0,
        };
        self.cells.insert(cell.id, cell);
        Ok(cell)
    }

    fn allocations_for_order(&self, order_id: OrderId) -> Vec<OrderWarehouseAllocation> {
        self.allocations
            .iter()
            .filter(|a| a.order_id == order_id)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
struct Faults {
    unavailable: AtomicBool,
    failing_commits: AtomicU32,
}

/// In-memory ledger store implementation for testing.
///
/// Transactions take an exclusive lock on the whole ledger and work on a
/// private copy that replaces the shared state only on commit, which gives
/// the same all-or-nothing behaviour as the PostgreSQL implementation.
/// Do not call store-level methods while holding a transaction from the
/// same store: they wait for the transaction to finish.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
    faults: Arc<Faults>,
}

impl InMemoryLedgerStore {
    /// Creates a new empty in-memory ledger store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes the next `count` commits fail with `Unavailable`.
    pub fn fail_next_commits(&self, count: u32) {
        self.faults.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Returns a copy of every cell in ascending id order.
    pub async fn all_cells(&self) -> Vec<StockCell> {
        self.state.lock().await.cells.values().copied().collect()
    }

    /// Returns the total number of allocation rows.
    pub async fn allocation_count(&self) -> usize {
        self.state.lock().await.allocations.len()
    }

    fn check_available(&self) -> Result<()> {
        if self.faults.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable(
                "in-memory ledger marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn take_commit_failure(&self) -> bool {
        self.faults
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    type Tx = InMemoryLedgerTx;

    async fn begin(&self) -> Result<Self::Tx> {
        self.check_available()?;
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryLedgerTx {
            guard,
            working,
            store: self.clone(),
        })
    }

    async fn insert_warehouse(&self, warehouse: NewWarehouse) -> Result<Warehouse> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.next_warehouse_id += 1;
        let warehouse = Warehouse {
            id: WarehouseId::new(state.next_warehouse_id),
            name: warehouse.name,
            address: warehouse.address,
            group_id: warehouse.group_id,
            status: WarehouseStatus::Active,
        };
        state.warehouses.insert(warehouse.id, warehouse.clone());
        Ok(warehouse)
    }

    async fn update_warehouse_status(
        &self,
        id: WarehouseId,
        status: WarehouseStatus,
    ) -> Result<Warehouse> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let warehouse = state
            .warehouses
            .get_mut(&id)
            .ok_or(LedgerError::WarehouseNotFound(id))?;
        warehouse.status = status;
        Ok(warehouse.clone())
    }

    async fn get_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>> {
        self.check_available()?;
        Ok(self.state.lock().await.warehouses.get(&id).cloned())
    }

    async fn insert_cell(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        available: i64,
    ) -> Result<StockCell> {
        self.check_available()?;
        self.state
            .lock()
            .await
            .insert_cell(product_id, warehouse_id, available)
    }

    async fn get_cell(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<StockCell>> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .await
            .find_cell(product_id, warehouse_id)
            .copied())
    }

    async fn cells_for_product(
        &self,
        product_id: ProductId,
        filter: WarehouseFilter,
    ) -> Result<Vec<StockCell>> {
        self.check_available()?;
        Ok(self.state.lock().await.cells_for_product(product_id, filter))
    }

    async fn aggregate_available(
        &self,
        product_id: ProductId,
        scope: &StockScope,
    ) -> Result<i64> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .await
            .aggregate_available(product_id, scope))
    }

    async fn allocations_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<OrderWarehouseAllocation>> {
        self.check_available()?;
        Ok(self.state.lock().await.allocations_for_order(order_id))
    }
}

/// Transaction over an [`InMemoryLedgerStore`].
pub struct InMemoryLedgerTx {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
    store: InMemoryLedgerStore,
}

#[async_trait]
impl LedgerTx for InMemoryLedgerTx {
    async fn lock_cell(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<StockCell>> {
        self.store.check_available()?;
        Ok(self.working.find_cell(product_id, warehouse_id).copied())
    }

    async fn lock_or_create_cell(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<StockCell> {
        self.store.check_available()?;
        match self.working.find_cell(product_id, warehouse_id) {
            Some(cell) => Ok(*cell),
            None => self.working.insert_cell(product_id, warehouse_id, 0),
        }
    }

    async fn lock_cells_for_product(
        &mut self,
        product_id: ProductId,
        filter: WarehouseFilter,
    ) -> Result<Vec<StockCell>> {
        self.store.check_available()?;
        Ok(self.working.cells_for_product(product_id, filter))
    }

    async fn aggregate_available(
        &mut self,
        product_id: ProductId,
        scope: &StockScope,
    ) -> Result<i64> {
        self.store.check_available()?;
        Ok(self.working.aggregate_available(product_id, scope))
    }

    async fn apply_delta(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        delta: StockDelta,
    ) -> Result<StockCell> {
        self.store.check_available()?;
        let cell = self
            .working
            .find_cell(product_id, warehouse_id)
            .copied()
            .ok_or(LedgerError::CellNotFound {
                product_id,
                warehouse_id,
            })?;

        let updated = cell.with_delta(delta);
        if updated.available < 0 {
            return Err(LedgerError::ConstraintViolation(
                "available_stock_non_negative".to_string(),
            ));
        }
        if updated.reserved < 0 {
            return Err(LedgerError::ConstraintViolation(
                "reserved_stock_non_negative".to_string(),
            ));
        }

        self.working.cells.insert(updated.id, updated);
        Ok(updated)
    }

    async fn insert_allocation(
        &mut self,
        allocation: NewAllocation,
    ) -> Result<OrderWarehouseAllocation> {
        self.store.check_available()?;
        let duplicate = self.working.allocations.iter().any(|a| {
            a.order_id == allocation.order_id
                && a.product_id == allocation.product_id
                && a.warehouse_id == allocation.warehouse_id
        });
        if duplicate {
            return Err(LedgerError::DuplicateAllocation {
                order_id: allocation.order_id,
                product_id: allocation.product_id,
                warehouse_id: allocation.warehouse_id,
            });
        }
        if allocation.reserved_quantity <= 0 {
            return Err(LedgerError::ConstraintViolation(
                "reserved_quantity_positive".to_string(),
            ));
        }

        self.working.next_allocation_id += 1;
        let row = OrderWarehouseAllocation {
            id: self.working.next_allocation_id,
            order_id: allocation.order_id,
            product_id: allocation.product_id,
            warehouse_id: allocation.warehouse_id,
            reserved_quantity: allocation.reserved_quantity,
            created_at: Utc::now(),
        };
        self.working.allocations.push(row.clone());
        Ok(row)
    }

    async fn allocations_for_order(
        &mut self,
        order_id: OrderId,
    ) -> Result<Vec<OrderWarehouseAllocation>> {
        self.store.check_available()?;
        Ok(self.working.allocations_for_order(order_id))
    }

    async fn commit(mut self) -> Result<()> {
        self.store.check_available()?;
        if self.store.take_commit_failure() {
            return Err(LedgerError::Unavailable(
                "in-memory commit failure injected".to_string(),
            ));
        }
        *self.guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
