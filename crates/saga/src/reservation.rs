//! Multi-warehouse reserve and return steps, run inside one ledger transaction.

use std::collections::BTreeMap;

use domain::{AllocationPlan, ProductQuantity, StockError, StockLedger, allocate};
use ledger::{
    LedgerTx, NewAllocation, OrderId, OrderWarehouseAllocation, ProductId, StockCell, StockScope,
    WarehouseFilter,
};

use crate::error::{Result, SagaError};

/// Outcome of [`reserve_lines`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// The order was reserved now; these rows were written.
    Reserved(Vec<OrderWarehouseAllocation>),
    /// The order already had allocation rows; nothing was written.
    AlreadyApplied(Vec<OrderWarehouseAllocation>),
}

/// Sums quantities per product.
///
/// Iterating the result visits products in ascending id order, which is also
/// the order their cells get locked in, so two multi-line operations never
/// wait on each other's locks in opposite orders. Fails with `Validation` if
/// a product's total does not fit in an `i64`.
pub fn merge_lines(lines: &[ProductQuantity]) -> Result<BTreeMap<ProductId, i64>> {
    let mut merged = BTreeMap::new();
    for line in lines {
        let total: &mut i64 = merged.entry(line.product_id).or_insert(0);
        *total = total.checked_add(line.quantity).ok_or_else(|| {
            StockError::validation(format!(
                "total quantity of product {} is out of range",
                line.product_id
            ))
        })?;
    }
    Ok(merged)
}

/// Reserves every line of an order, or nothing.
///
/// Every cell of every product is locked before the order's allocation rows
/// are looked up, so a concurrent reservation of the same order that
/// committed while this one waited on the locks is seen here and reported as
/// [`ReserveOutcome::AlreadyApplied`]. All sufficiency checks happen before
/// the first mutation, so a request with one uncovered line leaves every cell
/// untouched even before rollback.
pub async fn reserve_lines<T: LedgerTx>(
    tx: &mut T,
    order_id: OrderId,
    lines: &[ProductQuantity],
) -> Result<ReserveOutcome> {
    let merged = merge_lines(lines)?;

    let mut locked: Vec<(ProductId, i64, Vec<StockCell>)> = Vec::with_capacity(merged.len());
    {
        let mut ledger = StockLedger::new(&mut *tx);
        for (product_id, required) in merged {
            let cells = ledger
                .cells_for_product(product_id, WarehouseFilter::ActiveOnly)
                .await?;
            locked.push((product_id, required, cells));
        }
    }

    let existing = tx.allocations_for_order(order_id).await?;
    if !existing.is_empty() {
        return Ok(ReserveOutcome::AlreadyApplied(existing));
    }

    let mut plans: Vec<(ProductId, AllocationPlan)> = Vec::with_capacity(locked.len());
    {
        let mut ledger = StockLedger::new(&mut *tx);
        for (product_id, required, cells) in locked {
            let available = ledger
                .aggregate_available(product_id, &StockScope::AllActive)
                .await?;
            let plan = allocate(required, &cells, |cell| cell.available);

            if available < required || !plan.is_complete() {
                return Err(StockError::InsufficientStock {
                    product_id,
                    warehouse_id: None,
                    requested: required,
                    available,
                }
                .into());
            }
            plans.push((product_id, plan));
        }

        for (product_id, plan) in &plans {
            for slice in &plan.slices {
                ledger
                    .move_available_to_reserved(*product_id, slice.warehouse_id, slice.quantity)
                    .await?;
            }
        }
    }

    let mut allocations = Vec::new();
    for (product_id, plan) in plans {
        for slice in plan.slices {
            let row = tx
                .insert_allocation(NewAllocation {
                    order_id,
                    product_id,
                    warehouse_id: slice.warehouse_id,
                    reserved_quantity: slice.quantity,
                })
                .await?;
            allocations.push(row);
        }
    }

    Ok(ReserveOutcome::Reserved(allocations))
}

/// Gives reserved stock back to available, draining cells in ascending id order.
///
/// A line asking for more than is reserved across every warehouse of the
/// product fails the whole batch.
pub async fn return_lines<T: LedgerTx>(tx: &mut T, lines: &[ProductQuantity]) -> Result<()> {
    let mut ledger = StockLedger::new(tx);
    let mut plans = Vec::new();

    for (product_id, requested) in merge_lines(lines)? {
        let cells = ledger
            .cells_for_product(product_id, WarehouseFilter::Any)
            .await?;
        let plan = allocate(requested, &cells, |cell| cell.reserved);
        if !plan.is_complete() {
            return Err(SagaError::ReturnExceedsReserved {
                product_id,
                requested,
                reserved: plan.allocated(),
            });
        }
        plans.push((product_id, plan));
    }

    for (product_id, plan) in plans {
        for slice in plan.slices {
            ledger
                .move_reserved_to_available(product_id, slice.warehouse_id, slice.quantity)
                .await?;
        }
    }

    Ok(())
}
