//! Splitting one product's quantity across warehouses.

use ledger::{StockCell, WarehouseId};

/// Quantity taken from (or returned to) one warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
}

/// Result of [`allocate`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AllocationPlan {
    /// Non-empty slices, in the order the cells were given.
    pub slices: Vec<Allocation>,
    /// Quantity no cell could cover.
    pub shortfall: i64,
}

impl AllocationPlan {
    /// Returns true if the whole requirement was covered.
    pub fn is_complete(&self) -> bool {
        self.shortfall == 0
    }

    /// Sum of all slices.
    pub fn allocated(&self) -> i64 {
        self.slices.iter().map(|s| s.quantity).sum()
    }
}

/// Greedy first-fit over `cells` in the given order.
///
/// Takes `min(capacity_of(cell), remaining)` from each cell and stops as soon
/// as nothing remains. Cells with no capacity are skipped. Never fails: a
/// shortfall is reported, and the caller decides whether a partial plan is
/// acceptable.
pub fn allocate<F>(required: i64, cells: &[StockCell], capacity_of: F) -> AllocationPlan
where
    F: Fn(&StockCell) -> i64,
{
    let mut remaining = required.max(0);
    let mut slices = Vec::new();

    for cell in cells {
        if remaining == 0 {
            break;
        }
        let take = capacity_of(cell).clamp(0, remaining);
        if take == 0 {
            continue;
        }
        slices.push(Allocation {
            warehouse_id: cell.warehouse_id,
            quantity: take,
        });
        remaining -= take;
    }

    AllocationPlan {
        slices,
        shortfall: remaining,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::ProductId;

    fn cell(id: i64, available: i64, reserved: i64) -> StockCell {
        StockCell {
            id,
            product_id: ProductId::new(1),
            warehouse_id: WarehouseId::new(id * 10),
            available,
            reserved,
        }
    }

    #[test]
    fn test_single_cell_covers_requirement() {
        let cells = [cell(1, 5, 0), cell(2, 3, 0)];
        let plan = allocate(4, &cells, |c| c.available);
        assert!(plan.is_complete());
        assert_eq!(
            plan.slices,
            vec![Allocation {
                warehouse_id: WarehouseId::new(10),
                quantity: 4
            }]
        );
    }

    #[test]
    fn test_spills_into_next_cell() {
        let cells = [cell(1, 5, 0), cell(2, 3, 0)];
        let plan = allocate(6, &cells, |c| c.available);
        assert!(plan.is_complete());
        assert_eq!(plan.slices.len(), 2);
        assert_eq!(plan.slices[0].quantity, 5);
        assert_eq!(plan.slices[1].quantity, 1);
    }

    #[test]
    fn test_reports_shortfall() {
        let cells = [cell(1, 5, 0), cell(2, 3, 0)];
        let plan = allocate(9, &cells, |c| c.available);
        assert!(!plan.is_complete());
        assert_eq!(plan.shortfall, 1);
        assert_eq!(plan.allocated(), 8);
    }

    #[test]
    fn test_skips_empty_cells_and_uses_capacity_fn() {
        let cells = [cell(1, 5, 0), cell(2, 0, 2), cell(3, 1, 4)];
        let plan = allocate(5, &cells, |c| c.reserved);
        assert!(plan.is_complete());
        let warehouses: Vec<_> = plan.slices.iter().map(|s| s.warehouse_id).collect();
        assert_eq!(warehouses, vec![WarehouseId::new(20), WarehouseId::new(30)]);
        assert_eq!(plan.slices[1].quantity, 3);
    }

    #[test]
    fn test_zero_and_negative_requirement() {
        let cells = [cell(1, 5, 0)];
        assert_eq!(allocate(0, &cells, |c| c.available), AllocationPlan::default());
        assert_eq!(allocate(-3, &cells, |c| c.available), AllocationPlan::default());
    }

    #[test]
    fn test_no_cells() {
        let plan = allocate(2, &[], |c| c.available);
        assert!(plan.slices.is_empty());
        assert_eq!(plan.shortfall, 2);
    }
}
