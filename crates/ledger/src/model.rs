//! Rows persisted by the ledger store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GroupId, OrderId, ProductId, WarehouseId};

/// Stock counters of one product in one warehouse.
///
/// `id` is the store-assigned key; ascending `id` is the order in which
/// warehouses are considered when a quantity is split across them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCell {
    pub id: i64,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    /// Sellable stock.
    pub available: i64,
    /// Stock earmarked for in-flight orders.
    pub reserved: i64,
}

impl StockCell {
    /// Returns the cell after applying `delta`, without checking invariants.
    pub fn with_delta(mut self, delta: StockDelta) -> Self {
        self.available += delta.available;
        self.reserved += delta.reserved;
        self
    }

    /// Returns true if both counters are non-negative.
    pub fn is_consistent(&self) -> bool {
        self.available >= 0 && self.reserved >= 0
    }
}

/// Signed change applied to a cell's counters in one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StockDelta {
    pub available: i64,
    pub reserved: i64,
}

impl StockDelta {
    pub fn available(amount: i64) -> Self {
        Self {
            available: amount,
            reserved: 0,
        }
    }

    pub fn reserved(amount: i64) -> Self {
        Self {
            available: 0,
            reserved: amount,
        }
    }

    /// Moves `amount` from available to reserved.
    pub fn reserve(amount: i64) -> Self {
        Self {
            available: -amount,
            reserved: amount,
        }
    }

    /// Moves `amount` from reserved back to available.
    pub fn unreserve(amount: i64) -> Self {
        Self {
            available: amount,
            reserved: -amount,
        }
    }
}

/// Operational status of a warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseStatus {
    #[default]
    Active,
    Inactive,
}

impl WarehouseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarehouseStatus::Active => "active",
            WarehouseStatus::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for WarehouseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WarehouseStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(WarehouseStatus::Active),
            "inactive" => Ok(WarehouseStatus::Inactive),
            other => Err(format!("unknown warehouse status '{other}'")),
        }
    }
}

/// A registered warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,
    pub address: String,
    pub group_id: GroupId,
    pub status: WarehouseStatus,
}

impl Warehouse {
    pub fn is_active(&self) -> bool {
        self.status == WarehouseStatus::Active
    }
}

/// Input for registering a warehouse; new warehouses start active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWarehouse {
    pub name: String,
    pub address: String,
    pub group_id: GroupId,
}

/// Durable trace of stock reserved for an order in one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderWarehouseAllocation {
    pub id: i64,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub reserved_quantity: i64,
    pub created_at: DateTime<Utc>,
}

/// Input for recording an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewAllocation {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub reserved_quantity: i64,
}

/// Which warehouses an aggregate availability query sums over.
///
/// Inactive warehouses never contribute, whatever the scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockScope {
    /// Every active warehouse.
    AllActive,
    /// Active warehouses of one group.
    Group(GroupId),
    /// The listed warehouses, when active.
    Warehouses(Vec<WarehouseId>),
}

impl StockScope {
    /// Returns true if an active `warehouse` falls inside this scope.
    pub fn includes(&self, warehouse: &Warehouse) -> bool {
        if !warehouse.is_active() {
            return false;
        }
        match self {
            StockScope::AllActive => true,
            StockScope::Group(group_id) => warehouse.group_id == *group_id,
            StockScope::Warehouses(ids) => ids.contains(&warehouse.id),
        }
    }
}

/// Which warehouses a per-product cell listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarehouseFilter {
    /// Only cells in active warehouses.
    ActiveOnly,
    /// Cells in every warehouse regardless of status.
    Any,
}

impl WarehouseFilter {
    pub fn admits(&self, warehouse: &Warehouse) -> bool {
        match self {
            WarehouseFilter::ActiveOnly => warehouse.is_active(),
            WarehouseFilter::Any => true,
        }
    }
}
