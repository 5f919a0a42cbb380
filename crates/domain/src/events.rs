//! Outbound notifications.

use ledger::OrderId;
use serde::{Deserialize, Serialize};

/// Event type of [`OrderUpdateStatus`].
pub const ORDER_UPDATE_STATUS: &str = "order.update_status";

/// Order status requested by this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Cancel,
}

/// Asks the order service to move an order to a new status.
///
/// Published as the compensation for a reservation that could not be covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdateStatus {
    pub id: OrderId,
    pub status: OrderStatus,
}

impl OrderUpdateStatus {
    pub fn cancel(order_id: OrderId) -> Self {
        Self {
            id: order_id,
            status: OrderStatus::Cancel,
        }
    }
}
