//! Per-order allocation lookup.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use bus::Publisher;
use ledger::{LedgerStore, OrderId, OrderWarehouseAllocation};

use crate::AppState;
use crate::error::ApiError;
use crate::response::ApiResponse;

/// GET /orders/:id/allocations: where an order's stock was reserved.
///
/// An order without allocations answers with an empty list.
#[tracing::instrument(skip(state))]
pub async fn allocations<L: LedgerStore + 'static, P: Publisher + 'static>(
    State(state): State<Arc<AppState<L, P>>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<OrderWarehouseAllocation>>>, ApiError> {
    let rows = state
        .coordinator
        .allocations_for_order(OrderId::new(id))
        .await?;
    Ok(Json(ApiResponse::new("order allocations", rows)))
}
