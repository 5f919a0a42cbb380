//! Availability queries and stock operations.
//!
//! Every operation exists twice: `POST /stock/<op>` runs it and answers with
//! the outcome, `POST /stock/<op>/request` only validates it and queues it on
//! the bus for the dispatcher (`202 Accepted`).

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use bus::Publisher;
use domain::{
    CommandKind, ProductQuantity, ReserveStock, StockCommand, StockOperation, TransferStock,
};
use ledger::{
    GroupId, LedgerStore, OrderId, OrderWarehouseAllocation, ProductId, StockCell, StockScope,
    WarehouseId,
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::response::ApiResponse;

/// Warehouse selection shared by the availability queries.
///
/// `warehouse_ids` wins over `group_id`; with neither, every active
/// warehouse counts.
#[derive(Debug, Default, Deserialize)]
pub struct ScopeRequest {
    #[serde(default, alias = "shop_id")]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub warehouse_ids: Option<Vec<WarehouseId>>,
}

impl ScopeRequest {
    fn scope(self) -> StockScope {
        match (self.warehouse_ids, self.group_id) {
            (Some(ids), _) => StockScope::Warehouses(ids),
            (None, Some(group_id)) => StockScope::Group(group_id),
            (None, None) => StockScope::AllActive,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AvailableStockRequest {
    pub product_id: ProductId,
    #[serde(flatten)]
    pub scope: ScopeRequest,
}

#[derive(Debug, Serialize)]
pub struct AvailableStockResponse {
    pub product_id: ProductId,
    pub available_stock: i64,
}

#[derive(Debug, Deserialize)]
pub struct BulkAvailableStockRequest {
    pub product_ids: Vec<ProductId>,
    #[serde(flatten)]
    pub scope: ScopeRequest,
}

#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub order_id: OrderId,
    pub already_applied: bool,
    pub allocations: Vec<OrderWarehouseAllocation>,
}

/// POST /stock/available: sum of available stock over active warehouses.
#[tracing::instrument(skip(state))]
pub async fn available<L: LedgerStore + 'static, P: Publisher + 'static>(
    State(state): State<Arc<AppState<L, P>>>,
    Json(req): Json<AvailableStockRequest>,
) -> Result<Json<ApiResponse<AvailableStockResponse>>, ApiError> {
    let available_stock = state
        .coordinator
        .available_stock(req.product_id, &req.scope.scope())
        .await?;
    Ok(Json(ApiResponse::new(
        "get available stock success",
        AvailableStockResponse {
            product_id: req.product_id,
            available_stock,
        },
    )))
}

/// POST /stock/available/bulk: [`available`] for several products at once.
#[tracing::instrument(skip(state))]
pub async fn available_bulk<L: LedgerStore + 'static, P: Publisher + 'static>(
    State(state): State<Arc<AppState<L, P>>>,
    Json(req): Json<BulkAvailableStockRequest>,
) -> Result<Json<ApiResponse<BTreeMap<ProductId, i64>>>, ApiError> {
    if req.product_ids.is_empty() {
        return Err(ApiError::BadRequest("product_ids must not be empty".into()));
    }
    let totals = state
        .coordinator
        .available_stock_bulk(&req.product_ids, &req.scope.scope())
        .await?;
    Ok(Json(ApiResponse::new("get available stock success", totals)))
}

/// POST /stock/transfer
#[tracing::instrument(skip(state))]
pub async fn transfer<L: LedgerStore + 'static, P: Publisher + 'static>(
    State(state): State<Arc<AppState<L, P>>>,
    Json(cmd): Json<TransferStock>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.coordinator.transfer(cmd).await?;
    Ok(Json(ApiResponse::message("stock is transferred")))
}

/// POST /stock/add
#[tracing::instrument(skip(state))]
pub async fn add<L: LedgerStore + 'static, P: Publisher + 'static>(
    State(state): State<Arc<AppState<L, P>>>,
    Json(cmd): Json<StockOperation>,
) -> Result<Json<ApiResponse<StockCell>>, ApiError> {
    let cell = state.coordinator.add_stock(cmd).await?;
    Ok(Json(ApiResponse::new("stock is added", cell)))
}

/// POST /stock/deduct
#[tracing::instrument(skip(state))]
pub async fn deduct<L: LedgerStore + 'static, P: Publisher + 'static>(
    State(state): State<Arc<AppState<L, P>>>,
    Json(cmd): Json<StockOperation>,
) -> Result<Json<ApiResponse<StockCell>>, ApiError> {
    let cell = state.coordinator.deduct_stock(cmd).await?;
    Ok(Json(ApiResponse::new("stock is deducted", cell)))
}

/// POST /stock/release: consume reserved stock of one cell.
#[tracing::instrument(skip(state))]
pub async fn release<L: LedgerStore + 'static, P: Publisher + 'static>(
    State(state): State<Arc<AppState<L, P>>>,
    Json(cmd): Json<StockOperation>,
) -> Result<Json<ApiResponse<StockCell>>, ApiError> {
    let cell = state.coordinator.release_reserved(cmd).await?;
    Ok(Json(ApiResponse::new("reserved stock is released", cell)))
}

/// POST /stock/return: give reserved stock back to available.
#[tracing::instrument(skip(state))]
pub async fn return_reserved<L: LedgerStore + 'static, P: Publisher + 'static>(
    State(state): State<Arc<AppState<L, P>>>,
    Json(lines): Json<Vec<ProductQuantity>>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.coordinator.return_reserved(&lines).await?;
    Ok(Json(ApiResponse::message("reserved stock is returned")))
}

/// POST /stock/reserve: reserve an order; 422 and a published cancel if it
/// cannot be covered.
#[tracing::instrument(skip(state, cmd), fields(order_id = %cmd.order_id))]
pub async fn reserve<L: LedgerStore + 'static, P: Publisher + 'static>(
    State(state): State<Arc<AppState<L, P>>>,
    Json(cmd): Json<ReserveStock>,
) -> Result<Json<ApiResponse<ReservationResponse>>, ApiError> {
    let reservation = state.coordinator.reserve(&cmd).await?;
    Ok(Json(ApiResponse::new(
        "stock is reserved",
        ReservationResponse {
            order_id: reservation.order_id,
            already_applied: reservation.already_applied,
            allocations: reservation.allocations,
        },
    )))
}

/// POST /stock/:operation/request: queue a command for the dispatcher.
#[tracing::instrument(skip(state, data))]
pub async fn request<L: LedgerStore + 'static, P: Publisher + 'static>(
    State(state): State<Arc<AppState<L, P>>>,
    Path(operation): Path<String>,
    Json(data): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<ApiResponse<()>>), ApiError> {
    let kind = CommandKind::from_topic(&format!("stock.{operation}"))
        .ok_or_else(|| ApiError::NotFound(format!("Unknown stock operation '{operation}'")))?;
    let command = StockCommand::decode(kind, data)?;

    state.coordinator.request(command).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::message(format!("{kind} request accepted"))),
    ))
}
