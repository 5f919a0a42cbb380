//! Stock cell registration and lookup.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use bus::Publisher;
use ledger::{LedgerStore, ProductId, StockCell, WarehouseId};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;
use crate::response::ApiResponse;

#[derive(Debug, Deserialize)]
pub struct RegisterStockRequest {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    #[serde(default)]
    pub available_stock: i64,
}

/// POST /product-warehouses: create the stock cell of a product in a warehouse.
#[tracing::instrument(skip(state))]
pub async fn register<L: LedgerStore + 'static, P: Publisher + 'static>(
    State(state): State<Arc<AppState<L, P>>>,
    Json(req): Json<RegisterStockRequest>,
) -> Result<(StatusCode, Json<ApiResponse<StockCell>>), ApiError> {
    let cell = state
        .coordinator
        .register_stock(req.product_id, req.warehouse_id, req.available_stock)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new("product warehouse registered", cell)),
    ))
}

/// GET /product-warehouses/:product_id/:warehouse_id
#[tracing::instrument(skip(state))]
pub async fn get<L: LedgerStore + 'static, P: Publisher + 'static>(
    State(state): State<Arc<AppState<L, P>>>,
    Path((product_id, warehouse_id)): Path<(i64, i64)>,
) -> Result<Json<ApiResponse<StockCell>>, ApiError> {
    let cell = state
        .coordinator
        .get_cell(ProductId::new(product_id), WarehouseId::new(warehouse_id))
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "No stock for product {product_id} in warehouse {warehouse_id}"
            ))
        })?;
    Ok(Json(ApiResponse::new("product warehouse found", cell)))
}
