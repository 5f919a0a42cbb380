//! Warehouse administration endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use bus::Publisher;
use domain::RegisterWarehouse;
use ledger::{LedgerStore, Warehouse, WarehouseId};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;
use crate::response::ApiResponse;

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// POST /warehouses: register a warehouse; it starts active.
#[tracing::instrument(skip(state, req))]
pub async fn register<L: LedgerStore + 'static, P: Publisher + 'static>(
    State(state): State<Arc<AppState<L, P>>>,
    Json(req): Json<RegisterWarehouse>,
) -> Result<(StatusCode, Json<ApiResponse<Warehouse>>), ApiError> {
    let warehouse = state.warehouses.register(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new("warehouse registered", warehouse)),
    ))
}

/// GET /warehouses/:id
#[tracing::instrument(skip(state))]
pub async fn get<L: LedgerStore + 'static, P: Publisher + 'static>(
    State(state): State<Arc<AppState<L, P>>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Warehouse>>, ApiError> {
    let warehouse = state
        .warehouses
        .get(WarehouseId::new(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Warehouse {id} not found")))?;
    Ok(Json(ApiResponse::new("warehouse found", warehouse)))
}

/// PUT /warehouses/:id/status: set `active` or `inactive`.
#[tracing::instrument(skip(state, req))]
pub async fn update_status<L: LedgerStore + 'static, P: Publisher + 'static>(
    State(state): State<Arc<AppState<L, P>>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<Warehouse>>, ApiError> {
    let warehouse = state
        .warehouses
        .update_status(WarehouseId::new(id), &req.status)
        .await?;
    Ok(Json(ApiResponse::new("warehouse status updated", warehouse)))
}
