//! HTTP API for the warehouse stock service.
//!
//! Provides REST endpoints for warehouse administration, stock registration,
//! availability queries, and the stock operations (run synchronously or
//! queued on the bus), with structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod response;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use bus::Publisher;
use domain::WarehouseService;
use ledger::LedgerStore;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::StockCoordinator;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<L: LedgerStore, P: Publisher> {
    pub warehouses: WarehouseService<L>,
    /// Shared with the dispatcher so both entry points run the same code.
    pub coordinator: Arc<StockCoordinator<L, P>>,
}

impl<L, P> AppState<L, P>
where
    L: LedgerStore + Clone,
    P: Publisher,
{
    pub fn new(store: L, publisher: P) -> Self {
        Self {
            warehouses: WarehouseService::new(store.clone()),
            coordinator: Arc::new(StockCoordinator::new(store, publisher)),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<L, P>(state: Arc<AppState<L, P>>, metrics_handle: PrometheusHandle) -> Router
where
    L: LedgerStore + 'static,
    P: Publisher + 'static,
{
    use routes::{orders, product_warehouses, stock, system, warehouses};

    let metrics_router = Router::new()
        .route("/metrics", get(system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(system::health))
        .route("/warehouses", post(warehouses::register::<L, P>))
        .route("/warehouses/{id}", get(warehouses::get::<L, P>))
        .route("/warehouses/{id}/status", put(warehouses::update_status::<L, P>))
        .route("/product-warehouses", post(product_warehouses::register::<L, P>))
        .route(
            "/product-warehouses/{product_id}/{warehouse_id}",
            get(product_warehouses::get::<L, P>),
        )
        .route("/stock/available", post(stock::available::<L, P>))
        .route("/stock/available/bulk", post(stock::available_bulk::<L, P>))
        .route("/stock/transfer", post(stock::transfer::<L, P>))
        .route("/stock/add", post(stock::add::<L, P>))
        .route("/stock/deduct", post(stock::deduct::<L, P>))
        .route("/stock/release", post(stock::release::<L, P>))
        .route("/stock/return", post(stock::return_reserved::<L, P>))
        .route("/stock/reserve", post(stock::reserve::<L, P>))
        .route("/stock/{operation}/request", post(stock::request::<L, P>))
        .route("/orders/{id}/allocations", get(orders::allocations::<L, P>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
