//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{ErrorClass, StockError};
use saga::SagaError;

use crate::response::ApiResponse;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Stock or warehouse error.
    Stock(StockError),
    /// Coordinator error.
    Saga(SagaError),
}

impl ApiError {
    fn class(&self) -> ErrorClass {
        match self {
            ApiError::NotFound(_) => ErrorClass::NotFound,
            ApiError::BadRequest(_) => ErrorClass::Validation,
            ApiError::Stock(err) => err.class(),
            ApiError::Saga(err) => err.class(),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Stock(err) => err.to_string(),
            ApiError::Saga(err) => err.to_string(),
        }
    }
}

/// HTTP status for an error class.
pub fn status_for(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::Validation => StatusCode::BAD_REQUEST,
        ErrorClass::NotFound => StatusCode::NOT_FOUND,
        ErrorClass::Conflict | ErrorClass::InvalidState => StatusCode::CONFLICT,
        ErrorClass::InsufficientStock => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorClass::Transient => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.class());
        let message = self.message();

        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }

        (status, axum::Json(ApiResponse::<()>::message(message))).into_response()
    }
}

impl From<StockError> for ApiError {
    fn from(err: StockError) -> Self {
        ApiError::Stock(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::{LedgerError, ProductId, WarehouseId};

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorClass::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorClass::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorClass::Conflict), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorClass::InvalidState), StatusCode::CONFLICT);
        assert_eq!(
            status_for(ErrorClass::InsufficientStock),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(ErrorClass::Transient),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_saga_errors_use_their_class() {
        let insufficient = ApiError::from(SagaError::Stock(StockError::InsufficientStock {
            product_id: ProductId::new(1),
            warehouse_id: Some(WarehouseId::new(2)),
            requested: 5,
            available: 1,
        }));
        assert_eq!(
            insufficient.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let unavailable = ApiError::from(SagaError::Ledger(LedgerError::Unavailable(
            "db down".into(),
        )));
        assert_eq!(
            unavailable.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
