use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use replenish_core::DomainError;
use replenish_infra::{BatchError, WarehouseError};
use replenish_planning::PlanningError;

/// Everything a handler can fail with.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
    #[error(transparent)]
    Planning(#[from] PlanningError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Warehouse(e) => warehouse_error_to_response(e),
            ApiError::Planning(e) => planning_error_to_response(e),
            ApiError::Batch(BatchError::Warehouse(e)) => warehouse_error_to_response(e),
            ApiError::Batch(e) => {
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "batch_error", e.to_string())
            }
            ApiError::BadRequest(msg) => json_error(StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Internal(msg) => {
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    let message = err.to_string();
    match err {
        DomainError::Validation(_) | DomainError::InvalidId(_) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", message)
        }
        DomainError::InvariantViolation(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", message)
        }
        DomainError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", message),
        DomainError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
    }
}

pub fn warehouse_error_to_response(err: WarehouseError) -> Response {
    let message = err.to_string();
    match err {
        WarehouseError::Domain(e) => domain_error_to_response(e),
        WarehouseError::Conflict { .. } => json_error(StatusCode::CONFLICT, "conflict", message),
        WarehouseError::Unavailable(_) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
        }
        WarehouseError::Snapshot(_) => json_error(StatusCode::BAD_REQUEST, "invalid_snapshot", message),
        WarehouseError::Poisoned => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", message)
        }
    }
}

pub fn planning_error_to_response(err: PlanningError) -> Response {
    let message = err.to_string();
    match err {
        PlanningError::Domain(e) => domain_error_to_response(e),
        PlanningError::Convergence { .. } => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "convergence_error", message)
        }
        PlanningError::Transient(_) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
