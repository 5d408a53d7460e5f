use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::info;

use replenish_procurement::OrderId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub async fn list_policies(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::PolicyQuery>,
) -> Result<impl IntoResponse, errors::ApiError> {
    Ok(Json(services.policies(&query.filter())?))
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::OrderQuery>,
) -> Result<impl IntoResponse, errors::ApiError> {
    Ok(Json(services.orders(query.product, query.all)?))
}

pub async fn change_order_quantity(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<OrderId>,
    Json(body): Json<dto::ChangeQuantityRequest>,
) -> Result<impl IntoResponse, errors::ApiError> {
    info!(order = %id, quantity = body.quantity, "order quantity change requested");
    Ok(Json(services.change_order_quantity(id, body.quantity)?))
}

/// Plan every matching reorder policy and report per chunk.
pub async fn run(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::RunReplenishmentRequest>, JsonRejection>,
) -> Response {
    // A bare POST plans everything with the server defaults.
    let body = match body {
        Ok(Json(body)) => body,
        Err(JsonRejection::MissingJsonContentType(_)) => dto::RunReplenishmentRequest::default(),
        Err(rejection) => return rejection.into_response(),
    };
    let config = match body.config(services.config()) {
        Ok(config) => config,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
    };
    info!(
        products = ?body.products.as_ref().map(Vec::len),
        commit_mode = ?config.commit_mode,
        "replenishment run requested"
    );

    match services.run_replenishment(body.filter(), config).await {
        Ok(report) => {
            let status = if report.failed_chunks().next().is_some() {
                StatusCode::MULTI_STATUS
            } else {
                StatusCode::OK
            };
            (status, Json(report)).into_response()
        }
        Err(e) => e.into_response(),
    }
}
