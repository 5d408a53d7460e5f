use std::sync::Arc;

use axum::{Json, extract::Extension, response::IntoResponse};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

/// Projected stock of one product at one location.
pub async fn compute(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::ProjectionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let points = services.projection(&body.to_query())?;
    Ok(Json(dto::ProjectionResponse {
        product: body.product,
        location: body.location,
        points,
    }))
}
