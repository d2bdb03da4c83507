//! Transformed Data API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use sluice_core::domain::transformed_data::TransformedData;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// GET /transdata/{id}
pub async fn get_transformed_data(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<TransformedData>> {
    tracing::debug!("Getting transformed data: {}", id);
    Ok(Json(state.transformed_data.get(id).await?))
}

/// GET /transdata/pipeline/{pipeline_id}
pub async fn list_by_pipeline(
    State(state): State<AppState>,
    Path(pipeline_id): Path<i64>,
) -> ApiResult<Json<Vec<TransformedData>>> {
    tracing::debug!("Listing transformed data for pipeline: {}", pipeline_id);
    Ok(Json(
        state.transformed_data.get_by_pipeline_id(pipeline_id).await?,
    ))
}

/// GET /transdata/pipeline/{pipeline_id}/latest
pub async fn get_latest(
    State(state): State<AppState>,
    Path(pipeline_id): Path<i64>,
) -> ApiResult<Json<TransformedData>> {
    tracing::debug!("Getting latest transformed data for pipeline: {}", pipeline_id);
    Ok(Json(state.transformed_data.get_latest(pipeline_id).await?))
}
