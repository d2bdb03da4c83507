//! Pipeline Config API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::Value;
use sluice_core::domain::pipeline::PipelineConfig;
use sluice_core::dto::pipeline::PipelineConfigDto;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub datasource_id: Option<i64>,
}

/// POST /configs
pub async fn create_config(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<PipelineConfig>)> {
    let dto = PipelineConfigDto::from_json(body).map_err(ApiError::BadRequest)?;
    tracing::info!("Creating pipeline config: {}", dto.metadata.display_name);

    let config = state.manager.create(dto).await?;
    Ok((StatusCode::CREATED, Json(config)))
}

/// GET /configs, optionally filtered with `?datasourceId=`
pub async fn list_configs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<PipelineConfig>>> {
    let configs = match query.datasource_id {
        Some(datasource_id) => {
            tracing::debug!("Listing pipeline configs for datasource {}", datasource_id);
            state.manager.get_by_datasource_id(datasource_id).await?
        }
        None => {
            tracing::debug!("Listing all pipeline configs");
            state.manager.get_all().await?
        }
    };

    Ok(Json(configs))
}

/// GET /configs/{id}
pub async fn get_config(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<PipelineConfig>> {
    tracing::debug!("Getting pipeline config: {}", id);

    state
        .manager
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Pipeline config {} not found", id)))
}

/// PUT /configs/{id}
pub async fn update_config(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Json<PipelineConfig>> {
    let dto = PipelineConfigDto::from_json(body).map_err(ApiError::BadRequest)?;
    tracing::info!("Updating pipeline config: {}", id);

    let config = state.manager.update(id, dto).await?;
    Ok(Json(config))
}

/// DELETE /configs/{id}
pub async fn delete_config(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting pipeline config: {}", id);

    state.manager.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /configs
pub async fn delete_all_configs(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<PipelineConfig>>> {
    tracing::info!("Deleting all pipeline configs");

    let deleted = state.manager.delete_all().await?;
    Ok(Json(deleted))
}
