//! Trigger API Handler
//!
//! Entry point for new datasource data. The message consumer that normally
//! delivers triggers is not part of this service.

use axum::{Json, extract::State};
use serde_json::Value;
use sluice_core::dto::trigger::TriggerRequest;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::PipelineOutcome;

/// POST /trigger
pub async fn trigger_configs(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Vec<PipelineOutcome>>> {
    let request = TriggerRequest::from_json(body).map_err(ApiError::BadRequest)?;
    tracing::info!("Trigger received for datasource {}", request.datasource_id);

    let outcomes = state
        .manager
        .trigger_config(request.datasource_id, request.data)
        .await?;
    Ok(Json(outcomes))
}
