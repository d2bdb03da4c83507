//! Execution API Handlers
//!
//! Runs a transformation directly, without persisting anything.

use axum::{Json, extract::State};
use serde_json::{Value, json};
use sluice_core::domain::job::JobResult;
use sluice_core::dto::execution::ExecutionRequest;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// POST /job
///
/// Responds with the job result: `data` on success, a structured `error`
/// otherwise. Both carry `stats`.
pub async fn execute_job(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<Json<JobResult>> {
    let request = ExecutionRequest::from_json(body).map_err(ApiError::BadRequest)?;
    let executor = state.manager.executor().clone();

    let result =
        tokio::task::spawn_blocking(move || executor.execute_job(&request.func, &request.data))
            .await
            .map_err(|e| ApiError::Internal(format!("Execution task failed: {}", e)))?;

    tracing::debug!(
        "Ad-hoc job finished in {:.2}ms, success: {}",
        result.stats().duration_in_milli_seconds,
        result.is_success()
    );
    Ok(Json(result))
}

/// GET /version
pub async fn version(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "version": state.manager.executor().version() }))
}
