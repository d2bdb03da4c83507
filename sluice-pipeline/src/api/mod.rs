//! API Module
//!
//! HTTP API layer. Handlers validate request bodies and delegate to the
//! services; all behavior lives below this layer.

pub mod error;
pub mod execution;
pub mod health;
pub mod pipeline_config;
pub mod transformed_data;
pub mod trigger;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::service::{PipelineConfigManager, TransformedDataService};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub manager: PipelineConfigManager,
    pub transformed_data: TransformedDataService,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/version", get(execution::version))
        // Pipeline config endpoints
        .route(
            "/configs",
            get(pipeline_config::list_configs)
                .post(pipeline_config::create_config)
                .delete(pipeline_config::delete_all_configs),
        )
        .route(
            "/configs/{id}",
            get(pipeline_config::get_config)
                .put(pipeline_config::update_config)
                .delete(pipeline_config::delete_config),
        )
        // Execution endpoints
        .route("/job", post(execution::execute_job))
        .route("/trigger", post(trigger::trigger_configs))
        // Transformed data endpoints
        .route("/transdata/{id}", get(transformed_data::get_transformed_data))
        .route(
            "/transdata/pipeline/{pipeline_id}",
            get(transformed_data::list_by_pipeline),
        )
        .route(
            "/transdata/pipeline/{pipeline_id}/latest",
            get(transformed_data::get_latest),
        )
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
