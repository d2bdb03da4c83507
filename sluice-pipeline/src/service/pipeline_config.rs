//! Pipeline Config Manager
//!
//! CRUD over pipeline configs with event emission, and trigger-driven
//! execution of every config bound to a datasource. Each mutation and each
//! pipeline outcome is written in its own transaction together with the
//! outbox event announcing it.

use serde::Serialize;
use serde_json::Value;
use sluice_core::domain::job::{JobErrorKind, JobResult};
use sluice_core::domain::outbox::{DomainEvent, RoutingKeys};
use sluice_core::domain::pipeline::PipelineConfig;
use sluice_core::domain::transformed_data::{HealthStatus, TransformedDataDto};
use sluice_core::dto::pipeline::PipelineConfigDto;
use sluice_lua::PipelineExecutor;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use uuid::Uuid;

use super::validator::Validator;
use super::{Result, ServiceError};
use crate::store::{Store, StoreTransaction};

const ENTITY: &str = "Pipeline config";

/// What happened to one pipeline during a trigger
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PipelineOutcome {
    /// Data persisted and `executionSuccess` emitted
    Succeeded {
        pipeline_id: i64,
        transformed_data_id: i64,
        health_status: HealthStatus,
    },
    /// The transformation failed and `executionError` was emitted
    Failed {
        pipeline_id: i64,
        error_name: JobErrorKind,
    },
    /// Recording the outcome failed; nothing was persisted
    Aborted { pipeline_id: i64, reason: String },
}

impl PipelineOutcome {
    pub fn pipeline_id(&self) -> i64 {
        match self {
            PipelineOutcome::Succeeded { pipeline_id, .. }
            | PipelineOutcome::Failed { pipeline_id, .. }
            | PipelineOutcome::Aborted { pipeline_id, .. } => *pipeline_id,
        }
    }
}

#[derive(Clone)]
pub struct PipelineConfigManager {
    store: Arc<dyn Store>,
    executor: Arc<PipelineExecutor>,
    validator: Arc<dyn Validator>,
    routing_keys: Arc<RoutingKeys>,
}

impl PipelineConfigManager {
    pub fn new(
        store: Arc<dyn Store>,
        executor: Arc<PipelineExecutor>,
        validator: Arc<dyn Validator>,
        routing_keys: RoutingKeys,
    ) -> Self {
        Self {
            store,
            executor,
            validator,
            routing_keys: Arc::new(routing_keys),
        }
    }

    pub fn executor(&self) -> &Arc<PipelineExecutor> {
        &self.executor
    }

    async fn append_event(
        &self,
        tx: &mut dyn StoreTransaction,
        event: DomainEvent,
    ) -> Result<Uuid> {
        let routing_key = self.routing_keys.for_kind(event.kind());
        let id = tx.insert_event(routing_key, &event.payload()).await?;
        tracing::debug!("Outbox event {} queued on {}", id, routing_key);
        Ok(id)
    }

    /// Create a new config and announce it
    pub async fn create(&self, dto: PipelineConfigDto) -> Result<PipelineConfig> {
        let mut tx = self.store.begin().await?;
        let config = tx.insert_config(&dto).await?;
        self.append_event(
            tx.as_mut(),
            DomainEvent::ConfigCreated {
                pipeline_id: config.id,
                pipeline_name: config.metadata.display_name.clone(),
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            "Pipeline config created: {} ({})",
            config.metadata.display_name,
            config.id
        );
        Ok(config)
    }

    /// Get a config by ID; `None` when absent
    pub async fn get(&self, id: i64) -> Result<Option<PipelineConfig>> {
        let mut tx = self.store.begin().await?;
        let config = tx.find_config(id).await?;
        tx.commit().await?;
        Ok(config)
    }

    pub async fn get_all(&self) -> Result<Vec<PipelineConfig>> {
        let mut tx = self.store.begin().await?;
        let configs = tx.list_configs().await?;
        tx.commit().await?;
        Ok(configs)
    }

    pub async fn get_by_datasource_id(&self, datasource_id: i64) -> Result<Vec<PipelineConfig>> {
        let mut tx = self.store.begin().await?;
        let configs = tx.list_configs_by_datasource(datasource_id).await?;
        tx.commit().await?;
        Ok(configs)
    }

    /// Replace a config and announce it
    pub async fn update(&self, id: i64, dto: PipelineConfigDto) -> Result<PipelineConfig> {
        let mut tx = self.store.begin().await?;
        let config = tx
            .update_config(id, &dto)
            .await?
            .ok_or(ServiceError::NotFound { entity: ENTITY, id })?;
        self.append_event(
            tx.as_mut(),
            DomainEvent::ConfigUpdated {
                pipeline_id: config.id,
                pipeline_name: config.metadata.display_name.clone(),
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!("Pipeline config updated: {}", id);
        Ok(config)
    }

    /// Delete a config and announce it
    pub async fn delete(&self, id: i64) -> Result<PipelineConfig> {
        let mut tx = self.store.begin().await?;
        let config = tx
            .delete_config(id)
            .await?
            .ok_or(ServiceError::NotFound { entity: ENTITY, id })?;
        self.append_event(
            tx.as_mut(),
            DomainEvent::ConfigDeleted {
                pipeline_id: config.id,
                pipeline_name: config.metadata.display_name.clone(),
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!("Pipeline config deleted: {}", id);
        Ok(config)
    }

    /// Delete every config, announcing each deletion
    pub async fn delete_all(&self) -> Result<Vec<PipelineConfig>> {
        let mut tx = self.store.begin().await?;
        let configs = tx.delete_all_configs().await?;
        for config in &configs {
            self.append_event(
                tx.as_mut(),
                DomainEvent::ConfigDeleted {
                    pipeline_id: config.id,
                    pipeline_name: config.metadata.display_name.clone(),
                },
            )
            .await?;
        }
        tx.commit().await?;

        tracing::info!("Deleted {} pipeline configs", configs.len());
        Ok(configs)
    }

    /// Run every config bound to `datasource_id` against `data`
    ///
    /// Pipelines run concurrently and independently: a failing
    /// transformation, or a failure to record one pipeline's outcome, never
    /// affects the others. Outcomes are returned in completion order.
    ///
    /// The work runs on its own task. Once this future has been polled,
    /// dropping it does not stop any pipeline from running to completion and
    /// recording its outcome.
    pub async fn trigger_config(
        &self,
        datasource_id: i64,
        data: Value,
    ) -> Result<Vec<PipelineOutcome>> {
        let manager = self.clone();
        tokio::spawn(async move { manager.run_bound_pipelines(datasource_id, data).await })
            .await
            .map_err(ServiceError::Interrupted)?
    }

    async fn run_bound_pipelines(
        &self,
        datasource_id: i64,
        data: Value,
    ) -> Result<Vec<PipelineOutcome>> {
        let configs = self.get_by_datasource_id(datasource_id).await?;
        tracing::info!(
            "Triggering {} pipeline(s) for datasource {}",
            configs.len(),
            datasource_id
        );

        let data = Arc::new(data);
        let mut tasks = JoinSet::new();
        let mut pipeline_ids = HashMap::new();
        for config in configs {
            let pipeline_id = config.id;
            let manager = self.clone();
            let data = data.clone();
            let handle = tasks.spawn(async move { manager.run_pipeline(config, data).await });
            pipeline_ids.insert(handle.id(), pipeline_id);
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            let outcome = match joined {
                Ok((_, outcome)) => outcome,
                Err(e) => {
                    let pipeline_id = pipeline_ids.get(&e.id()).copied().unwrap_or_default();
                    tracing::error!("Pipeline {} task did not complete: {}", pipeline_id, e);
                    PipelineOutcome::Aborted {
                        pipeline_id,
                        reason: format!("pipeline task did not complete: {}", e),
                    }
                }
            };
            tracing::debug!("Pipeline {} finished: {:?}", outcome.pipeline_id(), outcome);
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    async fn run_pipeline(&self, config: PipelineConfig, data: Arc<Value>) -> PipelineOutcome {
        let pipeline_id = config.id;
        let executor = self.executor.clone();
        let func = config.transformation.func.clone();
        let span = tracing::info_span!("pipeline", pipeline_id);

        let result = match tokio::task::spawn_blocking(move || {
            span.in_scope(|| executor.execute_job(&func, &data))
        })
        .await
        {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Execution of pipeline {} did not complete: {}", pipeline_id, e);
                return PipelineOutcome::Aborted {
                    pipeline_id,
                    reason: format!("execution did not complete: {}", e),
                };
            }
        };

        match self.record_outcome(&config, result).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    "Failed to record outcome of pipeline {}, rolled back: {}",
                    pipeline_id,
                    e
                );
                PipelineOutcome::Aborted {
                    pipeline_id,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Classifies `data` on a blocking thread
    ///
    /// A validator that panics downgrades the data to a warning instead of
    /// losing it.
    async fn validate(&self, config: &PipelineConfig, data: Value) -> TransformedDataDto {
        let validator = self.validator.clone();
        let owned = config.clone();
        let fallback = data.clone();

        match tokio::task::spawn_blocking(move || validator.validate(&owned, data)).await {
            Ok(dto) => dto,
            Err(e) => {
                tracing::error!(
                    "Validation of pipeline {} did not complete, data marked as {}: {}",
                    config.id,
                    HealthStatus::Warning,
                    e
                );
                TransformedDataDto {
                    pipeline_id: config.id,
                    health_status: HealthStatus::Warning,
                    data: fallback,
                    schema: config.schema.clone(),
                }
            }
        }
    }

    /// Persists one pipeline's result and its event in a single transaction
    async fn record_outcome(
        &self,
        config: &PipelineConfig,
        result: JobResult,
    ) -> Result<PipelineOutcome> {
        let pipeline_name = config.metadata.display_name.clone();

        match result {
            JobResult::Success { data, stats } => {
                let dto = self.validate(config, data).await;

                let mut tx = self.store.begin().await?;
                let row = tx.insert_transformed_data(&dto).await?;
                self.append_event(
                    tx.as_mut(),
                    DomainEvent::ExecutionSuccess {
                        pipeline_id: config.id,
                        pipeline_name,
                        data: dto.data,
                        schema: dto.schema,
                    },
                )
                .await?;
                tx.commit().await?;

                tracing::info!(
                    "Pipeline {} produced {} data in {:.2}ms",
                    config.id,
                    row.health_status,
                    stats.duration_in_milli_seconds
                );
                Ok(PipelineOutcome::Succeeded {
                    pipeline_id: config.id,
                    transformed_data_id: row.id,
                    health_status: row.health_status,
                })
            }
            JobResult::Failure { error, .. } => {
                let mut tx = self.store.begin().await?;
                self.append_event(
                    tx.as_mut(),
                    DomainEvent::ExecutionError {
                        pipeline_id: config.id,
                        pipeline_name,
                        error: error.message.clone(),
                    },
                )
                .await?;
                tx.commit().await?;

                tracing::warn!("Pipeline {} failed: {}", config.id, error);
                Ok(PipelineOutcome::Failed {
                    pipeline_id: config.id,
                    error_name: error.name,
                })
            }
        }
    }
}
