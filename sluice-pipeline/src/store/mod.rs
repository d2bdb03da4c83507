//! Transactional store
//!
//! Every manager operation opens its own [`StoreTransaction`], performs its
//! reads and writes through it and commits once. A transaction dropped
//! without [`StoreTransaction::commit`] is rolled back, so a change and the
//! outbox event announcing it are persisted together or not at all.

#[cfg(test)]
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;
use sluice_core::domain::pipeline::PipelineConfig;
use sluice_core::domain::transformed_data::{TransformedData, TransformedDataDto};
use sluice_core::dto::pipeline::PipelineConfigDto;
use thiserror::Error;
use uuid::Uuid;

pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

/// Repository operations scoped to one transaction
#[async_trait]
pub trait StoreTransaction: Send {
    async fn insert_config(&mut self, dto: &PipelineConfigDto)
    -> Result<PipelineConfig, StoreError>;

    async fn find_config(&mut self, id: i64) -> Result<Option<PipelineConfig>, StoreError>;

    async fn list_configs(&mut self) -> Result<Vec<PipelineConfig>, StoreError>;

    async fn list_configs_by_datasource(
        &mut self,
        datasource_id: i64,
    ) -> Result<Vec<PipelineConfig>, StoreError>;

    /// Full replacement; `None` when no config has `id`
    async fn update_config(
        &mut self,
        id: i64,
        dto: &PipelineConfigDto,
    ) -> Result<Option<PipelineConfig>, StoreError>;

    async fn delete_config(&mut self, id: i64) -> Result<Option<PipelineConfig>, StoreError>;

    async fn delete_all_configs(&mut self) -> Result<Vec<PipelineConfig>, StoreError>;

    async fn insert_transformed_data(
        &mut self,
        dto: &TransformedDataDto,
    ) -> Result<TransformedData, StoreError>;

    async fn find_transformed_data(&mut self, id: i64)
    -> Result<Option<TransformedData>, StoreError>;

    async fn latest_transformed_data(
        &mut self,
        pipeline_id: i64,
    ) -> Result<Option<TransformedData>, StoreError>;

    /// Newest first
    async fn list_transformed_data(
        &mut self,
        pipeline_id: i64,
    ) -> Result<Vec<TransformedData>, StoreError>;

    async fn insert_event(&mut self, routing_key: &str, payload: &Value)
    -> Result<Uuid, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
