use async_trait::async_trait;
use serde_json::Value;
use sluice_core::domain::pipeline::PipelineConfig;
use sluice_core::domain::transformed_data::{TransformedData, TransformedDataDto};
use sluice_core::dto::pipeline::PipelineConfigDto;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{Store, StoreError, StoreTransaction};
use crate::repository::{
    outbox_repository, pipeline_config_repository, transformed_data_repository,
};

/// [`Store`] backed by a Postgres pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTransaction { tx }))
    }
}

pub struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn insert_config(
        &mut self,
        dto: &PipelineConfigDto,
    ) -> Result<PipelineConfig, StoreError> {
        Ok(pipeline_config_repository::insert(&mut self.tx, dto).await?)
    }

    async fn find_config(&mut self, id: i64) -> Result<Option<PipelineConfig>, StoreError> {
        Ok(pipeline_config_repository::find_by_id(&mut self.tx, id).await?)
    }

    async fn list_configs(&mut self) -> Result<Vec<PipelineConfig>, StoreError> {
        Ok(pipeline_config_repository::list_all(&mut self.tx).await?)
    }

    async fn list_configs_by_datasource(
        &mut self,
        datasource_id: i64,
    ) -> Result<Vec<PipelineConfig>, StoreError> {
        Ok(pipeline_config_repository::list_by_datasource(&mut self.tx, datasource_id).await?)
    }

    async fn update_config(
        &mut self,
        id: i64,
        dto: &PipelineConfigDto,
    ) -> Result<Option<PipelineConfig>, StoreError> {
        Ok(pipeline_config_repository::update(&mut self.tx, id, dto).await?)
    }

    async fn delete_config(&mut self, id: i64) -> Result<Option<PipelineConfig>, StoreError> {
        Ok(pipeline_config_repository::delete(&mut self.tx, id).await?)
    }

    async fn delete_all_configs(&mut self) -> Result<Vec<PipelineConfig>, StoreError> {
        Ok(pipeline_config_repository::delete_all(&mut self.tx).await?)
    }

    async fn insert_transformed_data(
        &mut self,
        dto: &TransformedDataDto,
    ) -> Result<TransformedData, StoreError> {
        Ok(transformed_data_repository::insert(&mut self.tx, dto).await?)
    }

    async fn find_transformed_data(
        &mut self,
        id: i64,
    ) -> Result<Option<TransformedData>, StoreError> {
        Ok(transformed_data_repository::find_by_id(&mut self.tx, id).await?)
    }

    async fn latest_transformed_data(
        &mut self,
        pipeline_id: i64,
    ) -> Result<Option<TransformedData>, StoreError> {
        Ok(transformed_data_repository::find_latest_by_pipeline(&mut self.tx, pipeline_id).await?)
    }

    async fn list_transformed_data(
        &mut self,
        pipeline_id: i64,
    ) -> Result<Vec<TransformedData>, StoreError> {
        Ok(transformed_data_repository::list_by_pipeline(&mut self.tx, pipeline_id).await?)
    }

    async fn insert_event(
        &mut self,
        routing_key: &str,
        payload: &Value,
    ) -> Result<Uuid, StoreError> {
        Ok(outbox_repository::insert(&mut self.tx, routing_key, payload).await?)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
