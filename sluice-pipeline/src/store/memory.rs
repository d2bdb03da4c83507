//! In-memory [`Store`] used by the service tests
//!
//! A transaction holds the state lock for its whole lifetime and works on a
//! staged copy; commit swaps the copy in, drop discards it.

use async_trait::async_trait;
use serde_json::Value;
use sluice_core::domain::outbox::OutboxEvent;
use sluice_core::domain::pipeline::{Metadata, PipelineConfig};
use sluice_core::domain::transformed_data::{TransformedData, TransformedDataDto};
use sluice_core::dto::pipeline::PipelineConfigDto;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Store, StoreError, StoreTransaction};

#[derive(Debug, Clone, Default)]
struct State {
    configs: BTreeMap<i64, PipelineConfig>,
    transformed: BTreeMap<i64, TransformedData>,
    outbox: Vec<OutboxEvent>,
    last_config_id: i64,
    last_transformed_id: i64,
    failing_routing_key: Option<String>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every event insert with `routing_key` fail
    pub async fn fail_on_event(&self, routing_key: &str) {
        self.state.lock().await.failing_routing_key = Some(routing_key.to_string());
    }

    pub async fn events(&self) -> Vec<OutboxEvent> {
        self.state.lock().await.outbox.clone()
    }

    pub async fn transformed_data(&self) -> Vec<TransformedData> {
        self.state.lock().await.transformed.values().cloned().collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, staged }))
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<State>,
    staged: State,
}

fn build_config(
    id: i64,
    dto: &PipelineConfigDto,
    created_at: chrono::DateTime<chrono::Utc>,
) -> PipelineConfig {
    PipelineConfig {
        id,
        datasource_id: dto.datasource_id,
        transformation: dto.transformation.clone(),
        metadata: Metadata {
            author: dto.metadata.author.clone(),
            display_name: dto.metadata.display_name.clone(),
            license: dto.metadata.license.clone(),
            description: dto.metadata.description.clone(),
            creation_timestamp: created_at,
        },
        schema: dto.schema.clone(),
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn insert_config(
        &mut self,
        dto: &PipelineConfigDto,
    ) -> Result<PipelineConfig, StoreError> {
        self.staged.last_config_id += 1;
        let config = build_config(self.staged.last_config_id, dto, chrono::Utc::now());
        self.staged.configs.insert(config.id, config.clone());
        Ok(config)
    }

    async fn find_config(&mut self, id: i64) -> Result<Option<PipelineConfig>, StoreError> {
        Ok(self.staged.configs.get(&id).cloned())
    }

    async fn list_configs(&mut self) -> Result<Vec<PipelineConfig>, StoreError> {
        Ok(self.staged.configs.values().cloned().collect())
    }

    async fn list_configs_by_datasource(
        &mut self,
        datasource_id: i64,
    ) -> Result<Vec<PipelineConfig>, StoreError> {
        Ok(self
            .staged
            .configs
            .values()
            .filter(|c| c.datasource_id == datasource_id)
            .cloned()
            .collect())
    }

    async fn update_config(
        &mut self,
        id: i64,
        dto: &PipelineConfigDto,
    ) -> Result<Option<PipelineConfig>, StoreError> {
        let Some(existing) = self.staged.configs.get_mut(&id) else {
            return Ok(None);
        };
        *existing = build_config(id, dto, existing.metadata.creation_timestamp);
        Ok(Some(existing.clone()))
    }

    async fn delete_config(&mut self, id: i64) -> Result<Option<PipelineConfig>, StoreError> {
        Ok(self.staged.configs.remove(&id))
    }

    async fn delete_all_configs(&mut self) -> Result<Vec<PipelineConfig>, StoreError> {
        Ok(std::mem::take(&mut self.staged.configs)
            .into_values()
            .collect())
    }

    async fn insert_transformed_data(
        &mut self,
        dto: &TransformedDataDto,
    ) -> Result<TransformedData, StoreError> {
        self.staged.last_transformed_id += 1;
        let row = TransformedData {
            id: self.staged.last_transformed_id,
            pipeline_id: dto.pipeline_id,
            health_status: dto.health_status,
            data: dto.data.clone(),
            schema: dto.schema.clone(),
            created_at: chrono::Utc::now(),
        };
        self.staged.transformed.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_transformed_data(
        &mut self,
        id: i64,
    ) -> Result<Option<TransformedData>, StoreError> {
        Ok(self.staged.transformed.get(&id).cloned())
    }

    async fn latest_transformed_data(
        &mut self,
        pipeline_id: i64,
    ) -> Result<Option<TransformedData>, StoreError> {
        let rows = self.list_transformed_data(pipeline_id).await?;
        Ok(rows.into_iter().next())
    }

    async fn list_transformed_data(
        &mut self,
        pipeline_id: i64,
    ) -> Result<Vec<TransformedData>, StoreError> {
        Ok(self
            .staged
            .transformed
            .values()
            .rev()
            .filter(|row| row.pipeline_id == pipeline_id)
            .cloned()
            .collect())
    }

    async fn insert_event(
        &mut self,
        routing_key: &str,
        payload: &Value,
    ) -> Result<Uuid, StoreError> {
        if self.staged.failing_routing_key.as_deref() == Some(routing_key) {
            return Err(StoreError::Database(sqlx::Error::Protocol(format!(
                "injected failure for {}",
                routing_key
            ))));
        }

        let event = OutboxEvent {
            id: Uuid::new_v4(),
            routing_key: routing_key.to_string(),
            payload: payload.clone(),
        };
        self.staged.outbox.push(event.clone());
        Ok(event.id)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}
