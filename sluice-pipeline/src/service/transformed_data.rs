//! Transformed Data Service
//!
//! Read access to the outputs recorded by triggers.

use sluice_core::domain::transformed_data::TransformedData;
use std::sync::Arc;

use super::{Result, ServiceError};
use crate::store::Store;

#[derive(Clone)]
pub struct TransformedDataService {
    store: Arc<dyn Store>,
}

impl TransformedDataService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: i64) -> Result<TransformedData> {
        let mut tx = self.store.begin().await?;
        let row = tx.find_transformed_data(id).await?;
        tx.commit().await?;

        row.ok_or(ServiceError::NotFound {
            entity: "Transformed data",
            id,
        })
    }

    /// Most recent output of a pipeline
    pub async fn get_latest(&self, pipeline_id: i64) -> Result<TransformedData> {
        let mut tx = self.store.begin().await?;
        let row = tx.latest_transformed_data(pipeline_id).await?;
        tx.commit().await?;

        row.ok_or(ServiceError::NotFound {
            entity: "Transformed data for pipeline",
            id: pipeline_id,
        })
    }

    /// All outputs of a pipeline, newest first
    pub async fn get_by_pipeline_id(&self, pipeline_id: i64) -> Result<Vec<TransformedData>> {
        let mut tx = self.store.begin().await?;
        let rows = tx.list_transformed_data(pipeline_id).await?;
        tx.commit().await?;
        Ok(rows)
    }
}
