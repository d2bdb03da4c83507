//! Outbox domain types
//!
//! Events are written to the outbox in the same transaction as the mutation
//! they announce. An external relay forwards them to the broker and removes
//! the rows.

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// A stored outbox row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEvent {
    pub id: Uuid,
    pub routing_key: String,
    pub payload: serde_json::Value,
}

/// The kinds of events the pipeline service announces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ConfigCreated,
    ConfigUpdated,
    ConfigDeleted,
    ExecutionSuccess,
    ExecutionError,
}

/// Routing key per event kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingKeys {
    pub config_created: String,
    pub config_updated: String,
    pub config_deleted: String,
    pub execution_success: String,
    pub execution_error: String,
}

impl RoutingKeys {
    pub fn for_kind(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::ConfigCreated => &self.config_created,
            EventKind::ConfigUpdated => &self.config_updated,
            EventKind::ConfigDeleted => &self.config_deleted,
            EventKind::ExecutionSuccess => &self.execution_success,
            EventKind::ExecutionError => &self.execution_error,
        }
    }
}

impl Default for RoutingKeys {
    fn default() -> Self {
        Self {
            config_created: "pipeline.config.created".to_string(),
            config_updated: "pipeline.config.updated".to_string(),
            config_deleted: "pipeline.config.deleted".to_string(),
            execution_success: "pipeline.execution.success".to_string(),
            execution_error: "pipeline.execution.error".to_string(),
        }
    }
}

/// An event before it is written to the outbox
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    ConfigCreated {
        pipeline_id: i64,
        pipeline_name: String,
    },
    ConfigUpdated {
        pipeline_id: i64,
        pipeline_name: String,
    },
    ConfigDeleted {
        pipeline_id: i64,
        pipeline_name: String,
    },
    ExecutionError {
        pipeline_id: i64,
        pipeline_name: String,
        error: String,
    },
    ExecutionSuccess {
        pipeline_id: i64,
        pipeline_name: String,
        data: serde_json::Value,
        schema: Option<serde_json::Value>,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::ConfigCreated { .. } => EventKind::ConfigCreated,
            DomainEvent::ConfigUpdated { .. } => EventKind::ConfigUpdated,
            DomainEvent::ConfigDeleted { .. } => EventKind::ConfigDeleted,
            DomainEvent::ExecutionError { .. } => EventKind::ExecutionError,
            DomainEvent::ExecutionSuccess { .. } => EventKind::ExecutionSuccess,
        }
    }

    /// JSON body published to downstream consumers
    pub fn payload(&self) -> serde_json::Value {
        match self {
            DomainEvent::ConfigCreated {
                pipeline_id,
                pipeline_name,
            }
            | DomainEvent::ConfigUpdated {
                pipeline_id,
                pipeline_name,
            }
            | DomainEvent::ConfigDeleted {
                pipeline_id,
                pipeline_name,
            } => json!({
                "pipelineId": pipeline_id,
                "pipelineName": pipeline_name,
            }),
            DomainEvent::ExecutionError {
                pipeline_id,
                pipeline_name,
                error,
            } => json!({
                "pipelineId": pipeline_id,
                "pipelineName": pipeline_name,
                "error": error,
            }),
            DomainEvent::ExecutionSuccess {
                pipeline_id,
                pipeline_name,
                data,
                schema,
            } => {
                let mut payload = json!({
                    "pipelineId": pipeline_id,
                    "pipelineName": pipeline_name,
                    "data": data,
                });
                if let Some(schema) = schema {
                    payload["schema"] = schema.clone();
                }
                payload
            }
        }
    }
}
