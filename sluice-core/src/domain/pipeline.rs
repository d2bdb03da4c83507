//! Pipeline config domain types

use serde::{Deserialize, Serialize};

/// Source text of the identity transformation.
pub const IDENTITY_FUNC: &str = "return data;";

/// A transformation registered for a datasource.
///
/// `id` is assigned by the store and never changes. The config is replaced
/// as a whole on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    pub id: i64,
    pub datasource_id: i64,
    pub transformation: TransformationConfig,
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

/// The user code run against each trigger's data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationConfig {
    pub func: String,
}

impl TransformationConfig {
    pub fn identity() -> Self {
        Self {
            func: IDENTITY_FUNC.to_string(),
        }
    }
}

impl Default for TransformationConfig {
    fn default() -> Self {
        Self::identity()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub author: String,
    pub display_name: String,
    pub license: String,
    pub description: String,
    pub creation_timestamp: chrono::DateTime<chrono::Utc>,
}
