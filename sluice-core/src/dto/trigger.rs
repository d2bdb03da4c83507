//! Trigger request: new data arrived for a datasource

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dto::shape::{self, FieldDescriptor, FieldKind};

const FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::required("datasourceId", FieldKind::Number),
    FieldDescriptor::required("data", FieldKind::Any),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub datasource_id: i64,
    pub data: Value,
}

impl TriggerRequest {
    pub fn from_json(value: Value) -> Result<Self, Vec<String>> {
        shape::parse(value, "PipelineConfigTriggerRequest", FIELDS)
    }
}
