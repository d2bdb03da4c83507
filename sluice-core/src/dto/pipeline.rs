//! Pipeline config DTOs

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::pipeline::{IDENTITY_FUNC, TransformationConfig};
use crate::dto::shape::{self, FieldDescriptor, FieldKind};

const TRANSFORMATION_FIELDS: &[FieldDescriptor] =
    &[FieldDescriptor::required("func", FieldKind::String)];

const METADATA_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::required("author", FieldKind::String),
    FieldDescriptor::required("displayName", FieldKind::String),
    FieldDescriptor::required("license", FieldKind::String),
    FieldDescriptor::required("description", FieldKind::String),
];

const FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::required("datasourceId", FieldKind::Number),
    FieldDescriptor::object("transformation", true, TRANSFORMATION_FIELDS),
    FieldDescriptor::object("metadata", true, METADATA_FIELDS),
    FieldDescriptor::optional("schema", FieldKind::Object),
];

/// Request to create or fully replace a pipeline config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfigDto {
    pub datasource_id: i64,
    /// Defaults to the identity transformation when omitted
    #[serde(default)]
    pub transformation: TransformationConfig,
    pub metadata: MetadataDto,
    #[serde(default)]
    pub schema: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataDto {
    pub author: String,
    pub display_name: String,
    pub license: String,
    pub description: String,
}

impl PipelineConfigDto {
    /// Validates a raw request body and converts it into a DTO
    ///
    /// A body without a `transformation` field gets the identity function
    /// before validation runs.
    pub fn from_json(mut value: Value) -> Result<Self, Vec<String>> {
        if let Some(body) = value.as_object_mut() {
            body.entry("transformation")
                .or_insert_with(|| json!({ "func": IDENTITY_FUNC }));
        }
        shape::parse(value, "PipelineConfig", FIELDS)
    }
}
