//! Ad-hoc execution request

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::pipeline::IDENTITY_FUNC;
use crate::dto::shape::{self, FieldDescriptor, FieldKind};

const FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::required("func", FieldKind::String),
    FieldDescriptor::required("data", FieldKind::Any),
];

/// Runs a transformation once without persisting anything
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub func: String,
    pub data: Value,
}

impl ExecutionRequest {
    pub fn from_json(mut value: Value) -> Result<Self, Vec<String>> {
        if let Some(body) = value.as_object_mut() {
            body.entry("func").or_insert_with(|| json!(IDENTITY_FUNC));
        }
        shape::parse(value, "PipelineExecutionRequest", FIELDS)
    }
}
