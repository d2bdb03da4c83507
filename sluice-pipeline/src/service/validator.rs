//! Advisory schema validation
//!
//! Produced data is checked against the pipeline's JSON Schema, if it has
//! one. A mismatch only downgrades the health status; the data is persisted
//! either way. Schemas must be self-contained: an external `$ref` is never
//! fetched, and a schema that needs one counts as invalid.

use serde_json::Value;
use sluice_core::domain::pipeline::PipelineConfig;
use sluice_core::domain::transformed_data::{HealthStatus, TransformedDataDto};

pub trait Validator: Send + Sync {
    /// Classifies `data` produced by `config`; never fails
    fn validate(&self, config: &PipelineConfig, data: Value) -> TransformedDataDto;
}

/// Refuses every external reference
struct NoExternalRefs;

impl jsonschema::Retrieve for NoExternalRefs {
    fn retrieve(
        &self,
        uri: &jsonschema::Uri<String>,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        Err(format!("external reference {} is not allowed", uri.as_str()).into())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSchemaValidator;

impl JsonSchemaValidator {
    fn classify(config: &PipelineConfig, schema: &Value, data: &Value) -> HealthStatus {
        let built = jsonschema::options()
            .with_retriever(NoExternalRefs)
            .build(schema);
        let validator = match built {
            Ok(validator) => validator,
            Err(e) => {
                tracing::warn!(
                    pipeline_id = config.id,
                    "Invalid JSON Schema, data marked as {}: {}",
                    HealthStatus::Warning,
                    e
                );
                return HealthStatus::Warning;
            }
        };

        let errors: Vec<String> = validator.iter_errors(data).map(|e| e.to_string()).collect();
        if errors.is_empty() {
            return HealthStatus::Ok;
        }

        tracing::info!(
            pipeline_id = config.id,
            "Data does not match schema: {}",
            errors.join("; ")
        );
        HealthStatus::Warning
    }
}

impl Validator for JsonSchemaValidator {
    fn validate(&self, config: &PipelineConfig, data: Value) -> TransformedDataDto {
        let health_status = match &config.schema {
            Some(schema) => Self::classify(config, schema, &data),
            None => HealthStatus::Ok,
        };

        TransformedDataDto {
            pipeline_id: config.id,
            health_status,
            data,
            schema: config.schema.clone(),
        }
    }
}
