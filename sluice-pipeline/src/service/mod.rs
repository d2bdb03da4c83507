//! Service Module
//!
//! Business logic layer. Services own the transaction boundaries and
//! combine the store, the executor and the validator.

pub mod pipeline_config;
pub mod transformed_data;
pub mod validator;

use std::fmt;

use crate::store::StoreError;

pub use pipeline_config::{PipelineConfigManager, PipelineOutcome};
pub use transformed_data::TransformedDataService;
pub use validator::{JsonSchemaValidator, Validator};

/// Service error type
#[derive(Debug)]
pub enum ServiceError {
    NotFound { entity: &'static str, id: i64 },
    Store(StoreError),
    /// A background task ended without producing its result
    Interrupted(tokio::task::JoinError),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::NotFound { entity, id } => write!(f, "{} {} not found", entity, id),
            ServiceError::Store(err) => write!(f, "{}", err),
            ServiceError::Interrupted(err) => write!(f, "task did not complete: {}", err),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        ServiceError::Store(err)
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
