//! Data Transfer Objects
//!
//! Request payloads accepted by the pipeline service. Each DTO declares its
//! expected shape as a list of field descriptors which is checked against the
//! raw JSON before deserialization, so callers get every problem at once.

pub mod execution;
pub mod pipeline;
pub mod shape;
pub mod trigger;

pub use execution::ExecutionRequest;
pub use pipeline::{MetadataDto, PipelineConfigDto};
pub use shape::{FieldDescriptor, FieldKind};
pub use trigger::TriggerRequest;
