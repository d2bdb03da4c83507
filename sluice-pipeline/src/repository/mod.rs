//! Repository Module
//!
//! Data access layer. Every function runs on a caller-supplied connection,
//! which is a transaction opened by the store.

pub mod outbox;
pub mod pipeline_config;
pub mod transformed_data;

pub use outbox as outbox_repository;
pub use pipeline_config as pipeline_config_repository;
pub use transformed_data as transformed_data_repository;
