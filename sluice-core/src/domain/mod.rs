//! Core domain types
//!
//! These types are shared between the sandbox crate (which produces job
//! results) and the pipeline service (which persists configs, snapshots and
//! outbox events).

pub mod job;
pub mod outbox;
pub mod pipeline;
pub mod transformed_data;
