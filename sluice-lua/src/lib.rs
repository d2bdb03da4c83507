//! Sluice transformation runtime
//!
//! Runs user-supplied Lua transformation code in an isolated sandbox and
//! reports the outcome as a [`JobResult`](sluice_core::domain::job::JobResult):
//! - `sandbox`: restricted interpreter states and the [`SandboxExecutor`] seam
//! - `executor`: timing and missing-return handling on top of a sandbox
//! - `error`: translation of interpreter errors into structured job errors
//! - `log`: the `log` table exposed to scripts
//! - `pattern`: string pattern functions that honour the run's deadline

mod error;
pub mod executor;
pub mod log;
mod pattern;
pub mod sandbox;
mod wrap;

pub use executor::PipelineExecutor;
pub use log::{LogLevel, LogSink, TracingSink};
pub use sandbox::{
    ExecutionResult, LuaSandboxExecutor, SandboxExecutor, SandboxOptions, create_sandbox,
};
