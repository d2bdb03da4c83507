//! Pipeline executor
//!
//! Wraps a [`SandboxExecutor`] with timing and the missing-return check,
//! turning every run into a [`JobResult`].

use chrono::Utc;
use serde_json::Value;
use sluice_core::domain::job::{JobError, JobResult, Stats};
use std::sync::Arc;
use std::time::Instant;

use crate::sandbox::{LuaSandboxExecutor, SandboxExecutor, SandboxOptions};

pub struct PipelineExecutor {
    sandbox: Arc<dyn SandboxExecutor>,
}

impl PipelineExecutor {
    pub fn new(sandbox: Arc<dyn SandboxExecutor>) -> Self {
        Self { sandbox }
    }

    /// Executor backed by the Lua sandbox
    pub fn lua(options: SandboxOptions) -> Self {
        Self::new(Arc::new(LuaSandboxExecutor::new(options)))
    }

    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Runs `code` against `data`
    ///
    /// Never fails: errors raised by the code, and code that returns nothing
    /// or `null`, come back as [`JobResult::Failure`]. Stats are filled in
    /// either way.
    ///
    /// # Arguments
    ///
    /// * `code` - Body of the transformation; `data` is in scope
    /// * `data` - Input handed to the code
    pub fn execute_job(&self, code: &str, data: &Value) -> JobResult {
        let start_timestamp = Utc::now().timestamp_millis();
        let started = Instant::now();

        let outcome = self.sandbox.execute(code, data);

        let stats = Stats {
            duration_in_milli_seconds: started.elapsed().as_secs_f64() * 1000.0,
            start_timestamp,
            end_timestamp: Utc::now().timestamp_millis(),
        };

        match outcome {
            Ok(Some(data)) if !data.is_null() => JobResult::Success { data, stats },
            Ok(_) => JobResult::Failure {
                error: JobError::missing_return(),
                stats,
            },
            Err(error) => {
                tracing::debug!("Job failed with {}", error.name);
                JobResult::Failure { error, stats }
            }
        }
    }
}

impl Default for PipelineExecutor {
    fn default() -> Self {
        Self::lua(SandboxOptions::default())
    }
}
