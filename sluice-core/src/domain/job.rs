//! Job result domain types
//!
//! A job is one run of a transformation function against one data value.
//! Its result is either the produced data or a structured error, never both.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a single transformation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobResult {
    Success { data: serde_json::Value, stats: Stats },
    Failure { error: JobError, stats: Stats },
}

impl JobResult {
    pub fn stats(&self) -> &Stats {
        match self {
            JobResult::Success { stats, .. } | JobResult::Failure { stats, .. } => stats,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success { .. })
    }

    pub fn data(&self) -> Option<&serde_json::Value> {
        match self {
            JobResult::Success { data, .. } => Some(data),
            JobResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&JobError> {
        match self {
            JobResult::Success { .. } => None,
            JobResult::Failure { error, .. } => Some(error),
        }
    }
}

/// Timing of a transformation run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Monotonic duration of the sandbox call
    pub duration_in_milli_seconds: f64,
    /// Wall-clock start, milliseconds since the Unix epoch
    pub start_timestamp: i64,
    /// Wall-clock end, milliseconds since the Unix epoch
    pub end_timestamp: i64,
}

/// Stable error names callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobErrorKind {
    /// The code did not compile
    SyntaxError,
    /// The code read a global that is not defined
    ReferenceError,
    /// A value was used with the wrong type, or data could not cross the sandbox boundary
    TypeError,
    /// An explicit `error(...)` or any other failure while running
    RuntimeError,
    /// The wall-clock bound was exceeded
    TimeoutError,
    /// The code finished without returning a value
    MissingReturnError,
}

impl JobErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobErrorKind::SyntaxError => "SyntaxError",
            JobErrorKind::ReferenceError => "ReferenceError",
            JobErrorKind::TypeError => "TypeError",
            JobErrorKind::RuntimeError => "RuntimeError",
            JobErrorKind::TimeoutError => "TimeoutError",
            JobErrorKind::MissingReturnError => "MissingReturnError",
        }
    }
}

impl fmt::Display for JobErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error located in the user's source
///
/// `line_number` and `position` are 1-based coordinates in the submitted
/// code; 0 means the error is not attributable to a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    pub name: JobErrorKind,
    pub message: String,
    pub line_number: u32,
    pub position: u32,
    pub stacktrace: Vec<String>,
}

impl JobError {
    /// Creates an unlocated error whose message is prefixed with the kind name
    pub fn new(name: JobErrorKind, detail: impl fmt::Display) -> Self {
        Self {
            name,
            message: format!("{}: {}", name, detail),
            line_number: 0,
            position: 0,
            stacktrace: Vec::new(),
        }
    }

    pub fn at(mut self, line_number: u32, position: u32) -> Self {
        self.line_number = line_number;
        self.position = position;
        self
    }

    pub fn with_stacktrace(mut self, stacktrace: Vec<String>) -> Self {
        self.stacktrace = stacktrace;
        self
    }

    pub fn timeout(limit_ms: u128) -> Self {
        Self::new(
            JobErrorKind::TimeoutError,
            format!("Script execution timed out after {}ms", limit_ms),
        )
    }

    pub fn missing_return() -> Self {
        Self::new(
            JobErrorKind::MissingReturnError,
            "Code snippet is not returning valid data",
        )
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line_number == 0 {
            write!(f, "{}", self.message)
        } else {
            write!(
                f,
                "{} (line {}, position {})",
                self.message, self.line_number, self.position
            )
        }
    }
}

impl std::error::Error for JobError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stats() -> Stats {
        Stats {
            duration_in_milli_seconds: 1.5,
            start_timestamp: 1_700_000_000_000,
            end_timestamp: 1_700_000_000_002,
        }
    }

    #[test]
    fn test_success_serializes_without_error() {
        let result = JobResult::Success {
            data: json!({"a": 1}),
            stats: stats(),
        };

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["data"], json!({"a": 1}));
        assert_eq!(value["stats"]["durationInMilliSeconds"], json!(1.5));
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_failure_serializes_without_data() {
        let result = JobResult::Failure {
            error: JobError::new(JobErrorKind::ReferenceError, "require is not defined").at(2, 5),
            stats: stats(),
        };

        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("data").is_none());
        assert_eq!(value["error"]["name"], json!("ReferenceError"));
        assert_eq!(
            value["error"]["message"],
            json!("ReferenceError: require is not defined")
        );
        assert_eq!(value["error"]["lineNumber"], json!(2));
        assert_eq!(value["error"]["position"], json!(5));
    }

    #[test]
    fn test_failure_deserializes_into_failure_variant() {
        let value = json!({
            "error": {
                "name": "TimeoutError",
                "message": "TimeoutError: Script execution timed out after 10ms",
                "lineNumber": 0,
                "position": 0,
                "stacktrace": []
            },
            "stats": {"durationInMilliSeconds": 10.0, "startTimestamp": 1, "endTimestamp": 11}
        });

        let result: JobResult = serde_json::from_value(value).unwrap();
        assert!(!result.is_success());
        assert_eq!(result.error().unwrap().name, JobErrorKind::TimeoutError);
        assert_eq!(result.stats().end_timestamp, 11);
    }

    #[test]
    fn test_missing_return_is_unlocated() {
        let error = JobError::missing_return();
        assert_eq!(error.name, JobErrorKind::MissingReturnError);
        assert_eq!((error.line_number, error.position), (0, 0));
        assert!(error.stacktrace.is_empty());
    }
}
