//! Transformed data domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Append-only snapshot of one successful pipeline execution
///
/// The latest snapshot of a pipeline is the one with the greatest `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformedData {
    pub id: i64,
    pub pipeline_id: i64,
    pub health_status: HealthStatus,
    pub data: serde_json::Value,
    /// Schema that was in effect when the data was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A snapshot that has been classified but not yet persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformedDataDto {
    pub pipeline_id: i64,
    pub health_status: HealthStatus,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

/// Data-quality classification of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    Warning,
    Failed,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "OK",
            HealthStatus::Warning => "WARNING",
            HealthStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OK" => Ok(HealthStatus::Ok),
            "WARNING" => Ok(HealthStatus::Warning),
            "FAILED" => Ok(HealthStatus::Failed),
            other => Err(format!("unknown health status '{}'", other)),
        }
    }
}
