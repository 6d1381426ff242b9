//! Wire protocol between the isolated runtime and the orchestrator.
//!
//! The runtime writes exactly one [`ExecutorPayload`] as a JSON document on
//! stdout. Exit status 0 means success and requires `error` to be null; 1 means
//! a handled script failure with the payload still emitted; anything else is a
//! system-level failure and the payload may be missing.

use serde::{Deserialize, Serialize};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_SCRIPT_FAILURE: i32 = 1;
pub const EXIT_RUNTIME_UNAVAILABLE: i32 = 2;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorPayload {
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub visualizations: Vec<VisualizationArtifact>,
    #[serde(default)]
    pub performance: PerformanceMetrics,
}

impl ExecutorPayload {
    pub fn to_json(&self) -> String {
        // Every field is plain data, serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisualizationArtifact {
    #[serde(rename = "type")]
    pub kind: String,
    pub format: String,
    pub data: String,
    pub figure_number: i64,
}

/// Measurements bracketing the execute phase. Zero when a facility is
/// unavailable, never omitted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceMetrics {
    /// Seconds.
    pub execution_time: f64,
    /// Seconds.
    pub cpu_time: f64,
    /// MB.
    pub memory_start: f64,
    /// MB.
    pub memory_peak: f64,
    pub libraries_used: Vec<String>,
    pub code_lines: u64,
    /// Bytes.
    pub output_size: u64,
}
