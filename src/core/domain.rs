use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::core::protocol::{PerformanceMetrics, VisualizationArtifact};

#[derive(Clone, Debug)]
pub struct ExecutionRequest {
    pub id: Uuid,
    pub received_at: chrono::DateTime<chrono::Utc>,
    pub script: String,
    pub timeout: Duration,
}

impl ExecutionRequest {
    pub fn new(script: impl Into<String>, timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            received_at: chrono::Utc::now(),
            script: script.into(),
            timeout,
        }
    }
}

/// A fully resolved child process invocation for one attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvocationSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
}

/// Raw result of one runtime attempt, before any interpretation.
#[derive(Clone, Debug, Default)]
pub struct ProcessOutcome {
    /// `None` when the child was terminated by a signal.
    pub exit_status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Success,
    UserError,
    Timeout,
    SystemError,
}

impl Outcome {
    pub fn status_code(&self) -> u16 {
        match self {
            Outcome::Success => 200,
            Outcome::UserError => 400,
            Outcome::Timeout => 408,
            Outcome::SystemError => 500,
        }
    }
}

/// Caller-facing body. Only the fields relevant to the outcome are set.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ResultBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualizations: Option<Vec<VisualizationArtifact>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceMetrics>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassifiedResult {
    pub outcome: Outcome,
    pub status: u16,
    pub message: String,
    pub body: ResultBody,
    /// Operator-only diagnostics, never serialized back to the caller.
    #[serde(skip)]
    pub details: Option<String>,
}

impl ClassifiedResult {
    pub fn new(outcome: Outcome, message: impl Into<String>, body: ResultBody) -> Self {
        Self {
            outcome,
            status: outcome.status_code(),
            message: message.into(),
            body,
            details: None,
        }
    }

    pub fn with_details(self, details: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            ..self
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}
