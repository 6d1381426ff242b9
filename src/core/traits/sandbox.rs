use std::path::Path;
use std::time::Duration;

use crate::core::domain::ProcessOutcome;

/// Runs one attempt of the isolated runtime against a staged script.
///
/// A timeout is a normal outcome (`ProcessOutcome::timed_out`), not an error.
/// Only failures to start the runtime at all are reported as [`SandboxError`].
#[mockall::automock]
#[async_trait::async_trait]
pub trait Sandbox: std::fmt::Debug + Send + Sync {
    async fn execute(
        &self,
        script_path: &Path,
        timeout: Duration,
    ) -> Result<ProcessOutcome, SandboxError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to spawn {program}: {msg}")]
    Spawn { program: String, msg: String },
    #[error("i/o error while supervising the runtime: {msg}")]
    Io { msg: String },
}
