use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use uuid::Uuid;

use crate::core::classifier::{classify, classify_failure};
use crate::core::domain::{ClassifiedResult, ExecutionRequest, Outcome, ResultBody};
use crate::core::traits::sandbox::{Sandbox, SandboxError};

pub const BLANK_SCRIPT_MESSAGE: &str = "'script' must be a non-empty string";

/// Stages a script, runs it in the sandbox and classifies the outcome.
///
/// Holds no per-request state, so one instance serves concurrent requests.
#[derive(Clone, Debug)]
pub struct ExecutionService {
    sandbox: Arc<dyn Sandbox>,
    staging_dir: PathBuf,
}

impl ExecutionService {
    pub fn new<T: AsRef<Path>>(sandbox: Arc<dyn Sandbox>, staging_dir: T) -> Self {
        Self {
            sandbox,
            staging_dir: staging_dir.as_ref().into(),
        }
    }

    #[tracing::instrument(skip(self, request), fields(id = %request.id))]
    pub async fn execute(&self, request: &ExecutionRequest) -> ClassifiedResult {
        if request.script.trim().is_empty() {
            return ClassifiedResult::new(
                Outcome::UserError,
                BLANK_SCRIPT_MESSAGE,
                ResultBody {
                    error: Some(BLANK_SCRIPT_MESSAGE.to_string()),
                    ..Default::default()
                },
            );
        }

        let staged = match StagedScript::write(&self.staging_dir, &request.script).await {
            Ok(staged) => staged,
            Err(e) => {
                return classify_failure(&SandboxError::Io {
                    msg: format!("failed to stage script: {e}"),
                });
            }
        };

        let result = match self.sandbox.execute(staged.path(), request.timeout).await {
            Ok(outcome) => classify(&outcome),
            Err(e) => classify_failure(&e),
        };
        drop(staged);

        let elapsed = chrono::Utc::now() - request.received_at;
        tracing::info!(
            "Request finished with {:?} ({}) in {}ms",
            result.outcome,
            result.status,
            elapsed.num_milliseconds()
        );
        result
    }
}

/// A script written to the staging directory, removed again on drop.
#[derive(Debug)]
struct StagedScript {
    path: PathBuf,
}

impl StagedScript {
    async fn write(dir: &Path, script: &str) -> std::io::Result<Self> {
        fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}.py", Uuid::new_v4()));
        fs::write(&path, script).await?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedScript {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::error!("Error deleting staged script {}: {}", self.path.display(), e);
            }
        }
    }
}
