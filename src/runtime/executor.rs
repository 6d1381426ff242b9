use std::io::Write;
use std::path::Path;
use std::time::Instant;

use crate::core::protocol::{EXIT_SCRIPT_FAILURE, EXIT_SUCCESS, ExecutorPayload, PerformanceMetrics};
use crate::runtime::capture::CaptureContext;
use crate::runtime::error::RuntimeError;
use crate::runtime::host::{FigureRegistry, ScriptHost};
use crate::runtime::marshal::marshal;
use crate::runtime::metrics::{self, ResourceProbe};
use crate::runtime::value::ScriptValue;

pub const ENTRY_POINT: &str = "main";

/// What to do with a script that defines no entry point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EntryPointPolicy {
    /// Run it for its top-level side effects only.
    #[default]
    Optional,
    Required,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    /// The entry point was called and its return value is the result.
    Function,
    /// Top-level code only, no result.
    Script,
}

#[derive(Clone, Debug)]
pub struct RuntimeReport {
    pub payload: ExecutorPayload,
    /// `None` when the attempt failed before the mode could be determined.
    pub mode: Option<ExecutionMode>,
}

impl RuntimeReport {
    pub fn exit_code(&self) -> i32 {
        if self.payload.error.is_some() {
            EXIT_SCRIPT_FAILURE
        } else {
            EXIT_SUCCESS
        }
    }

    /// Writes the single protocol document.
    pub fn emit<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        writeln!(out, "{}", self.payload.to_json())?;
        out.flush()
    }
}

struct Attempt {
    mode: ExecutionMode,
    value: Option<ScriptValue>,
}

#[derive(Clone, Debug, Default)]
pub struct IsolatedRuntime {
    policy: EntryPointPolicy,
}

impl IsolatedRuntime {
    pub fn new(policy: EntryPointPolicy) -> Self {
        Self { policy }
    }

    /// Loads and executes one script. Never fails: every error ends up in the
    /// payload's `error` field.
    #[tracing::instrument(skip(self, host, figures))]
    pub fn run(
        &self,
        host: &mut dyn ScriptHost,
        figures: &mut dyn FigureRegistry,
        script_path: &Path,
    ) -> RuntimeReport {
        let capture = CaptureContext::new(figures);

        let source = match std::fs::read_to_string(script_path) {
            Ok(source) => source,
            Err(e) => {
                tracing::debug!("Cannot read script: {}", e);
                let error = RuntimeError::ScriptNotFound {
                    path: script_path.display().to_string(),
                };
                return failed(error, String::new(), capture.finish(), Default::default());
            }
        };

        if let Err(e) = host.begin_capture() {
            return failed(
                e,
                String::new(),
                capture.finish(),
                metrics::unmeasured(&source, ""),
            );
        }

        let mut probe = None;
        let attempt = self.load_and_execute(host, script_path, &source, &mut probe);
        let stdout = host.end_capture();
        let performance = match probe {
            Some(probe) => probe.finish(&source, &stdout),
            None => metrics::unmeasured(&source, &stdout),
        };
        let visualizations = capture.finish();

        match attempt {
            Ok(attempt) => {
                tracing::debug!("Script finished in {:?} mode", attempt.mode);
                let result = attempt
                    .value
                    .as_ref()
                    .map(marshal)
                    .filter(|v| !v.is_null());
                RuntimeReport {
                    payload: ExecutorPayload {
                        result,
                        stdout,
                        error: None,
                        visualizations,
                        performance,
                    },
                    mode: Some(attempt.mode),
                }
            }
            Err(e) => failed(e, stdout, visualizations, performance),
        }
    }

    fn load_and_execute(
        &self,
        host: &mut dyn ScriptHost,
        script_path: &Path,
        source: &str,
        probe: &mut Option<ResourceProbe>,
    ) -> Result<Attempt, RuntimeError> {
        let module_name = script_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("user_script");

        let compile_started = Instant::now();
        host.compile(module_name, script_path, source)?;
        tracing::debug!(
            "Module {} loaded in {:?}",
            module_name,
            compile_started.elapsed()
        );

        *probe = Some(ResourceProbe::start());
        host.exec_module()?;

        if host.has_entry_point(ENTRY_POINT) {
            let value = host.call_entry_point(ENTRY_POINT)?;
            return Ok(Attempt {
                mode: ExecutionMode::Function,
                value: Some(value),
            });
        }

        match self.policy {
            EntryPointPolicy::Optional => Ok(Attempt {
                mode: ExecutionMode::Script,
                value: None,
            }),
            EntryPointPolicy::Required => Err(RuntimeError::MissingEntryPoint {
                name: ENTRY_POINT.to_string(),
            }),
        }
    }
}

fn failed(
    error: RuntimeError,
    stdout: String,
    visualizations: Vec<crate::core::protocol::VisualizationArtifact>,
    performance: PerformanceMetrics,
) -> RuntimeReport {
    tracing::debug!(category = error.category(), "Script failed: {}", error);
    RuntimeReport {
        payload: ExecutorPayload {
            result: None,
            stdout,
            error: Some(error.to_string()),
            visualizations,
            performance,
        },
        mode: None,
    }
}
