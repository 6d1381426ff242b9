use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use crate::config::{SandboxConfig, Strategy};
use crate::core::domain::{InvocationSpec, ProcessOutcome};
use crate::core::traits::sandbox::{Sandbox, SandboxError};
use crate::native::process::run_invocation;

/// Launches the isolated runtime as a child process, either through the
/// isolation wrapper or directly.
#[derive(Clone, Debug)]
pub struct ProcessSandbox {
    config: SandboxConfig,
    strategy: Strategy,
}

impl ProcessSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        let strategy = config.resolve_strategy();
        tracing::info!("Using {:?} sandbox strategy", strategy);
        Self { config, strategy }
    }

    pub fn with_strategy(config: SandboxConfig, strategy: Strategy) -> Self {
        Self { config, strategy }
    }

    pub fn invocation(&self, script_path: &Path, timeout: Duration) -> InvocationSpec {
        let mut env = BTreeMap::new();
        if !self.config.library_path.is_empty() {
            env.insert(
                "LD_LIBRARY_PATH".to_string(),
                self.config.library_path.clone(),
            );
        }

        let mut runtime_argv: Vec<OsString> = vec![self.config.interpreter.clone().into()];
        if let Some(entry) = &self.config.entry_script {
            runtime_argv.push(entry.clone().into());
        }
        runtime_argv.push(script_path.into());

        match self.strategy {
            Strategy::Isolated => {
                let mut args: Vec<OsString> = vec![
                    "--config".into(),
                    self.config.wrapper_config.clone().into(),
                    "--quiet".into(),
                ];
                for (key, value) in &env {
                    args.push("--env".into());
                    args.push(format!("{key}={value}").into());
                }
                args.push("--".into());
                args.extend(runtime_argv);

                InvocationSpec {
                    program: self.config.wrapper_path.clone(),
                    args,
                    env: BTreeMap::new(),
                    timeout,
                }
            }
            Strategy::Direct => {
                let mut argv = runtime_argv.into_iter();
                let program = argv
                    .next()
                    .map(Into::into)
                    .unwrap_or_else(|| self.config.interpreter.clone());
                InvocationSpec {
                    program,
                    args: argv.collect(),
                    env,
                    timeout,
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Sandbox for ProcessSandbox {
    #[tracing::instrument(skip(self))]
    async fn execute(
        &self,
        script_path: &Path,
        timeout: Duration,
    ) -> Result<ProcessOutcome, SandboxError> {
        let spec = self.invocation(script_path, timeout);
        tracing::debug!("Invocation: {:?}", spec);
        run_invocation(&spec).await
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn config() -> SandboxConfig {
        SandboxConfig {
            wrapper_path: "/usr/local/bin/nsjail".into(),
            wrapper_config: "nsjail.cfg".into(),
            interpreter: "/usr/local/bin/python".into(),
            entry_script: Some("/app/executor.py".into()),
            library_path: "/usr/local/lib:/usr/lib:/lib".to_string(),
            timeout: Duration::from_secs(15),
            staging_dir: std::env::temp_dir(),
            strategy: None,
        }
    }

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_isolated_invocation() {
        let sandbox = ProcessSandbox::with_strategy(config(), Strategy::Isolated);

        let spec = sandbox.invocation(Path::new("/tmp/abc.py"), Duration::from_secs(7));

        assert_eq!(spec.program, PathBuf::from("/usr/local/bin/nsjail"));
        assert_eq!(
            strings(&spec.args),
            vec![
                "--config",
                "nsjail.cfg",
                "--quiet",
                "--env",
                "LD_LIBRARY_PATH=/usr/local/lib:/usr/lib:/lib",
                "--",
                "/usr/local/bin/python",
                "/app/executor.py",
                "/tmp/abc.py",
            ]
        );
        assert!(spec.env.is_empty());
        assert_eq!(spec.timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_direct_invocation() {
        let sandbox = ProcessSandbox::with_strategy(
            SandboxConfig {
                interpreter: "/opt/sandbox-runtime".into(),
                entry_script: None,
                ..config()
            },
            Strategy::Direct,
        );

        let spec = sandbox.invocation(Path::new("/tmp/abc.py"), Duration::from_secs(7));

        assert_eq!(spec.program, PathBuf::from("/opt/sandbox-runtime"));
        assert_eq!(strings(&spec.args), vec!["/tmp/abc.py"]);
        assert_eq!(
            spec.env.get("LD_LIBRARY_PATH").map(String::as_str),
            Some("/usr/local/lib:/usr/lib:/lib")
        );
    }

    #[test]
    fn test_direct_invocation_without_library_path() {
        let sandbox = ProcessSandbox::with_strategy(
            SandboxConfig {
                library_path: String::new(),
                ..config()
            },
            Strategy::Direct,
        );

        let spec = sandbox.invocation(Path::new("/tmp/abc.py"), Duration::from_secs(1));

        assert!(spec.env.is_empty());
        assert_eq!(strings(&spec.args), vec!["/app/executor.py", "/tmp/abc.py"]);
    }

    #[tokio::test]
    async fn test_isolated_strategy_missing_wrapper() {
        let sandbox = ProcessSandbox::with_strategy(
            SandboxConfig {
                wrapper_path: "/nonexistent/nsjail".into(),
                ..config()
            },
            Strategy::Isolated,
        );

        let result = sandbox
            .execute(Path::new("/tmp/abc.py"), Duration::from_secs(1))
            .await;

        assert!(matches!(
            result,
            Err(SandboxError::Spawn { program, .. }) if program == "/nonexistent/nsjail"
        ));
    }
}
