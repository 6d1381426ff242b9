use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_WRAPPER_PATH: &str = "/usr/local/bin/nsjail";
pub const DEFAULT_WRAPPER_CONFIG: &str = "nsjail.cfg";
/// File name of the isolated runtime binary built alongside the orchestrator.
pub const RUNTIME_BINARY: &str = "sandbox-runtime";
pub const DEFAULT_LIBRARY_PATH: &str = "/usr/local/lib:/usr/lib:/lib";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// How the runtime is launched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Through the isolation wrapper.
    Isolated,
    /// Straight from the orchestrator, without the wrapper.
    Direct,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct SandboxConfig {
    pub wrapper_path: PathBuf,
    pub wrapper_config: PathBuf,
    pub interpreter: PathBuf,
    pub entry_script: Option<PathBuf>,
    pub library_path: String,
    pub timeout: Duration,
    pub staging_dir: PathBuf,
    /// Forced strategy; `None` picks one from what is installed.
    pub strategy: Option<Strategy>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            wrapper_path: DEFAULT_WRAPPER_PATH.into(),
            wrapper_config: DEFAULT_WRAPPER_CONFIG.into(),
            interpreter: default_interpreter(),
            entry_script: None,
            library_path: DEFAULT_LIBRARY_PATH.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            staging_dir: std::env::temp_dir().join("scriptrunner"),
            strategy: None,
        }
    }
}

/// The runtime binary next to the running executable, falling back to a
/// `PATH` lookup.
pub fn default_interpreter() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(RUNTIME_BINARY)))
        .unwrap_or_else(|| RUNTIME_BINARY.into())
}

impl SandboxConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("SANDBOX_WRAPPER_PATH") {
            config.wrapper_path = path.into();
        }
        if let Some(path) = lookup("SANDBOX_WRAPPER_CONFIG") {
            config.wrapper_config = path.into();
        }
        if let Some(path) = lookup("SANDBOX_INTERPRETER") {
            config.interpreter = path.into();
        }
        if let Some(path) = lookup("SANDBOX_ENTRY_SCRIPT") {
            config.entry_script = (!path.trim().is_empty()).then(|| path.into());
        }
        if let Some(path) = lookup("SANDBOX_LIBRARY_PATH") {
            config.library_path = path;
        }
        if let Some(dir) = lookup("SANDBOX_STAGING_DIR") {
            config.staging_dir = dir.into();
        }
        if let Some(secs) = lookup("SANDBOX_TIMEOUT_SECS") {
            let parsed: u64 = secs.trim().parse().map_err(|e| ConfigError::Invalid {
                var: "SANDBOX_TIMEOUT_SECS",
                value: secs.clone(),
                reason: format!("{e}"),
            })?;
            if parsed == 0 {
                return Err(ConfigError::Invalid {
                    var: "SANDBOX_TIMEOUT_SECS",
                    value: secs,
                    reason: "must be positive".to_string(),
                });
            }
            config.timeout = Duration::from_secs(parsed);
        }
        if let Some(strategy) = lookup("SANDBOX_STRATEGY") {
            config.strategy = match strategy.trim().to_ascii_lowercase().as_str() {
                "" | "auto" => None,
                "isolated" => Some(Strategy::Isolated),
                "direct" => Some(Strategy::Direct),
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "SANDBOX_STRATEGY",
                        value: strategy,
                        reason: "expected isolated, direct or auto".to_string(),
                    });
                }
            };
        }

        Ok(config)
    }

    pub fn resolve_strategy(&self) -> Strategy {
        if let Some(strategy) = self.strategy {
            return strategy;
        }
        if self.wrapper_path.is_file() {
            Strategy::Isolated
        } else {
            tracing::warn!(
                "Isolation wrapper {} not found, running scripts without isolation",
                self.wrapper_path.display()
            );
            Strategy::Direct
        }
    }
}
