/// Failure of one runtime attempt. `Display` renders the wire `error` string,
/// `"<category>: <message>"`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error("ScriptNotFound: Script file not found inside jail: {path}")]
    ScriptNotFound { path: String },
    #[error("ModuleLoadError: {msg}")]
    ModuleLoad { msg: String },
    /// Raised by script code; `class` is the name of the raised type.
    #[error("{class}: {msg}")]
    UserException { class: String, msg: String },
    #[error("MissingEntryPoint: script does not define a callable '{name}'")]
    MissingEntryPoint { name: String },
}

impl RuntimeError {
    pub fn category(&self) -> &str {
        match self {
            RuntimeError::ScriptNotFound { .. } => "ScriptNotFound",
            RuntimeError::ModuleLoad { .. } => "ModuleLoadError",
            RuntimeError::UserException { class, .. } => class,
            RuntimeError::MissingEntryPoint { .. } => "MissingEntryPoint",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("failed to render figure {figure}: {msg}")]
pub struct RenderError {
    pub figure: i64,
    pub msg: String,
}
