use std::path::Path;

use crate::runtime::error::{RenderError, RuntimeError};
use crate::runtime::value::ScriptValue;

/// The language-pinned half of the runtime: binds a script to a namespace,
/// runs it and hands back its values.
#[mockall::automock]
pub trait ScriptHost {
    /// Redirects everything the script prints into an in-memory buffer.
    fn begin_capture(&mut self) -> Result<(), RuntimeError>;

    /// Restores the original output stream and returns the captured text.
    fn end_capture(&mut self) -> String;

    /// Parses `source` and binds it to a fresh namespace without running it.
    fn compile(&mut self, module_name: &str, path: &Path, source: &str)
    -> Result<(), RuntimeError>;

    /// Runs the module's top-level code.
    fn exec_module(&mut self) -> Result<(), RuntimeError>;

    /// Whether the namespace exposes a callable named `name`.
    fn has_entry_point(&self, name: &str) -> bool;

    fn call_entry_point(&mut self, name: &str) -> Result<ScriptValue, RuntimeError>;
}

/// Process-wide registry of open figures.
#[mockall::automock]
pub trait FigureRegistry {
    /// Creation handles of all open figures, in no particular order.
    fn figure_numbers(&mut self) -> Vec<i64>;

    fn render_png(&mut self, figure: i64) -> Result<Vec<u8>, RenderError>;

    fn clear(&mut self);
}

/// Registry for hosts without any plotting support.
#[derive(Debug, Default)]
pub struct NoFigures;

impl FigureRegistry for NoFigures {
    fn figure_numbers(&mut self) -> Vec<i64> {
        Vec::new()
    }

    fn render_png(&mut self, figure: i64) -> Result<Vec<u8>, RenderError> {
        Err(RenderError {
            figure,
            msg: "no plotting backend".to_string(),
        })
    }

    fn clear(&mut self) {}
}
