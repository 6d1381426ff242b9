use std::path::Path;

use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict, PyModule};

use crate::python::convert::to_script_value;
use crate::runtime::error::RuntimeError;
use crate::runtime::host::ScriptHost;
use crate::runtime::value::ScriptValue;

/// Runs scripts in the embedded CPython interpreter.
#[derive(Debug, Default)]
pub struct PythonHost {
    module: Option<Py<PyModule>>,
    code: Option<PyObject>,
    capture: Option<PyObject>,
    saved_stdout: Option<PyObject>,
}

impl PythonHost {
    /// Prepares the interpreter for headless plotting before any script code runs.
    pub fn new() -> PyResult<Self> {
        Python::with_gil(|py| {
            let environ = py.import_bound("os")?.getattr("environ")?;
            environ.call_method1("setdefault", ("MPLBACKEND", "Agg"))?;
            environ.call_method1("setdefault", ("MPLCONFIGDIR", "/tmp/matplotlib"))?;
            Ok(Self::default())
        })
    }

    fn module<'py>(&self, py: Python<'py>) -> Option<Bound<'py, PyModule>> {
        self.module.as_ref().map(|m| m.bind(py).clone())
    }
}

impl ScriptHost for PythonHost {
    fn begin_capture(&mut self) -> Result<(), RuntimeError> {
        Python::with_gil(|py| {
            let sys = py.import_bound("sys")?;
            let buffer = py.import_bound("io")?.call_method0("StringIO")?;
            self.saved_stdout = Some(sys.getattr("stdout")?.unbind());
            sys.setattr("stdout", &buffer)?;
            self.capture = Some(buffer.unbind());
            Ok(())
        })
        .map_err(|e: PyErr| RuntimeError::ModuleLoad {
            msg: format!("cannot redirect stdout: {e}"),
        })
    }

    fn end_capture(&mut self) -> String {
        Python::with_gil(|py| {
            if let Some(saved) = self.saved_stdout.take() {
                let restored = py
                    .import_bound("sys")
                    .and_then(|sys| sys.setattr("stdout", saved));
                if let Err(e) = restored {
                    tracing::warn!("Failed to restore stdout: {}", e);
                }
            }
            let Some(buffer) = self.capture.take() else {
                return String::new();
            };
            // Lone surrogates are legal in a Python str but not in UTF-8.
            let encoded = buffer
                .bind(py)
                .call_method0("getvalue")
                .and_then(|v| v.call_method1("encode", ("utf-8", "backslashreplace")));
            match encoded {
                Ok(bytes) => match bytes.downcast::<PyBytes>() {
                    Ok(bytes) => String::from_utf8_lossy(bytes.as_bytes()).into_owned(),
                    Err(e) => {
                        tracing::warn!("Captured stdout is not bytes after encoding: {}", e);
                        String::new()
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read captured stdout: {}", e);
                    String::new()
                }
            }
        })
    }

    fn compile(
        &mut self,
        module_name: &str,
        path: &Path,
        source: &str,
    ) -> Result<(), RuntimeError> {
        Python::with_gil(|py| {
            let builtins = py.import_bound("builtins").map_err(|e| load_error(py, e))?;
            let code = builtins
                .call_method1("compile", (source, path.display().to_string(), "exec"))
                .map_err(|e| load_error(py, e))?;

            let module = PyModule::new_bound(py, module_name).map_err(|e| load_error(py, e))?;
            let bind = || -> PyResult<()> {
                module.setattr("__file__", path.display().to_string())?;
                let sys = py.import_bound("sys")?;
                sys.getattr("modules")?.set_item(module_name, &module)?;
                if let Some(dir) = path.parent() {
                    sys.getattr("path")?
                        .call_method1("insert", (0, dir.display().to_string()))?;
                }
                Ok(())
            };
            bind().map_err(|e| load_error(py, e))?;

            self.code = Some(code.unbind());
            self.module = Some(module.unbind());
            Ok(())
        })
    }

    fn exec_module(&mut self) -> Result<(), RuntimeError> {
        Python::with_gil(|py| {
            let (Some(code), Some(module)) = (self.code.as_ref(), self.module(py)) else {
                return Err(RuntimeError::ModuleLoad {
                    msg: "module was not compiled".to_string(),
                });
            };
            let namespace: Bound<'_, PyDict> = module.dict();
            py.import_bound("builtins")
                .and_then(|b| b.getattr("exec"))
                .and_then(|exec| exec.call1((code.bind(py), namespace)))
                .map(|_| ())
                .map_err(|e| user_exception(py, e))
        })
    }

    fn has_entry_point(&self, name: &str) -> bool {
        Python::with_gil(|py| {
            self.module(py)
                .and_then(|m| m.getattr(name).ok())
                .is_some_and(|f| f.is_callable())
        })
    }

    fn call_entry_point(&mut self, name: &str) -> Result<ScriptValue, RuntimeError> {
        Python::with_gil(|py| {
            let Some(module) = self.module(py) else {
                return Err(RuntimeError::ModuleLoad {
                    msg: "module was not compiled".to_string(),
                });
            };
            let value = module
                .getattr(name)
                .and_then(|f| f.call0())
                .map_err(|e| user_exception(py, e))?;
            Ok(to_script_value(&value))
        })
    }
}

fn describe(py: Python<'_>, err: &PyErr) -> (String, String) {
    let value = err.value_bound(py);
    let class = value
        .get_type()
        .getattr("__name__")
        .and_then(|n| n.extract::<String>())
        .unwrap_or_else(|_| "Exception".to_string());
    let msg = value
        .str()
        .map(|s| s.to_string())
        .unwrap_or_default();
    print_traceback(py, err);
    (class, msg)
}

/// Writes the traceback to stderr. Never goes through `PyErr::print`, which
/// would exit the process on `SystemExit`.
fn print_traceback(py: Python<'_>, err: &PyErr) {
    let value = err.value_bound(py);
    let printed = py.import_bound("traceback").and_then(|tb| {
        tb.call_method1(
            "print_exception",
            (value.get_type(), value, value.getattr("__traceback__")?),
        )
    });
    if let Err(e) = printed {
        tracing::warn!("Failed to print traceback: {}", e);
    }
}

fn load_error(py: Python<'_>, err: PyErr) -> RuntimeError {
    let (class, msg) = describe(py, &err);
    RuntimeError::ModuleLoad {
        msg: format!("{class}: {msg}"),
    }
}

fn user_exception(py: Python<'_>, err: PyErr) -> RuntimeError {
    let (class, msg) = describe(py, &err);
    RuntimeError::UserException { class, msg }
}
