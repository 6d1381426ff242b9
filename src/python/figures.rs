use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict};

use crate::runtime::error::RenderError;
use crate::runtime::host::FigureRegistry;

/// Open figures of `matplotlib.pyplot`. Never imports matplotlib itself: a
/// script that did not use it has no figures.
#[derive(Debug, Default)]
pub struct PyplotRegistry;

impl PyplotRegistry {
    pub fn new() -> Self {
        Self
    }

    fn pyplot<'py>(py: Python<'py>) -> Option<Bound<'py, PyModule>> {
        let loaded = py
            .import_bound("sys")
            .and_then(|sys| sys.getattr("modules"))
            .and_then(|modules| modules.contains("matplotlib"))
            .unwrap_or(false);
        if !loaded {
            return None;
        }
        py.import_bound("matplotlib.pyplot")
            .map_err(|e| tracing::warn!("Failed to import pyplot: {}", e))
            .ok()
    }
}

impl FigureRegistry for PyplotRegistry {
    fn figure_numbers(&mut self) -> Vec<i64> {
        Python::with_gil(|py| {
            let Some(plt) = Self::pyplot(py) else {
                return Vec::new();
            };
            plt.call_method0("get_fignums")
                .and_then(|nums| nums.extract::<Vec<i64>>())
                .unwrap_or_else(|e| {
                    tracing::warn!("Failed to list figures: {}", e);
                    Vec::new()
                })
        })
    }

    fn render_png(&mut self, figure: i64) -> Result<Vec<u8>, RenderError> {
        Python::with_gil(|py| {
            let render = || -> PyResult<Vec<u8>> {
                let plt = py.import_bound("matplotlib.pyplot")?;
                let buffer = py.import_bound("io")?.call_method0("BytesIO")?;
                let kwargs = PyDict::new_bound(py);
                kwargs.set_item("format", "png")?;
                kwargs.set_item("bbox_inches", "tight")?;
                plt.call_method1("figure", (figure,))?
                    .call_method("savefig", (&buffer,), Some(&kwargs))?;
                let png = buffer.call_method0("getvalue")?;
                Ok(png.downcast::<PyBytes>()?.as_bytes().to_vec())
            };
            render().map_err(|e| RenderError {
                figure,
                msg: e.to_string(),
            })
        })
    }

    fn clear(&mut self) {
        Python::with_gil(|py| {
            if let Some(plt) = Self::pyplot(py) {
                if let Err(e) = plt.call_method1("close", ("all",)) {
                    tracing::warn!("Failed to close figures: {}", e);
                }
            }
        })
    }
}
