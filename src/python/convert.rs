//! Python object to [`ScriptValue`] conversion. Total: anything that cannot be
//! mapped becomes [`ScriptValue::Opaque`].

use pyo3::prelude::*;
use pyo3::types::{PyBool, PyBytes, PyDict, PyFloat, PyInt, PyList, PyString, PyTuple};

use crate::runtime::value::{Bitmap, PixelMode, ScriptValue, Series, Table};

/// Guards against self-referencing containers.
const MAX_DEPTH: usize = 64;

pub fn to_script_value(obj: &Bound<'_, PyAny>) -> ScriptValue {
    convert(obj, 0)
}

fn convert(obj: &Bound<'_, PyAny>, depth: usize) -> ScriptValue {
    if depth > MAX_DEPTH {
        return opaque(obj);
    }
    if obj.is_none() {
        return ScriptValue::Null;
    }

    let (module, name) = type_path(obj);
    if module.starts_with("pandas") {
        let converted = match name.as_str() {
            "DataFrame" => Some(table(obj, depth)),
            "Series" => Some(series(obj, depth)),
            _ => None,
        };
        if let Some(converted) = converted {
            return converted.unwrap_or_else(|e| {
                tracing::warn!("Failed to convert pandas {}: {}", name, e);
                opaque(obj)
            });
        }
    }
    if module.starts_with("PIL") && obj.hasattr("tobytes").unwrap_or(false) {
        return bitmap(obj).unwrap_or_else(|e| {
            tracing::warn!("Failed to convert image: {}", e);
            opaque(obj)
        });
    }

    if let Ok(b) = obj.downcast::<PyBool>() {
        return ScriptValue::Bool(b.is_true());
    }
    if obj.is_instance_of::<PyInt>() {
        return obj
            .extract::<i64>()
            .map(ScriptValue::Int)
            .unwrap_or_else(|_| opaque(obj));
    }
    if obj.is_instance_of::<PyFloat>() {
        return obj
            .extract::<f64>()
            .map(ScriptValue::Float)
            .unwrap_or_else(|_| opaque(obj));
    }
    if obj.is_instance_of::<PyString>() {
        return obj
            .extract::<String>()
            .map(ScriptValue::Str)
            .unwrap_or_else(|_| opaque(obj));
    }
    if let Ok(list) = obj.downcast::<PyList>() {
        return ScriptValue::List(list.iter().map(|item| convert(&item, depth + 1)).collect());
    }
    if let Ok(tuple) = obj.downcast::<PyTuple>() {
        return ScriptValue::List(tuple.iter().map(|item| convert(&item, depth + 1)).collect());
    }
    if let Ok(dict) = obj.downcast::<PyDict>() {
        let mut entries = Vec::with_capacity(dict.len());
        for (key, value) in dict.iter() {
            let Some(key) = json_key(&key) else {
                return opaque(obj);
            };
            entries.push((key, convert(&value, depth + 1)));
        }
        return ScriptValue::Map(entries);
    }

    if module == "numpy" {
        let method = if name == "ndarray" { "tolist" } else { "item" };
        if let Ok(plain) = obj.call_method0(method) {
            return convert(&plain, depth + 1);
        }
    }

    opaque(obj)
}

fn type_path(obj: &Bound<'_, PyAny>) -> (String, String) {
    let ty = obj.get_type();
    let attr = |name: &str| {
        ty.getattr(name)
            .and_then(|v| v.extract::<String>())
            .unwrap_or_default()
    };
    (attr("__module__"), attr("__name__"))
}

fn opaque(obj: &Bound<'_, PyAny>) -> ScriptValue {
    let (_, type_name) = type_path(obj);
    let repr = obj
        .str()
        .map(|s| s.to_string())
        .unwrap_or_else(|_| format!("<{type_name} object>"));
    ScriptValue::Opaque { type_name, repr }
}

/// Renders a dict key the way `json.dumps` does, `None` when it would refuse.
fn json_key(key: &Bound<'_, PyAny>) -> Option<String> {
    if key.is_none() {
        return Some("null".to_string());
    }
    if let Ok(b) = key.downcast::<PyBool>() {
        return Some(if b.is_true() { "true" } else { "false" }.to_string());
    }
    if key.is_instance_of::<PyString>() {
        return key.extract::<String>().ok();
    }
    if key.is_instance_of::<PyFloat>() {
        let f = key.extract::<f64>().ok()?;
        return Some(if f.is_nan() {
            "NaN".to_string()
        } else if f.is_infinite() {
            if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
        } else {
            key.repr().ok()?.to_string()
        });
    }
    if key.is_instance_of::<PyInt>() {
        return key.str().ok().map(|s| s.to_string());
    }
    None
}

fn strings(obj: &Bound<'_, PyAny>) -> PyResult<Vec<String>> {
    obj.iter()?
        .map(|item| item.and_then(|i| i.str()).map(|s| s.to_string()))
        .collect()
}

fn values(obj: &Bound<'_, PyAny>, depth: usize) -> PyResult<Vec<ScriptValue>> {
    obj.call_method0("tolist")?
        .iter()?
        .map(|item| item.map(|i| convert(&i, depth + 1)))
        .collect()
}

fn table(df: &Bound<'_, PyAny>, depth: usize) -> PyResult<ScriptValue> {
    let columns = strings(&df.getattr("columns")?)?;
    let column_types = strings(&df.getattr("dtypes")?.call_method0("tolist")?)?;
    let row_index = values(&df.getattr("index")?, depth)?;
    let rows = df
        .getattr("values")?
        .call_method0("tolist")?
        .iter()?
        .map(|row| {
            row.and_then(|row| {
                row.iter()?
                    .map(|cell| cell.map(|c| convert(&c, depth + 2)))
                    .collect::<PyResult<Vec<_>>>()
            })
        })
        .collect::<PyResult<Vec<_>>>()?;

    Ok(ScriptValue::Table(Table {
        columns,
        column_types,
        row_index,
        rows,
    }))
}

fn series(obj: &Bound<'_, PyAny>, depth: usize) -> PyResult<ScriptValue> {
    let name = obj.getattr("name")?;
    let name = if name.is_none() {
        None
    } else {
        Some(name.str()?.to_string())
    };

    Ok(ScriptValue::Series(Series {
        name,
        dtype: obj.getattr("dtype")?.str()?.to_string(),
        index: values(&obj.getattr("index")?, depth)?,
        values: values(obj, depth)?,
    }))
}

fn bitmap(img: &Bound<'_, PyAny>) -> PyResult<ScriptValue> {
    let mode: String = img.getattr("mode")?.extract()?;
    let (img, mode) = match PixelMode::parse(&mode) {
        Some(mode) => (img.clone(), mode),
        None => (img.call_method1("convert", ("RGBA",))?, PixelMode::Rgba),
    };
    let (width, height): (u32, u32) = img.getattr("size")?.extract()?;
    let raw = img.call_method0("tobytes")?;
    let pixels = raw.downcast::<PyBytes>()?.as_bytes().to_vec();

    Ok(ScriptValue::Bitmap(Bitmap {
        width,
        height,
        mode,
        pixels,
    }))
}

#[cfg(all(test, feature = "python"))]
mod tests {
    use super::*;

    fn eval(expr: &str) -> ScriptValue {
        Python::with_gil(|py| {
            let value = py.eval_bound(expr, None, None).unwrap();
            to_script_value(&value)
        })
    }

    fn key(k: &str, v: ScriptValue) -> (String, ScriptValue) {
        (k.to_string(), v)
    }

    #[test]
    fn test_bool_before_int() {
        assert_eq!(eval("True"), ScriptValue::Bool(true));
        assert_eq!(eval("1"), ScriptValue::Int(1));
        assert_eq!(eval("1.0"), ScriptValue::Float(1.0));
        assert!(matches!(
            eval("2 ** 70"),
            ScriptValue::Opaque { type_name, repr }
                if type_name == "int" && repr == "1180591620717411303424"
        ));
    }

    #[test]
    fn test_dict_keys_rendered_like_json() {
        let value = eval(
            "{'a': 1, 2: 'b', 1.5: None, True: 0.5, None: [], float('inf'): 1, float('nan'): 2}",
        );

        assert_eq!(
            value,
            ScriptValue::Map(vec![
                key("a", ScriptValue::Int(1)),
                key("2", ScriptValue::Str("b".to_string())),
                key("1.5", ScriptValue::Null),
                key("true", ScriptValue::Float(0.5)),
                key("null", ScriptValue::List(vec![])),
                key("Infinity", ScriptValue::Int(1)),
                key("NaN", ScriptValue::Int(2)),
            ])
        );
    }

    #[test]
    fn test_unrepresentable_dict_key() {
        assert!(matches!(
            eval("{(1, 2): 'x'}"),
            ScriptValue::Opaque { type_name, .. } if type_name == "dict"
        ));
    }

    #[test]
    fn test_nested_containers() {
        assert_eq!(
            eval("[(1, 'a'), {'k': [None]}]"),
            ScriptValue::List(vec![
                ScriptValue::List(vec![ScriptValue::Int(1), ScriptValue::Str("a".to_string())]),
                ScriptValue::Map(vec![key("k", ScriptValue::List(vec![ScriptValue::Null]))]),
            ])
        );
    }

    #[test]
    fn test_self_reference_is_bounded() {
        let value = Python::with_gil(|py| {
            let locals = PyDict::new_bound(py);
            py.run_bound("l = []\nl.append(l)", None, Some(&locals))
                .unwrap();
            to_script_value(&locals.get_item("l").unwrap().unwrap())
        });

        let mut current = &value;
        let mut depth = 0;
        while let ScriptValue::List(items) = current {
            current = &items[0];
            depth += 1;
        }
        assert!(matches!(current, ScriptValue::Opaque { type_name, .. } if type_name == "list"));
        assert_eq!(depth, MAX_DEPTH + 1);
    }
}
