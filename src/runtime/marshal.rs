//! Conversion of script return values into JSON-safe structures.
//!
//! [`marshal`] is total: values that cannot be represented are replaced by an
//! `unserializable` stand-in instead of failing the attempt.

use std::collections::HashSet;
use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageBuffer, ImageFormat};
use serde_json::{Map, Number, Value, json};

use crate::runtime::value::{Bitmap, PixelMode, ScriptValue, Series, Table};

pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

pub fn png_data_uri(png: &[u8]) -> String {
    format!("{PNG_DATA_URI_PREFIX}{}", STANDARD.encode(png))
}

pub fn marshal(value: &ScriptValue) -> Value {
    match value {
        ScriptValue::Null => Value::Null,
        ScriptValue::Table(table) => marshal_table(table),
        ScriptValue::Series(series) => marshal_series(series),
        ScriptValue::Bitmap(bitmap) => match encode_png(bitmap) {
            Ok(png) => json!({
                "kind": "image",
                "format": "png",
                "data": png_data_uri(&png),
                "size": [bitmap.width, bitmap.height],
                "mode": bitmap.mode.as_str(),
            }),
            Err(msg) => {
                tracing::warn!("Falling back to unserializable image: {}", msg);
                unserializable(value)
            }
        },
        ScriptValue::Bool(b) => Value::Bool(*b),
        ScriptValue::Int(i) => Value::from(*i),
        ScriptValue::Float(f) => match Number::from_f64(*f) {
            Some(n) => Value::Number(n),
            None => unserializable(value),
        },
        ScriptValue::Str(s) => Value::String(s.clone()),
        ScriptValue::List(items) => Value::Array(items.iter().map(marshal).collect()),
        ScriptValue::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), marshal(v)))
                .collect::<Map<_, _>>(),
        ),
        ScriptValue::Opaque { .. } => unserializable(value),
    }
}

fn unserializable(value: &ScriptValue) -> Value {
    json!({
        "kind": "unserializable",
        "value": value.render(),
        "type": value.type_name(),
    })
}

fn marshal_table(table: &Table) -> Value {
    let columns = unique_columns(&table.columns);
    let rows: Vec<Value> = table
        .rows
        .iter()
        .map(|row| {
            Value::Object(
                columns
                    .iter()
                    .zip(row.iter())
                    .map(|(column, cell)| (column.clone(), marshal(cell)))
                    .collect(),
            )
        })
        .collect();
    let column_types: Map<String, Value> = columns
        .iter()
        .zip(table.column_types.iter())
        .map(|(column, ty)| (column.clone(), Value::String(ty.clone())))
        .collect();
    let (r, c) = table.shape();

    json!({
        "kind": "table",
        "rows": rows,
        "columns": columns,
        "row_index": table.row_index.iter().map(marshal).collect::<Vec<_>>(),
        "shape": [r, c],
        "column_types": column_types,
    })
}

/// Repeated column labels get a `.N` suffix, so every cell keeps its own key.
fn unique_columns(columns: &[String]) -> Vec<String> {
    let seen: HashSet<&str> = columns.iter().map(String::as_str).collect();
    if seen.len() == columns.len() {
        return columns.to_vec();
    }
    tracing::warn!("Table has duplicate column labels, suffixing repeats");

    let mut emitted: HashSet<&str> = HashSet::new();
    let mut renamed = Vec::with_capacity(columns.len());
    let mut taken: HashSet<String> = HashSet::new();
    for column in columns {
        if emitted.insert(column.as_str()) {
            renamed.push(column.clone());
            continue;
        }
        let candidate = (1..)
            .map(|n| format!("{column}.{n}"))
            .find(|c| !seen.contains(c.as_str()) && !taken.contains(c))
            .unwrap_or_else(|| column.clone());
        taken.insert(candidate.clone());
        renamed.push(candidate);
    }
    renamed
}

fn marshal_series(series: &Series) -> Value {
    let data: Map<String, Value> = series
        .index
        .iter()
        .zip(series.values.iter())
        .map(|(label, value)| (label.render(), marshal(value)))
        .collect();

    json!({
        "kind": "series",
        "data": data,
        "name": series.name,
        "dtype": series.dtype,
        "index": series.index.iter().map(marshal).collect::<Vec<_>>(),
    })
}

fn encode_png(bitmap: &Bitmap) -> Result<Vec<u8>, String> {
    let expected = bitmap.width as usize * bitmap.height as usize * bitmap.mode.channels();
    if bitmap.pixels.len() != expected {
        return Err(format!(
            "pixel buffer has {} bytes, {}x{} {} needs {}",
            bitmap.pixels.len(),
            bitmap.width,
            bitmap.height,
            bitmap.mode.as_str(),
            expected
        ));
    }

    let (w, h, pixels) = (bitmap.width, bitmap.height, bitmap.pixels.clone());
    let image = match bitmap.mode {
        PixelMode::L => ImageBuffer::from_raw(w, h, pixels).map(DynamicImage::ImageLuma8),
        PixelMode::La => ImageBuffer::from_raw(w, h, pixels).map(DynamicImage::ImageLumaA8),
        PixelMode::Rgb => ImageBuffer::from_raw(w, h, pixels).map(DynamicImage::ImageRgb8),
        PixelMode::Rgba => ImageBuffer::from_raw(w, h, pixels).map(DynamicImage::ImageRgba8),
    }
    .ok_or_else(|| "pixel buffer does not match image geometry".to_string())?;

    let mut png = Cursor::new(Vec::new());
    image
        .write_to(&mut png, ImageFormat::Png)
        .map_err(|e| e.to_string())?;
    Ok(png.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_nested() -> ScriptValue {
        ScriptValue::Map(vec![
            ("name".to_string(), ScriptValue::Str("demo".to_string())),
            ("count".to_string(), ScriptValue::Int(3)),
            ("ratio".to_string(), ScriptValue::Float(0.25)),
            ("ok".to_string(), ScriptValue::Bool(true)),
            ("missing".to_string(), ScriptValue::Null),
            (
                "items".to_string(),
                ScriptValue::List(vec![
                    ScriptValue::Int(1),
                    ScriptValue::List(vec![ScriptValue::Str("x".to_string())]),
                ]),
            ),
        ])
    }

    fn sample_table() -> Table {
        Table {
            columns: vec!["x".to_string(), "y".to_string()],
            column_types: vec!["int64".to_string(), "float64".to_string()],
            row_index: vec![ScriptValue::Int(0), ScriptValue::Int(1), ScriptValue::Int(2)],
            rows: vec![
                vec![ScriptValue::Int(1), ScriptValue::Float(4.5)],
                vec![ScriptValue::Int(2), ScriptValue::Float(5.5)],
                vec![ScriptValue::Int(3), ScriptValue::Float(6.5)],
            ],
        }
    }

    #[test]
    fn test_plain_values_pass_through() {
        let value = marshal(&plain_nested());

        assert_eq!(
            value,
            json!({
                "name": "demo",
                "count": 3,
                "ratio": 0.25,
                "ok": true,
                "missing": null,
                "items": [1, ["x"]],
            })
        );
        assert_eq!(marshal(&ScriptValue::Null), Value::Null);
        assert_eq!(marshal(&ScriptValue::Str("s".into())), json!("s"));
    }

    #[test]
    fn test_map_preserves_key_order() {
        let value = marshal(&ScriptValue::Map(vec![
            ("b".to_string(), ScriptValue::Int(1)),
            ("a".to_string(), ScriptValue::Int(2)),
        ]));

        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_table_shape_and_columns() {
        let value = marshal(&ScriptValue::Table(sample_table()));

        assert_eq!(value["kind"], "table");
        assert_eq!(value["shape"], json!([3, 2]));
        assert_eq!(value["columns"].as_array().unwrap().len(), 2);
        assert_eq!(value["rows"][1], json!({"x": 2, "y": 5.5}));
        assert_eq!(value["row_index"], json!([0, 1, 2]));
        assert_eq!(value["column_types"], json!({"x": "int64", "y": "float64"}));
    }

    #[test]
    fn test_duplicate_columns_keep_every_cell() {
        let table = Table {
            columns: vec!["a".to_string(), "a".to_string(), "a.1".to_string()],
            column_types: vec![
                "int64".to_string(),
                "float64".to_string(),
                "object".to_string(),
            ],
            row_index: vec![ScriptValue::Int(0)],
            rows: vec![vec![
                ScriptValue::Int(1),
                ScriptValue::Float(2.5),
                ScriptValue::Str("z".to_string()),
            ]],
        };

        let value = marshal(&ScriptValue::Table(table));

        assert_eq!(value["shape"], json!([1, 3]));
        assert_eq!(value["columns"], json!(["a", "a.2", "a.1"]));
        assert_eq!(value["rows"][0], json!({"a": 1, "a.2": 2.5, "a.1": "z"}));
        assert_eq!(
            value["column_types"],
            json!({"a": "int64", "a.2": "float64", "a.1": "object"})
        );
    }

    #[test]
    fn test_empty_table() {
        let table = Table {
            columns: vec!["a".to_string()],
            column_types: vec!["object".to_string()],
            row_index: vec![],
            rows: vec![],
        };

        let value = marshal(&ScriptValue::Table(table));

        assert_eq!(value["shape"], json!([0, 1]));
        assert_eq!(value["rows"], json!([]));
    }

    #[test]
    fn test_series() {
        let series = Series {
            name: Some("price".to_string()),
            dtype: "float64".to_string(),
            index: vec![
                ScriptValue::Str("a".to_string()),
                ScriptValue::Str("b".to_string()),
            ],
            values: vec![ScriptValue::Float(1.5), ScriptValue::Float(f64::NAN)],
        };

        let value = marshal(&ScriptValue::Series(series));

        assert_eq!(value["kind"], "series");
        assert_eq!(value["name"], "price");
        assert_eq!(value["dtype"], "float64");
        assert_eq!(value["index"], json!(["a", "b"]));
        assert_eq!(value["data"]["a"], 1.5);
        assert_eq!(value["data"]["b"]["kind"], "unserializable");
    }

    #[test]
    fn test_bitmap_becomes_png_data_uri() {
        let bitmap = Bitmap {
            width: 2,
            height: 1,
            mode: PixelMode::Rgb,
            pixels: vec![255, 0, 0, 0, 0, 255],
        };

        let value = marshal(&ScriptValue::Bitmap(bitmap));

        assert_eq!(value["kind"], "image");
        assert_eq!(value["format"], "png");
        assert_eq!(value["size"], json!([2, 1]));
        assert_eq!(value["mode"], "RGB");
        let data = value["data"].as_str().unwrap();
        let png = STANDARD
            .decode(data.strip_prefix(PNG_DATA_URI_PREFIX).unwrap())
            .unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_malformed_bitmap_degrades() {
        let bitmap = Bitmap {
            width: 10,
            height: 10,
            mode: PixelMode::Rgba,
            pixels: vec![0; 3],
        };

        let value = marshal(&ScriptValue::Bitmap(bitmap));

        assert_eq!(value["kind"], "unserializable");
        assert_eq!(value["type"], "image");
        assert_eq!(value["value"], "<image RGBA 10x10>");
    }

    #[test]
    fn test_opaque_and_non_finite() {
        let value = marshal(&ScriptValue::Opaque {
            type_name: "Connection".to_string(),
            repr: "<Connection at 0x7f>".to_string(),
        });
        assert_eq!(
            value,
            json!({"kind": "unserializable", "value": "<Connection at 0x7f>", "type": "Connection"})
        );

        let value = marshal(&ScriptValue::Float(f64::INFINITY));
        assert_eq!(
            value,
            json!({"kind": "unserializable", "value": "inf", "type": "float"})
        );
    }

    #[test]
    fn test_nested_table_is_converted() {
        let value = marshal(&ScriptValue::List(vec![
            ScriptValue::Int(1),
            ScriptValue::Table(sample_table()),
        ]));

        assert_eq!(value[0], 1);
        assert_eq!(value[1]["kind"], "table");
    }
}
