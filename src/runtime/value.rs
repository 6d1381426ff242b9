/// A script return value as handed over by the language host.
#[derive(Clone, Debug, PartialEq)]
pub enum ScriptValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ScriptValue>),
    /// Insertion-ordered, string-keyed mapping.
    Map(Vec<(String, ScriptValue)>),
    Table(Table),
    Series(Series),
    Bitmap(Bitmap),
    /// Anything the host could not map onto the variants above.
    Opaque { type_name: String, repr: String },
}

/// Two-dimensional labeled data.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    /// Type name per column, same order as `columns`.
    pub column_types: Vec<String>,
    pub row_index: Vec<ScriptValue>,
    /// Row-major cells; every row has `columns.len()` entries.
    pub rows: Vec<Vec<ScriptValue>>,
}

impl Table {
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }
}

/// One-dimensional labeled data.
#[derive(Clone, Debug, PartialEq)]
pub struct Series {
    pub name: Option<String>,
    pub dtype: String,
    pub index: Vec<ScriptValue>,
    pub values: Vec<ScriptValue>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelMode {
    L,
    La,
    Rgb,
    Rgba,
}

impl PixelMode {
    pub fn channels(&self) -> usize {
        match self {
            PixelMode::L => 1,
            PixelMode::La => 2,
            PixelMode::Rgb => 3,
            PixelMode::Rgba => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PixelMode::L => "L",
            PixelMode::La => "LA",
            PixelMode::Rgb => "RGB",
            PixelMode::Rgba => "RGBA",
        }
    }

    pub fn parse(mode: &str) -> Option<Self> {
        match mode {
            "L" => Some(PixelMode::L),
            "LA" => Some(PixelMode::La),
            "RGB" => Some(PixelMode::Rgb),
            "RGBA" => Some(PixelMode::Rgba),
            _ => None,
        }
    }
}

/// Raw, uncompressed image pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub mode: PixelMode,
    pub pixels: Vec<u8>,
}

impl ScriptValue {
    /// Type name used when the value has to be reported as unserializable.
    pub fn type_name(&self) -> &str {
        match self {
            ScriptValue::Null => "null",
            ScriptValue::Bool(_) => "bool",
            ScriptValue::Int(_) => "int",
            ScriptValue::Float(_) => "float",
            ScriptValue::Str(_) => "str",
            ScriptValue::List(_) => "list",
            ScriptValue::Map(_) => "dict",
            ScriptValue::Table(_) => "table",
            ScriptValue::Series(_) => "series",
            ScriptValue::Bitmap(_) => "image",
            ScriptValue::Opaque { type_name, .. } => type_name,
        }
    }

    /// Plain-text rendering, used for mapping keys and unserializable stand-ins.
    pub fn render(&self) -> String {
        match self {
            ScriptValue::Null => "None".to_string(),
            ScriptValue::Bool(true) => "True".to_string(),
            ScriptValue::Bool(false) => "False".to_string(),
            ScriptValue::Int(i) => i.to_string(),
            ScriptValue::Float(f) => render_float(*f),
            ScriptValue::Str(s) => s.clone(),
            ScriptValue::List(items) => format!(
                "[{}]",
                items.iter().map(ScriptValue::render).collect::<Vec<_>>().join(", ")
            ),
            ScriptValue::Map(entries) => format!(
                "{{{}}}",
                entries
                    .iter()
                    .map(|(k, v)| format!("{k}: {}", v.render()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            ScriptValue::Table(table) => {
                let (rows, cols) = table.shape();
                format!("<table {rows}x{cols}>")
            }
            ScriptValue::Series(series) => format!(
                "<series {} len={}>",
                series.name.as_deref().unwrap_or("unnamed"),
                series.values.len()
            ),
            ScriptValue::Bitmap(bitmap) => format!(
                "<image {} {}x{}>",
                bitmap.mode.as_str(),
                bitmap.width,
                bitmap.height
            ),
            ScriptValue::Opaque { repr, .. } => repr.clone(),
        }
    }
}

fn render_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}
