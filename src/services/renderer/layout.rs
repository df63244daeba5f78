use serde_json::{Map, Value};

pub const DEFAULT_CANVAS_WIDTH: i64 = 1600;
pub const DEFAULT_CANVAS_HEIGHT: i64 = 1200;
pub const DEFAULT_QR_SIZE: i64 = 160;

const CANVAS_KEY: &str = "canvas";
const QR_KEY: &str = "qr";

/// Draw instructions for one text field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldLayout {
    pub x: i64,
    pub y: i64,
    pub size: Option<i64>,
    pub color: Option<String>,
    pub font: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QrLayout {
    pub x: i64,
    pub y: i64,
    /// Edge length of the generated code before resampling.
    pub size: i64,
    pub width: i64,
    pub height: i64,
}

/// A template's `layout_config`, parsed leniently.
///
/// Numbers may be given as JSON numbers or numeric strings; anything that
/// does not parse is treated as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    pub canvas_width: Option<i64>,
    pub canvas_height: Option<i64>,
    pub fields: Vec<(String, FieldLayout)>,
    pub qr: Option<QrLayout>,
}

impl Layout {
    pub fn from_config(config: Option<&Value>) -> Self {
        let Some(Value::Object(entries)) = config else {
            return Layout::default();
        };

        let mut layout = Layout::default();

        for (key, value) in entries {
            let object = value.as_object();
            match key.as_str() {
                CANVAS_KEY => {
                    layout.canvas_width = object.and_then(|o| int_value(o, "width"));
                    layout.canvas_height = object.and_then(|o| int_value(o, "height"));
                }
                QR_KEY => {
                    layout.qr = Some(parse_qr(object));
                }
                field => {
                    layout.fields.push((field.to_string(), parse_field(object)));
                }
            }
        }

        layout
    }

    pub fn canvas_size(&self) -> (i64, i64) {
        (
            self.canvas_width.unwrap_or(DEFAULT_CANVAS_WIDTH),
            self.canvas_height.unwrap_or(DEFAULT_CANVAS_HEIGHT),
        )
    }
}

fn parse_field(object: Option<&Map<String, Value>>) -> FieldLayout {
    let Some(object) = object else {
        return FieldLayout::default();
    };

    FieldLayout {
        x: int_value(object, "x").unwrap_or(0),
        y: int_value(object, "y").unwrap_or(0),
        size: int_value(object, "size"),
        color: string_value(object, "color"),
        font: string_value(object, "font"),
        format: string_value(object, "format"),
    }
}

fn parse_qr(object: Option<&Map<String, Value>>) -> QrLayout {
    let get = |key: &str| object.and_then(|o| int_value(o, key));
    let size = get("size").unwrap_or(DEFAULT_QR_SIZE);

    QrLayout {
        x: get("x").unwrap_or(0),
        y: get("y").unwrap_or(0),
        size,
        width: get("width").unwrap_or(size),
        height: get("height").unwrap_or(size),
    }
}

fn int_value(object: &Map<String, Value>, key: &str) -> Option<i64> {
    match object.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

fn string_value(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
