//! Conversion between JSON documents and Tantivy documents.
//!
//! Nested objects are flattened to dotted paths. Only mapped paths are indexed
//! into their own fields, but every string leaf also lands in `_all`, and the
//! whole document is kept verbatim in `_source`.

use chrono::DateTime as ChronoDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shoal_config::FieldType;
use tantivy::{
    DateTime, TantivyDocument,
    schema::{Field, Value as _},
};

use crate::{
    IndexError,
    schema::{GeoFields, IndexSchema, MappedField},
};

/// A document as stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDoc {
    /// Document id.
    pub id: String,
    /// The original JSON object.
    pub source: Map<String, Value>,
}

/// Builds a Tantivy document for `id` from a JSON object.
pub(crate) fn build_document(
    schema: &IndexSchema,
    id: &str,
    source: &Value,
) -> Result<TantivyDocument, IndexError> {
    if !source.is_object() {
        return Err(IndexError::InvalidDocument(
            "document must be a JSON object".to_string(),
        ));
    }

    let mut doc = TantivyDocument::new();
    doc.add_text(schema.id, id);
    doc.add_text(schema.source, source.to_string());
    Flattener { schema, doc: &mut doc }.visit("", source)?;
    Ok(doc)
}

/// Reads the id and source back out of a stored document.
pub(crate) fn decode_stored(
    schema: &IndexSchema,
    doc: &TantivyDocument,
) -> Result<StoredDoc, IndexError> {
    let id = doc
        .get_first(schema.id)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let raw = doc
        .get_first(schema.source)
        .and_then(|v| v.as_str())
        .unwrap_or("{}");
    let source = serde_json::from_str(raw)
        .map_err(|e| IndexError::Search(format!("corrupt stored source for '{id}': {e}")))?;
    Ok(StoredDoc { id, source })
}

/// Resolves a dotted path in a JSON object.
///
/// A literal key containing dots wins over nested traversal.
pub fn lookup_path<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(value) = map.get(path) {
        return Some(value);
    }
    let (head, rest) = path.split_once('.')?;
    match map.get(head)? {
        Value::Object(inner) => lookup_path(inner, rest),
        _ => None,
    }
}

/// Walks a JSON object and fills document fields.
struct Flattener<'a> {
    schema: &'a IndexSchema,
    doc: &'a mut TantivyDocument,
}

impl Flattener<'_> {
    /// Visits one value at a dotted path.
    fn visit(&mut self, path: &str, value: &Value) -> Result<(), IndexError> {
        if let Some(geo) = self.schema.geo(path) {
            return self.add_geo(path, geo, value);
        }
        match value {
            Value::Null => Ok(()),
            Value::Object(map) => {
                for (key, child) in map {
                    let child_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{path}.{key}")
                    };
                    self.visit(&child_path, child)?;
                }
                Ok(())
            }
            Value::Array(items) => {
                for item in items {
                    self.visit(path, item)?;
                }
                Ok(())
            }
            leaf => {
                if let Value::String(text) = leaf {
                    self.add_text(self.schema.all, text);
                }
                match self.schema.field(path) {
                    Some(mapped) if mapped.field != self.schema.all => {
                        self.add_leaf(path, mapped, leaf)
                    }
                    _ => Ok(()),
                }
            }
        }
    }

    /// Adds a scalar to its mapped field.
    fn add_leaf(&mut self, path: &str, mapped: MappedField, value: &Value) -> Result<(), IndexError> {
        let field = mapped.field;
        match mapped.ty {
            FieldType::Text | FieldType::Keyword => match value {
                Value::String(text) => self.add_text(field, text),
                other => self.add_text(field, &other.to_string()),
            },
            FieldType::F64 => {
                let number = as_f64(value).ok_or_else(|| mismatch(path, mapped.ty, value))?;
                self.doc.add_f64(field, number);
            }
            FieldType::I64 => {
                let number = as_i64(value).ok_or_else(|| mismatch(path, mapped.ty, value))?;
                self.doc.add_i64(field, number);
            }
            FieldType::Bool => {
                let flag = match value {
                    Value::Bool(flag) => Some(*flag),
                    Value::String(text) => text.parse().ok(),
                    _ => None,
                }
                .ok_or_else(|| mismatch(path, mapped.ty, value))?;
                self.doc.add_bool(field, flag);
            }
            FieldType::Date => {
                let date = as_date(value).ok_or_else(|| mismatch(path, mapped.ty, value))?;
                self.doc.add_date(field, date);
            }
            FieldType::Geo => {}
        }
        Ok(())
    }

    /// Adds text to a field and to its prefix companion, if any.
    fn add_text(&mut self, field: Field, text: &str) {
        self.doc.add_text(field, text);
        if let Some(companion) = self.schema.prefix_field(field) {
            self.doc.add_text(companion, text);
        }
    }

    /// Adds a geo value, which may hold several points.
    fn add_geo(&mut self, path: &str, geo: GeoFields, value: &Value) -> Result<(), IndexError> {
        if let Value::Array(items) = value {
            if items.iter().all(Value::is_number) {
                let point = parse_point(value).ok_or_else(|| mismatch(path, FieldType::Geo, value))?;
                return self.add_point(geo, point);
            }
            for item in items {
                self.add_geo(path, geo, item)?;
            }
            return Ok(());
        }
        if value.is_null() {
            return Ok(());
        }
        let point = parse_point(value).ok_or_else(|| mismatch(path, FieldType::Geo, value))?;
        self.add_point(geo, point)
    }

    /// Adds one latitude/longitude pair.
    fn add_point(&mut self, geo: GeoFields, (lat, lon): (f64, f64)) -> Result<(), IndexError> {
        self.doc.add_f64(geo.lat, lat);
        self.doc.add_f64(geo.lon, lon);
        Ok(())
    }
}

/// Error for a value that does not fit its field type.
fn mismatch(path: &str, ty: FieldType, value: &Value) -> IndexError {
    IndexError::InvalidDocument(format!("field '{path}' expects {ty}, got {value}"))
}

/// Reads a number, or a numeric string.
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Reads an integer, or an integral string.
fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Accepts RFC 3339 strings or integer epoch seconds.
fn as_date(value: &Value) -> Option<DateTime> {
    match value {
        Value::String(text) => ChronoDateTime::parse_from_rfc3339(text)
            .ok()
            .map(|date| DateTime::from_timestamp_micros(date.timestamp_micros())),
        Value::Number(number) => number.as_i64().map(DateTime::from_timestamp_secs),
        _ => None,
    }
}

/// Parses a point as `(lat, lon)`.
///
/// Accepts `{"lat", "lon"}` objects (`lng` is an alias), `[lon, lat]` arrays in
/// GeoJSON order, and `"lat,lon"` strings.
fn parse_point(value: &Value) -> Option<(f64, f64)> {
    let point = match value {
        Value::Object(map) => {
            let lat = map.get("lat").and_then(Value::as_f64)?;
            let lon = map.get("lon").or_else(|| map.get("lng")).and_then(Value::as_f64)?;
            (lat, lon)
        }
        Value::Array(items) if items.len() == 2 => (items[1].as_f64()?, items[0].as_f64()?),
        Value::String(text) => {
            let (lat, lon) = text.split_once(',')?;
            (lat.trim().parse().ok()?, lon.trim().parse().ok()?)
        }
        _ => return None,
    };
    let valid = (-90.0..=90.0).contains(&point.0) && (-180.0..=180.0).contains(&point.1);
    valid.then_some(point)
}
