use std::collections::HashMap;

use apache_avro::Schema;
use apache_avro::types::Value;
use herald_api::error::BackendError;

// ═══════════════════════════════════════════════════════════════
//  JSON → Avro conversion
// ═══════════════════════════════════════════════════════════════

/// Named schemas (records, enums, fixed) by full name, for resolving `Ref`s.
pub(crate) type Names = HashMap<String, Schema>;

pub(crate) fn collect_names(schema: &Schema, names: &mut Names) {
    match schema {
        Schema::Record(record) => {
            names.insert(record.name.fullname(None), schema.clone());
            for field in &record.fields {
                collect_names(&field.schema, names);
            }
        }
        Schema::Enum(e) => {
            names.insert(e.name.fullname(None), schema.clone());
        }
        Schema::Fixed(f) => {
            names.insert(f.name.fullname(None), schema.clone());
        }
        Schema::Array(inner) => collect_names(&inner.items, names),
        Schema::Map(inner) => collect_names(&inner.types, names),
        Schema::Union(union) => {
            for variant in union.variants() {
                collect_names(variant, names);
            }
        }
        _ => {}
    }
}

/// Converts JSON values to Avro values, driven by the schema.
///
/// Unlike a loose best-effort mapping, a JSON value of the wrong shape is an
/// error: nothing is coerced to null or zero.
pub(crate) struct Converter<'a> {
    names: &'a Names,
}

impl<'a> Converter<'a> {
    pub(crate) fn new(names: &'a Names) -> Self {
        Self { names }
    }

    pub(crate) fn convert(&self, val: &serde_json::Value, schema: &Schema, path: &str) -> Result<Value, BackendError> {
        use serde_json::Value as Json;

        match (val, schema) {
            (Json::Null, Schema::Null) => Ok(Value::Null),
            (Json::Bool(b), Schema::Boolean) => Ok(Value::Boolean(*b)),
            (Json::Number(_), Schema::Int) => self.int(val, path).map(Value::Int),
            (Json::Number(n), Schema::Long) => n.as_i64().map(Value::Long).ok_or_else(|| mismatch(path, "long", val)),
            (Json::Number(n), Schema::Float) => n
                .as_f64()
                .map(|f| Value::Float(f as f32))
                .ok_or_else(|| mismatch(path, "float", val)),
            (Json::Number(n), Schema::Double) => n.as_f64().map(Value::Double).ok_or_else(|| mismatch(path, "double", val)),
            (Json::String(s), Schema::String) => Ok(Value::String(s.clone())),
            (Json::String(s), Schema::Bytes) => latin1_bytes(s, path).map(Value::Bytes),
            (Json::String(s), Schema::Fixed(fixed)) => {
                let bytes = latin1_bytes(s, path)?;
                if bytes.len() != fixed.size {
                    return Err(BackendError::serialization(format!(
                        "{path}: fixed '{}' needs {} bytes, got {}",
                        fixed.name.name,
                        fixed.size,
                        bytes.len()
                    )));
                }
                Ok(Value::Fixed(fixed.size, bytes))
            }
            (Json::String(s), Schema::Enum(e)) => match e.symbols.iter().position(|sym| sym == s) {
                Some(idx) => Ok(Value::Enum(idx as u32, s.clone())),
                None => Err(BackendError::serialization(format!(
                    "{path}: '{s}' is not a symbol of enum '{}'",
                    e.name.name
                ))),
            },

            (Json::Number(_), Schema::Date) => self.int(val, path).map(Value::Date),
            (Json::Number(_), Schema::TimeMillis) => self.int(val, path).map(Value::TimeMillis),
            (Json::Number(n), Schema::TimeMicros) => n.as_i64().map(Value::TimeMicros).ok_or_else(|| mismatch(path, "time-micros", val)),
            (Json::Number(n), Schema::TimestampMillis) => n
                .as_i64()
                .map(Value::TimestampMillis)
                .ok_or_else(|| mismatch(path, "timestamp-millis", val)),
            (Json::Number(n), Schema::TimestampMicros) => n
                .as_i64()
                .map(Value::TimestampMicros)
                .ok_or_else(|| mismatch(path, "timestamp-micros", val)),

            (Json::Array(items), Schema::Array(inner)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.convert(item, &inner.items, &format!("{path}[{i}]")))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (Json::Object(map), Schema::Map(inner)) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), self.convert(v, &inner.types, &format!("{path}.{k}"))?)))
                .collect::<Result<HashMap<_, _>, BackendError>>()
                .map(Value::Map),
            (Json::Object(map), Schema::Record(record)) => {
                let mut fields = Vec::with_capacity(record.fields.len());
                for field in &record.fields {
                    let field_path = format!("{path}.{}", field.name);
                    let avro = match (map.get(&field.name), &field.default) {
                        (Some(v), _) => self.convert(v, &field.schema, &field_path)?,
                        (None, Some(default)) => self.convert(default, &field.schema, &field_path)?,
                        (None, None) => {
                            return Err(BackendError::serialization(format!(
                                "{field_path}: required field is missing"
                            )));
                        }
                    };
                    fields.push((field.name.clone(), avro));
                }
                Ok(Value::Record(fields))
            }

            (_, Schema::Union(union)) => {
                for (idx, variant) in union.variants().iter().enumerate() {
                    if let Ok(v) = self.convert(val, variant, path) {
                        return Ok(Value::Union(idx as u32, Box::new(v)));
                    }
                }
                Err(BackendError::serialization(format!(
                    "{path}: {val} matches no branch of the union"
                )))
            }
            (_, Schema::Ref { name }) => match self.names.get(&name.fullname(None)) {
                Some(named) => self.convert(val, named, path),
                None => Err(BackendError::serialization(format!(
                    "{path}: unresolved schema reference '{}'",
                    name.fullname(None)
                ))),
            },

            // Remaining logical types (uuid, decimal, duration, local timestamps)
            // go through the library's own resolution rules.
            (_, Schema::Uuid | Schema::Decimal(_) | Schema::BigDecimal | Schema::Duration)
            | (_, Schema::TimestampNanos | Schema::LocalTimestampMillis | Schema::LocalTimestampMicros)
            | (_, Schema::LocalTimestampNanos) => Value::from(val.clone())
                .resolve(schema)
                .map_err(|e| BackendError::serialization(format!("{path}: {e}"))),

            (_, other) => Err(mismatch(path, &format!("{other:?}"), val)),
        }
    }

    fn int(&self, val: &serde_json::Value, path: &str) -> Result<i32, BackendError> {
        val.as_i64()
            .and_then(|i| i32::try_from(i).ok())
            .ok_or_else(|| mismatch(path, "int", val))
    }
}

fn mismatch(path: &str, expected: &str, got: &serde_json::Value) -> BackendError {
    let path = if path.is_empty() { "$" } else { path };
    BackendError::serialization(format!("{path}: expected {expected}, got {got}"))
}

/// Avro's JSON form for bytes: one char per byte, code points 0..=255.
fn latin1_bytes(s: &str, path: &str) -> Result<Vec<u8>, BackendError> {
    s.chars()
        .map(|c| u8::try_from(u32::from(c)))
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| BackendError::serialization(format!("{path}: bytes string has a char above U+00FF")))
}

// ═══════════════════════════════════════════════════════════════
//  Avro → JSON conversion
// ═══════════════════════════════════════════════════════════════

pub(crate) fn avro_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Int(i) | Value::Date(i) | Value::TimeMillis(i) => serde_json::json!(i),
        Value::Long(l)
        | Value::TimeMicros(l)
        | Value::TimestampMillis(l)
        | Value::TimestampMicros(l)
        | Value::TimestampNanos(l)
        | Value::LocalTimestampMillis(l)
        | Value::LocalTimestampMicros(l)
        | Value::LocalTimestampNanos(l) => serde_json::json!(l),
        Value::Float(f) => serde_json::json!(f),
        Value::Double(d) => serde_json::json!(d),
        Value::Bytes(b) | Value::Fixed(_, b) => serde_json::Value::String(b.iter().map(|&byte| char::from(byte)).collect()),
        Value::String(s) | Value::Enum(_, s) => serde_json::Value::String(s.clone()),
        Value::Union(_, inner) => avro_to_json(inner),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(avro_to_json).collect()),
        Value::Map(entries) => serde_json::Value::Object(
            entries.iter().map(|(k, v)| (k.clone(), avro_to_json(v))).collect(),
        ),
        Value::Record(fields) => serde_json::Value::Object(
            fields.iter().map(|(k, v)| (k.clone(), avro_to_json(v))).collect(),
        ),
        Value::Uuid(u) => serde_json::Value::String(u.to_string()),
        Value::BigDecimal(d) => serde_json::Value::String(d.to_string()),
        Value::Decimal(_) | Value::Duration(_) => serde_json::Value::Null,
    }
}
