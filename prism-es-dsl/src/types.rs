//! Scalar field types and their wire coercions
//!
//! `encode` converts an application value into the value stored in a
//! document source, `decode` converts a value read from a hit back.
//! Both operate on `serde_json::Value`.

use crate::error::DslError;
use crate::schema::Schema;
use crate::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat};
use serde_json::{Map, Number, Value};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum FieldType {
    String,
    Text,
    Keyword,
    Integer,
    Long,
    Short,
    Byte,
    Float,
    Double,
    Boolean,
    Date,
    Binary,
    Ip,
    GeoPoint,
    /// Untyped; values pass through unchanged
    Any,
    Object(Arc<Schema>),
    Nested(Arc<Schema>),
    List(Box<FieldType>),
}

impl PartialEq for FieldType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldType::Object(a), FieldType::Object(b))
            | (FieldType::Nested(a), FieldType::Nested(b)) => Arc::ptr_eq(a, b) || a == b,
            (FieldType::List(a), FieldType::List(b)) => a == b,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl FieldType {
    /// Mapping type name, `None` for [`FieldType::Any`]
    pub fn wire_name(&self) -> Option<&'static str> {
        let name = match self {
            FieldType::String => "string",
            FieldType::Text => "text",
            FieldType::Keyword => "keyword",
            FieldType::Integer => "integer",
            FieldType::Long => "long",
            FieldType::Short => "short",
            FieldType::Byte => "byte",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Binary => "binary",
            FieldType::Ip => "ip",
            FieldType::GeoPoint => "geo_point",
            FieldType::Any => return None,
            FieldType::Object(_) => "object",
            FieldType::Nested(_) => "nested",
            FieldType::List(inner) => return inner.wire_name(),
        };
        Some(name)
    }

    /// Scalar type for a mapping type name. Object and nested types need
    /// their properties and are resolved by the mapping parser.
    pub fn from_wire_name(name: &str) -> Option<FieldType> {
        let field_type = match name {
            "string" => FieldType::String,
            "text" => FieldType::Text,
            "keyword" => FieldType::Keyword,
            "integer" => FieldType::Integer,
            "long" => FieldType::Long,
            "short" => FieldType::Short,
            "byte" => FieldType::Byte,
            "float" => FieldType::Float,
            "double" => FieldType::Double,
            "boolean" => FieldType::Boolean,
            "date" => FieldType::Date,
            "binary" => FieldType::Binary,
            "ip" => FieldType::Ip,
            "geo_point" => FieldType::GeoPoint,
            _ => return None,
        };
        Some(field_type)
    }

    /// Schema of an object or nested field
    pub fn sub_schema(&self) -> Option<&Arc<Schema>> {
        match self {
            FieldType::Object(schema) | FieldType::Nested(schema) => Some(schema),
            FieldType::List(inner) => inner.sub_schema(),
            _ => None,
        }
    }

    /// Convert an application value to its wire form.
    ///
    /// With `validate` an unconvertible value is an error, otherwise it
    /// passes through unchanged.
    pub fn encode(&self, value: &Value, validate: bool) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if let FieldType::List(inner) = self {
            return match value {
                Value::Array(items) => items
                    .iter()
                    .map(|v| inner.encode(v, validate))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array),
                other => inner.encode(other, validate),
            };
        }
        if let Value::Array(items) = value {
            return items
                .iter()
                .map(|v| self.encode(v, validate))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array);
        }

        let converted = match self {
            FieldType::Any | FieldType::GeoPoint | FieldType::List(_) => Some(value.clone()),
            FieldType::String
            | FieldType::Text
            | FieldType::Keyword
            | FieldType::Binary
            | FieldType::Ip => match value {
                Value::String(_) => Some(value.clone()),
                Value::Number(n) => Some(Value::String(n.to_string())),
                Value::Bool(b) => Some(Value::String(b.to_string())),
                _ => None,
            },
            FieldType::Integer | FieldType::Long | FieldType::Short | FieldType::Byte => {
                to_integer(value)
            }
            FieldType::Float | FieldType::Double => to_float(value),
            FieldType::Boolean => to_bool(value),
            FieldType::Date => encode_date(value),
            FieldType::Object(schema) | FieldType::Nested(schema) => match value {
                Value::Object(obj) => Some(Value::Object(encode_object(schema, obj, validate)?)),
                _ => None,
            },
        };

        match converted {
            Some(v) => Ok(v),
            None if validate => Err(DslError::Validation(vec![format!(
                "cannot convert {} to {}",
                value,
                self.wire_name().unwrap_or("any")
            )])),
            None => Ok(value.clone()),
        }
    }

    /// Convert a wire value back; never fails, unconvertible values are
    /// returned as they are.
    pub fn decode(&self, value: &Value) -> Value {
        match (self, value) {
            (_, Value::Null) => Value::Null,
            (FieldType::List(inner), Value::Array(items)) => {
                Value::Array(items.iter().map(|v| inner.decode(v)).collect())
            }
            (FieldType::List(inner), other) => inner.decode(other),
            (_, Value::Array(items)) => Value::Array(items.iter().map(|v| self.decode(v)).collect()),
            (
                FieldType::Integer | FieldType::Long | FieldType::Short | FieldType::Byte,
                other,
            ) => to_integer(other).unwrap_or_else(|| other.clone()),
            (FieldType::Float | FieldType::Double, other) => {
                to_float(other).unwrap_or_else(|| other.clone())
            }
            (FieldType::Boolean, other) => to_bool(other).unwrap_or_else(|| other.clone()),
            (FieldType::Object(schema) | FieldType::Nested(schema), Value::Object(obj)) => {
                let mut decoded = Map::new();
                for (key, v) in obj {
                    let v = match schema.resolve(key) {
                        Ok(field) => field.field_type.decode(v),
                        Err(_) => v.clone(),
                    };
                    decoded.insert(key.clone(), v);
                }
                Value::Object(decoded)
            }
            (_, other) => other.clone(),
        }
    }
}

fn encode_object(
    schema: &Schema,
    obj: &Map<String, Value>,
    validate: bool,
) -> Result<Map<String, Value>> {
    let mut encoded = Map::new();
    for (key, v) in obj {
        let v = match schema.resolve(key) {
            Ok(field) => field.field_type.encode(v, validate)?,
            Err(_) => v.clone(),
        };
        encoded.insert(key.clone(), v);
    }
    Ok(encoded)
}

fn to_integer(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.is_finite() && f.fract() == 0.0)
            .filter(|f| *f >= i64::MIN as f64 && *f < i64::MAX as f64)
            .map(|f| Value::from(f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        _ => None,
    }
}

fn to_bool(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(_) => Some(value.clone()),
        Value::String(s) => match s.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

fn encode_date(value: &Value) -> Option<Value> {
    match value {
        // epoch millis
        Value::Number(_) => Some(value.clone()),
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)));
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return Some(Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()));
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
        }
        _ => None,
    }
}
