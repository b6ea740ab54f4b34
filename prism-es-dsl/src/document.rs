//! Document instances
//!
//! A [`Document`] pairs a schema with field values. Application code
//! builds one to index it; the result model builds one from every hit.

use crate::config::ValidationMode;
use crate::error::DslError;
use crate::schema::{is_mapping_field, Schema};
use crate::Result;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Meta fields carried in bulk action lines, in emission order
pub const META_FIELD_NAMES: [&str; 8] = [
    "_id",
    "_index",
    "_type",
    "_routing",
    "_parent",
    "_timestamp",
    "_ttl",
    "_version",
];

#[derive(Debug, Clone)]
pub struct Document {
    schema: Arc<Schema>,
    pub id: Option<String>,
    pub index: Option<String>,
    pub doc_type: Option<String>,
    pub routing: Option<String>,
    pub parent: Option<String>,
    pub version: Option<i64>,
    pub score: Option<f64>,
    pub timestamp: Option<Value>,
    pub ttl: Option<Value>,
    /// `highlight` section of a hit
    pub highlight: Option<Value>,
    /// Sort values of a hit
    pub sort: Option<Value>,
    source: Map<String, Value>,
}

impl Document {
    pub fn new(schema: &Arc<Schema>) -> Self {
        Self {
            schema: Arc::clone(schema),
            id: None,
            index: None,
            doc_type: None,
            routing: None,
            parent: None,
            version: None,
            score: None,
            timestamp: None,
            ttl: None,
            highlight: None,
            sort: None,
            source: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Builder form of [`Document::set`]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Set a field value. The name must resolve against the schema.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.schema.resolve(name)?;
        self.source.insert(name.to_string(), value.into());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.source.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.source.remove(name)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Field values in insertion order
    pub fn source(&self) -> &Map<String, Value> {
        &self.source
    }

    /// Hydrate from a raw hit or get response. Source values are decoded
    /// with the types of the schema fields; unknown keys are kept as-is.
    pub fn from_hit(schema: &Arc<Schema>, hit: &Value) -> Self {
        let mut doc = Document::new(schema);
        doc.id = hit.get("_id").and_then(value_to_string);
        doc.index = hit.get("_index").and_then(value_to_string);
        doc.doc_type = hit.get("_type").and_then(value_to_string);
        doc.routing = hit.get("_routing").and_then(value_to_string);
        doc.parent = hit.get("_parent").and_then(value_to_string);
        doc.version = hit.get("_version").and_then(Value::as_i64);
        doc.score = hit.get("_score").and_then(Value::as_f64);
        doc.highlight = hit.get("highlight").cloned();
        doc.sort = hit.get("sort").cloned();

        if let Some(Value::Object(source)) = hit.get("_source") {
            for (key, value) in source {
                let decoded = match schema.resolve(key) {
                    Ok(field) => field.field_type.decode(value),
                    Err(_) => value.clone(),
                };
                doc.source.insert(key.clone(), decoded);
            }
        }
        doc
    }

    /// Meta fields for a bulk action line; empty values are skipped
    pub fn to_meta(&self) -> Map<String, Value> {
        let doc_type = self
            .schema
            .doc_type()
            .map(String::from)
            .or_else(|| self.doc_type.clone());

        let mut meta = Map::new();
        for name in META_FIELD_NAMES {
            let value = match name {
                "_id" => self.id.clone().map(Value::from),
                "_index" => self.index.clone().map(Value::from),
                "_type" => doc_type.clone().map(Value::from),
                "_routing" => self.routing.clone().map(Value::from),
                "_parent" => self.parent.clone().map(Value::from),
                "_timestamp" => self.timestamp.clone(),
                "_ttl" => self.ttl.clone(),
                "_version" => self.version.map(Value::from),
                _ => None,
            };
            if let Some(value) = value.filter(|v| !is_empty(v)) {
                meta.insert(name.to_string(), value);
            }
        }
        meta
    }

    /// Serialize field values for indexing.
    ///
    /// Empty values (`null`, `""`, `[]`) are left out. With validation
    /// enabled a required field that ends up absent is an error; `Strict`
    /// stops at the first problem, `Full` reports all of them.
    pub fn to_source(&self, validation: ValidationMode) -> Result<Map<String, Value>> {
        let validate = validation.is_enabled();
        let mut errors = Vec::new();
        let mut source = Map::new();

        for (key, value) in &self.source {
            if is_mapping_field(key) {
                continue;
            }
            let Ok(field) = self.schema.resolve(key) else {
                continue;
            };
            if is_empty(value) {
                continue;
            }
            match field.field_type.encode(value, validate) {
                Ok(encoded) => {
                    source.insert(field.name.clone(), encoded);
                }
                Err(DslError::Validation(messages)) => {
                    let messages = messages.into_iter().map(|m| format!("'{}': {}", key, m));
                    errors.extend(messages);
                    if validation == ValidationMode::Strict {
                        return Err(DslError::Validation(errors));
                    }
                }
                Err(e) => return Err(e),
            }
        }

        if validate {
            for field in self.schema.user_fields() {
                if field.is_required() && !source.contains_key(&field.name) {
                    errors.push(DslError::required(&field.name));
                    if validation == ValidationMode::Strict {
                        break;
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(source)
        } else {
            Err(DslError::Validation(errors))
        }
    }
}

/// `None`, empty string and empty list all count as absent
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;
    use crate::types::FieldType;
    use serde_json::json;

    fn article() -> Arc<Schema> {
        Schema::builder("article")
            .field(Field::new("title", FieldType::Text).required())
            .field(Field::new("author", FieldType::Keyword).required())
            .field(Field::new("views", FieldType::Integer))
            .build()
    }

    #[test]
    fn test_set_unknown_field() {
        let mut doc = Document::new(&article());
        let err = doc.set("color", "red").unwrap_err();
        assert!(matches!(err, DslError::UnknownField { .. }));
    }

    #[test]
    fn test_from_hit_decodes_source() {
        let hit = json!({
            "_id": "1",
            "_index": "articles",
            "_type": "article",
            "_score": 1.5,
            "_source": {"title": "Rust", "views": "10", "extra": true}
        });
        let doc = Document::from_hit(&article(), &hit);
        assert_eq!(doc.id.as_deref(), Some("1"));
        assert_eq!(doc.score, Some(1.5));
        assert_eq!(doc.get("views"), Some(&json!(10)));
        assert_eq!(doc.get("extra"), Some(&json!(true)));
    }

    #[test]
    fn test_to_meta_skips_empty() {
        let doc = Document::new(&article()).with_id("7").with_routing("");
        let meta = doc.to_meta();
        assert_eq!(Value::Object(meta), json!({"_id": "7", "_type": "article"}));
    }

    #[test]
    fn test_to_source_empty_values_absent() {
        let doc = Document::new(&article())
            .with("title", "Rust")
            .unwrap()
            .with("author", "")
            .unwrap()
            .with("views", json!([]))
            .unwrap();
        let source = doc.to_source(ValidationMode::Off).unwrap();
        assert_eq!(Value::Object(source), json!({"title": "Rust"}));
    }

    #[test]
    fn test_strict_validation_first_error() {
        let doc = Document::new(&article());
        let err = doc.to_source(ValidationMode::Strict).unwrap_err();
        match err {
            DslError::Validation(messages) => assert_eq!(messages, vec!["'title' is required"]),
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_full_validation_collects() {
        let doc = Document::new(&article()).with("author", json!(null)).unwrap();
        let err = doc.to_source(ValidationMode::Full).unwrap_err();
        assert_eq!(err.to_string(), "Validation error: 'title' is required; 'author' is required");
    }

    #[test]
    fn test_validation_passes_when_populated() {
        let doc = Document::new(&article())
            .with("title", "Rust")
            .unwrap()
            .with("author", "ferris")
            .unwrap()
            .with("views", "3")
            .unwrap();
        let source = doc.to_source(ValidationMode::Strict).unwrap();
        assert_eq!(
            Value::Object(source),
            json!({"title": "Rust", "author": "ferris", "views": 3})
        );
    }
}
