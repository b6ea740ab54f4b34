//! Put-mapping endpoint and the inverse mapping parser

use super::{ApiMethod, CallParams, CompiledEndpoint};
use crate::compiler::{doc_types, Compiler};
use crate::error::DslError;
use crate::result::PutMappingResult;
use crate::schema::{is_mapping_field, DynamicTemplate, Field, Schema, MAPPING_FIELDS};
use crate::types::FieldType;
use crate::Result;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Field options that never reach the mapping document
const LOCAL_OPTIONS: [&str; 1] = ["required"];

pub struct CompiledPutMapping {
    params: CallParams,
    body: Value,
}

impl CompiledEndpoint for CompiledPutMapping {
    type Output = PutMappingResult;

    fn api_method(&self) -> ApiMethod {
        ApiMethod::PutMapping
    }

    fn params(&self) -> &CallParams {
        &self.params
    }

    fn body(&self) -> Option<&Value> {
        Some(&self.body)
    }

    fn process_result(&self, raw: Value) -> Result<PutMappingResult> {
        Ok(PutMappingResult::new(&raw))
    }
}

impl Compiler {
    pub fn put_mapping(&self, schema: &Arc<Schema>, params: CallParams) -> Result<CompiledPutMapping> {
        let body = self.mapping(schema);
        let mut prepared = CallParams::new();
        if self.is_emulated(schema) {
            prepared.insert("doc_type".to_string(), Value::from(self.default_doc_type()));
        } else if let Some(doc_type) = schema.doc_type() {
            prepared.insert("doc_type".to_string(), Value::from(doc_type));
        }
        prepared.extend(params);
        debug!(api = "put_mapping", doc_type = ?schema.doc_type(), "Compiled put mapping");
        Ok(CompiledPutMapping {
            params: prepared,
            body,
        })
    }

    /// Mapping for several document types at once. Without mapping types
    /// their properties are merged into one mapping and the parent/child
    /// relations are declared on the join field.
    pub fn put_mappings(&self, schemas: &[Arc<Schema>], params: CallParams) -> Result<CompiledPutMapping> {
        let mut mappings = Map::new();
        let mut relations: IndexMap<String, Vec<Value>> = IndexMap::new();

        for schema in schemas {
            let child = schema.doc_type();
            let parent = schema.join_parent().and_then(|p| p.doc_type());
            if let (Some(child), Some(parent)) = (child, parent) {
                relations
                    .entry(parent.to_string())
                    .or_default()
                    .push(Value::from(child));
            }

            let mapping = self.mapping(schema);
            if self.features().supports_mapping_types {
                if let Value::Object(mapping) = mapping {
                    mappings.extend(mapping);
                }
            } else {
                merge_mapping(&mut mappings, mapping)?;
            }
        }

        let mut prepared = CallParams::new();
        if !self.features().supports_mapping_types {
            if !relations.is_empty() {
                let relations: Map<String, Value> = relations
                    .into_iter()
                    .map(|(parent, children)| (parent, Value::Array(children)))
                    .collect();
                let properties = mappings
                    .entry("properties")
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(properties) = properties {
                    let join = properties
                        .entry(doc_types::DOC_TYPE_FIELD)
                        .or_insert_with(join_property);
                    if let Value::Object(join) = join {
                        join.insert("relations".to_string(), Value::Object(relations));
                    }
                }
            }
            if schemas.iter().any(|s| self.is_emulated(s)) {
                prepared.insert("doc_type".to_string(), Value::from(self.default_doc_type()));
            }
        }
        prepared.extend(params);
        debug!(api = "put_mapping", schemas = schemas.len(), "Compiled put mappings");
        Ok(CompiledPutMapping {
            params: prepared,
            body: Value::Object(mappings),
        })
    }

    /// Mapping document of one schema, keyed by its type when the target
    /// version has mapping types
    pub fn mapping(&self, schema: &Schema) -> Value {
        let mut mapping = schema.mapping_options().clone();
        for field in schema.mapping_fields() {
            if !field.options.is_empty() {
                mapping.insert(field.name.clone(), Value::Object(field.options.clone()));
            }
        }

        let mut properties = properties(schema);
        if self.is_emulated(schema) {
            properties.insert(doc_types::DOC_TYPE_FIELD.to_string(), join_property());
        }
        mapping.insert("properties".to_string(), Value::Object(properties));

        let templates: Vec<Value> = schema
            .dynamic_templates()
            .iter()
            .map(|template| {
                let mut spec = Map::new();
                spec.insert("path_match".to_string(), Value::from(template.pattern()));
                spec.insert(
                    "mapping".to_string(),
                    Value::Object(field_mapping(template.template())),
                );
                let mut entry = Map::new();
                entry.insert(template.pattern().to_string(), Value::Object(spec));
                Value::Object(entry)
            })
            .collect();
        if !templates.is_empty() {
            mapping.insert("dynamic_templates".to_string(), Value::Array(templates));
        }

        match schema.doc_type() {
            Some(doc_type) if self.features().supports_mapping_types => {
                let mut keyed = Map::new();
                keyed.insert(doc_type.to_string(), Value::Object(mapping));
                Value::Object(keyed)
            }
            _ => Value::Object(mapping),
        }
    }
}

fn join_property() -> Value {
    let mut join = Map::new();
    join.insert("type".to_string(), Value::from("join"));
    Value::Object(join)
}

fn properties(schema: &Schema) -> Map<String, Value> {
    schema
        .user_fields()
        .map(|field| (field.name.clone(), Value::Object(field_mapping(field))))
        .collect()
}

fn field_mapping(field: &Field) -> Map<String, Value> {
    let mut mapping = Map::new();
    if let Some(type_name) = field.field_type.wire_name() {
        mapping.insert("type".to_string(), Value::from(type_name));
    }
    if let Some(sub_schema) = field.field_type.sub_schema() {
        mapping.extend(sub_schema.mapping_options().clone());
        mapping.insert(
            "properties".to_string(),
            Value::Object(properties(sub_schema)),
        );
    }
    if !field.fields.is_empty() {
        let fields = field
            .fields
            .iter()
            .map(|(name, sub)| (name.clone(), Value::Object(field_mapping(sub))))
            .collect();
        mapping.insert("fields".to_string(), Value::Object(fields));
    }
    for (key, value) in &field.options {
        if !LOCAL_OPTIONS.contains(&key.as_str()) {
            mapping.insert(key.clone(), value.clone());
        }
    }
    mapping
}

/// Merge one type's mapping into the shared one. A property or dynamic
/// template declared twice must be identical; for other keys the first
/// schema wins.
fn merge_mapping(merged: &mut Map<String, Value>, mapping: Value) -> Result<()> {
    let Value::Object(mapping) = mapping else {
        return Ok(());
    };
    for (key, value) in mapping {
        if key == "dynamic_templates" {
            merge_templates(merged, value)?;
            continue;
        }
        if key != "properties" {
            match merged.get(&key) {
                Some(existing) if *existing != value => {
                    warn!(
                        key = key.as_str(),
                        "Mapping option differs between schemas, keeping the first"
                    );
                }
                Some(_) => {}
                None => {
                    merged.insert(key, value);
                }
            }
            continue;
        }
        let Value::Object(properties) = value else {
            continue;
        };
        let target = merged
            .entry("properties")
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(target) = target else {
            continue;
        };
        for (name, property) in properties {
            match target.get(&name) {
                Some(existing) if *existing != property => {
                    return Err(DslError::Compilation(format!(
                        "Conflicting mapping properties: {}",
                        name
                    )));
                }
                _ => {
                    target.insert(name, property);
                }
            }
        }
    }
    Ok(())
}

/// Append dynamic templates by name, in first-seen order
fn merge_templates(merged: &mut Map<String, Value>, templates: Value) -> Result<()> {
    let Value::Array(templates) = templates else {
        return Ok(());
    };
    let target = merged
        .entry("dynamic_templates")
        .or_insert_with(|| Value::Array(Vec::new()));
    let Value::Array(target) = target else {
        return Ok(());
    };
    for template in templates {
        let name = template
            .as_object()
            .and_then(|t| t.keys().next())
            .cloned()
            .unwrap_or_default();
        let existing = target
            .iter()
            .find(|t| t.as_object().is_some_and(|t| t.contains_key(&name)));
        match existing {
            Some(existing) if *existing != template => {
                return Err(DslError::Compilation(format!(
                    "Conflicting dynamic templates: {}",
                    name
                )));
            }
            Some(_) => {}
            None => target.push(template),
        }
    }
    Ok(())
}

/// Build a schema back from a mapping document, either keyed by
/// `doc_type` or bare. The join field of type emulation is skipped.
pub fn parse_mapping(doc_type: Option<&str>, mapping: &Value) -> Result<Arc<Schema>> {
    let body = doc_type
        .and_then(|t| mapping.get(t))
        .filter(|m| m.get("properties").is_some())
        .unwrap_or(mapping);
    let Value::Object(body) = body else {
        return Err(DslError::InvalidResponse(
            "mapping must be an object".to_string(),
        ));
    };

    let mut builder = match doc_type {
        Some(doc_type) => Schema::builder(doc_type),
        None => Schema::untyped(),
    };
    for (key, value) in body {
        match key.as_str() {
            "properties" => {
                for field in parse_properties(value)? {
                    builder = builder.field(field);
                }
            }
            "dynamic_templates" => {
                for template in parse_templates(value)? {
                    builder = builder.dynamic_template(template);
                }
            }
            name if is_mapping_field(name) => {
                let field_type = MAPPING_FIELDS
                    .iter()
                    .find(|(n, _)| *n == name)
                    .map(|(_, tag)| tag.field_type())
                    .unwrap_or(FieldType::String);
                let mut field = Field::new(name, field_type);
                if let Value::Object(options) = value {
                    field.options = options.clone();
                }
                builder = builder.field(field);
            }
            _ => builder = builder.mapping_option(key.clone(), value.clone()),
        }
    }
    Ok(builder.build())
}

fn parse_properties(properties: &Value) -> Result<Vec<Field>> {
    let Value::Object(properties) = properties else {
        return Err(DslError::InvalidResponse(
            "'properties' must be an object".to_string(),
        ));
    };
    properties
        .iter()
        .filter(|(name, _)| name.as_str() != doc_types::DOC_TYPE_FIELD)
        .map(|(name, spec)| parse_field(name, spec))
        .collect()
}

fn parse_field(name: &str, spec: &Value) -> Result<Field> {
    let Value::Object(spec) = spec else {
        return Err(DslError::InvalidResponse(format!(
            "mapping of '{}' must be an object",
            name
        )));
    };
    let type_name = spec.get("type").and_then(Value::as_str);

    let field_type = match (type_name, spec.get("properties")) {
        (Some("nested"), props) => FieldType::Nested(parse_sub_schema(spec, props)?),
        (Some("object"), props) | (None, props @ Some(_)) => {
            FieldType::Object(parse_sub_schema(spec, props)?)
        }
        (Some(type_name), _) => FieldType::from_wire_name(type_name).unwrap_or(FieldType::Any),
        (None, None) => FieldType::Any,
    };
    let sub_schema = matches!(field_type, FieldType::Object(_) | FieldType::Nested(_));

    let mut field = Field::new(name, field_type);
    for (key, value) in spec {
        match key.as_str() {
            "type" | "properties" => {}
            "fields" => {
                if let Value::Object(sub_fields) = value {
                    for (sub_name, sub_spec) in sub_fields {
                        field = field.sub_field(parse_field(sub_name, sub_spec)?);
                    }
                }
            }
            // Object options belong to the sub-schema
            _ if sub_schema => {}
            _ => {
                field.options.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(field)
}

fn parse_sub_schema(spec: &Map<String, Value>, properties: Option<&Value>) -> Result<Arc<Schema>> {
    let mut builder = Schema::untyped();
    if let Some(properties) = properties {
        for field in parse_properties(properties)? {
            builder = builder.field(field);
        }
    }
    for (key, value) in spec {
        if !matches!(key.as_str(), "type" | "properties" | "fields") {
            builder = builder.mapping_option(key.clone(), value.clone());
        }
    }
    Ok(builder.build())
}

fn parse_templates(templates: &Value) -> Result<Vec<DynamicTemplate>> {
    let Value::Array(templates) = templates else {
        return Err(DslError::InvalidResponse(
            "'dynamic_templates' must be a list".to_string(),
        ));
    };
    let mut parsed = Vec::new();
    for entry in templates {
        let Some((name, spec)) = entry.as_object().and_then(|e| e.iter().next()) else {
            continue;
        };
        let pattern = spec
            .get("path_match")
            .or_else(|| spec.get("match"))
            .and_then(Value::as_str)
            .unwrap_or(name);
        let field = match spec.get("mapping") {
            Some(mapping) => parse_field(pattern, mapping)?,
            None => Field::new(pattern, FieldType::Any),
        };
        let mut template = DynamicTemplate::new(pattern, field.field_type.clone())?;
        for (key, value) in field.options {
            template = template.option(key, value);
        }
        parsed.push(template);
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Features;
    use serde_json::json;

    fn product() -> Arc<Schema> {
        let dimensions = Schema::untyped()
            .field(Field::new("width", FieldType::Float))
            .field(Field::new("height", FieldType::Float))
            .build();
        Schema::builder("product")
            .field(
                Field::new("name", FieldType::Text)
                    .option("analyzer", "english")
                    .sub_field(Field::new("raw", FieldType::Keyword))
                    .required(),
            )
            .field(Field::new("price", FieldType::Double))
            .field(Field::new("dimensions", FieldType::Object(dimensions)))
            .field(Field::new("_routing", FieldType::String).required())
            .dynamic_template(DynamicTemplate::new("attr_*", FieldType::Keyword).unwrap())
            .mapping_option("dynamic", "strict")
            .build()
    }

    #[test]
    fn test_mapping_document() {
        let compiled = Compiler::new(Features::es_5())
            .put_mapping(&product(), CallParams::new())
            .unwrap();
        assert_eq!(compiled.params()["doc_type"], json!("product"));
        assert_eq!(
            compiled.body(),
            Some(&json!({"product": {
                "dynamic": "strict",
                "_routing": {"required": true},
                "properties": {
                    "name": {"type": "text", "fields": {"raw": {"type": "keyword"}}, "analyzer": "english"},
                    "price": {"type": "double"},
                    "dimensions": {"type": "object", "properties": {
                        "width": {"type": "float"},
                        "height": {"type": "float"}
                    }}
                },
                "dynamic_templates": [
                    {"attr_*": {"path_match": "attr_*", "mapping": {"type": "keyword"}}}
                ]
            }}))
        );
    }

    #[test]
    fn test_round_trip_keeps_names_types_and_order() {
        let compiler = Compiler::new(Features::es_5());
        let schema = product();
        let parsed = parse_mapping(Some("product"), &compiler.mapping(&schema)).unwrap();

        let names = |s: &Schema| s.user_fields().map(|f| f.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&parsed), names(&schema));
        for (original, restored) in schema.user_fields().zip(parsed.user_fields()) {
            assert_eq!(original.field_type, restored.field_type);
            assert_eq!(
                original.fields.keys().collect::<Vec<_>>(),
                restored.fields.keys().collect::<Vec<_>>()
            );
        }
        assert_eq!(parsed.dynamic_templates()[0].pattern(), "attr_*");
        assert_eq!(parsed.mapping_options().get("dynamic"), Some(&json!("strict")));
    }

    #[test]
    fn test_emulated_mappings_merge_with_relations() {
        let question = Schema::builder("question")
            .field(Field::new("title", FieldType::Text))
            .join_parent(None)
            .build();
        let answer = Schema::builder("answer")
            .field(Field::new("title", FieldType::Text))
            .field(Field::new("body", FieldType::Text))
            .join_parent(Some(&question))
            .build();
        let compiled = Compiler::new(Features::es_6())
            .put_mappings(&[question, answer], CallParams::new())
            .unwrap();
        assert_eq!(compiled.params()["doc_type"], json!("_doc"));
        assert_eq!(
            compiled.body(),
            Some(&json!({"properties": {
                "title": {"type": "text"},
                "_doc_type": {"type": "join", "relations": {"question": ["answer"]}},
                "body": {"type": "text"}
            }}))
        );
    }

    #[test]
    fn test_emulated_merge_keeps_every_dynamic_template() {
        let question = Schema::builder("question")
            .dynamic_template(DynamicTemplate::new("tag_*", FieldType::Keyword).unwrap())
            .join_parent(None)
            .build();
        let answer = Schema::builder("answer")
            .dynamic_template(DynamicTemplate::new("tag_*", FieldType::Keyword).unwrap())
            .dynamic_template(DynamicTemplate::new("score_*", FieldType::Float).unwrap())
            .join_parent(Some(&question))
            .build();
        let compiled = Compiler::new(Features::es_6())
            .put_mappings(&[question, answer], CallParams::new())
            .unwrap();
        assert_eq!(
            compiled.body().unwrap()["dynamic_templates"],
            json!([
                {"tag_*": {"path_match": "tag_*", "mapping": {"type": "keyword"}}},
                {"score_*": {"path_match": "score_*", "mapping": {"type": "float"}}}
            ])
        );
    }

    #[test]
    fn test_conflicting_dynamic_templates() {
        let a = Schema::builder("a")
            .dynamic_template(DynamicTemplate::new("tag_*", FieldType::Keyword).unwrap())
            .join_parent(None)
            .build();
        let b = Schema::builder("b")
            .dynamic_template(DynamicTemplate::new("tag_*", FieldType::Text).unwrap())
            .join_parent(Some(&a))
            .build();
        let err = Compiler::new(Features::es_6())
            .put_mappings(&[a, b], CallParams::new())
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "Compilation error: Conflicting dynamic templates: tag_*");
    }

    #[test]
    fn test_conflicting_properties() {
        let a = Schema::builder("a")
            .field(Field::new("name", FieldType::Text))
            .join_parent(None)
            .build();
        let b = Schema::builder("b")
            .field(Field::new("name", FieldType::Keyword))
            .join_parent(Some(&a))
            .build();
        let err = Compiler::new(Features::es_6())
            .put_mappings(&[a, b], CallParams::new())
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "Compilation error: Conflicting mapping properties: name");
    }

    #[test]
    fn test_multiple_typed_mappings() {
        let a = Schema::builder("a").field(Field::new("x", FieldType::Long)).build();
        let b = Schema::builder("b").field(Field::new("x", FieldType::Text)).build();
        let compiled = Compiler::new(Features::es_2())
            .put_mappings(&[a, b], CallParams::new())
            .unwrap();
        assert!(compiled.params().is_empty());
        assert_eq!(
            compiled.body(),
            Some(&json!({
                "a": {"properties": {"x": {"type": "long"}}},
                "b": {"properties": {"x": {"type": "text"}}}
            }))
        );
    }
}
