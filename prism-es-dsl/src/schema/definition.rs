//! Document schema definitions
//!
//! A [`Schema`] is built once with a [`SchemaBuilder`] and is read-only
//! afterwards, except for the memoized dynamic field table which is filled
//! lazily with an insert-if-absent discipline.

use super::field::{BoundField, DynamicTemplate, Field};
use crate::error::DslError;
use crate::types::FieldType;
use crate::Result;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::trace;

/// Protocol meta fields every schema carries, with their types
pub const MAPPING_FIELDS: [(&str, FieldTypeTag); 14] = [
    ("_uid", FieldTypeTag::String),
    ("_id", FieldTypeTag::String),
    ("_type", FieldTypeTag::String),
    ("_version", FieldTypeTag::Integer),
    ("_source", FieldTypeTag::String),
    ("_all", FieldTypeTag::String),
    ("_analyzer", FieldTypeTag::String),
    ("_parent", FieldTypeTag::String),
    ("_routing", FieldTypeTag::String),
    ("_index", FieldTypeTag::String),
    ("_size", FieldTypeTag::Integer),
    ("_timestamp", FieldTypeTag::Date),
    ("_ttl", FieldTypeTag::String),
    ("_score", FieldTypeTag::Float),
];

/// Scalar type of a meta field; kept separate so the table can be const
#[derive(Debug, Clone, Copy)]
pub enum FieldTypeTag {
    String,
    Integer,
    Float,
    Date,
}

impl FieldTypeTag {
    pub fn field_type(self) -> FieldType {
        match self {
            FieldTypeTag::String => FieldType::String,
            FieldTypeTag::Integer => FieldType::Integer,
            FieldTypeTag::Float => FieldType::Float,
            FieldTypeTag::Date => FieldType::Date,
        }
    }
}

pub fn is_mapping_field(name: &str) -> bool {
    MAPPING_FIELDS.iter().any(|(n, _)| *n == name)
}

/// Parent/child participation of a document type
#[derive(Debug, Clone)]
pub struct JoinSpec {
    pub parent: Option<Arc<Schema>>,
}

#[derive(Debug)]
pub struct Schema {
    doc_type: Option<String>,
    mapping_fields: IndexMap<String, Arc<Field>>,
    user_fields: IndexMap<String, Arc<Field>>,
    dynamic_templates: Vec<DynamicTemplate>,
    /// Any undeclared name resolves to an untyped field
    catch_all: bool,
    mapping_options: Map<String, Value>,
    search_params: Map<String, Value>,
    join: Option<JoinSpec>,
    /// Memoized dynamic fields; the only mutable state of a schema
    dynamic_cache: RwLock<IndexMap<String, Arc<Field>>>,
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.doc_type == other.doc_type
            && self.user_fields == other.user_fields
            && self.mapping_fields == other.mapping_fields
    }
}

impl Schema {
    pub fn builder(doc_type: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(Some(doc_type.into()))
    }

    /// Builder for a schema without a document type (e.g. object fields)
    pub fn untyped() -> SchemaBuilder {
        SchemaBuilder::new(None)
    }

    /// Declarative constructor: ordered fields, dynamic templates and an
    /// optional schema to inherit fields from.
    pub fn define(
        doc_type: Option<&str>,
        fields: Vec<Field>,
        dynamic_templates: Vec<DynamicTemplate>,
        extends: Option<&Arc<Schema>>,
    ) -> Arc<Schema> {
        let mut builder = SchemaBuilder::new(doc_type.map(String::from));
        if let Some(parent) = extends {
            builder = builder.extends(parent);
        }
        for field in fields {
            builder = builder.field(field);
        }
        for template in dynamic_templates {
            builder = builder.dynamic_template(template);
        }
        builder.build()
    }

    /// Generic schema used when no declared schema matches a hit
    pub fn dynamic() -> Arc<Schema> {
        let mut builder = SchemaBuilder::new(None);
        builder.catch_all = true;
        builder.build()
    }

    pub fn doc_type(&self) -> Option<&str> {
        self.doc_type.as_deref()
    }

    pub fn is_dynamic(&self) -> bool {
        self.catch_all
    }

    pub fn user_fields(&self) -> impl Iterator<Item = &Arc<Field>> {
        self.user_fields.values()
    }

    pub fn mapping_fields(&self) -> impl Iterator<Item = &Arc<Field>> {
        self.mapping_fields.values()
    }

    /// Mapping fields first, then user fields, each in declaration order
    pub fn fields(&self) -> impl Iterator<Item = &Arc<Field>> {
        self.mapping_fields.values().chain(self.user_fields.values())
    }

    pub fn dynamic_templates(&self) -> &[DynamicTemplate] {
        &self.dynamic_templates
    }

    pub fn mapping_options(&self) -> &Map<String, Value> {
        &self.mapping_options
    }

    /// Default search parameters merged into every search on this type
    pub fn search_params(&self) -> &Map<String, Value> {
        &self.search_params
    }

    pub fn participates_in_join(&self) -> bool {
        self.join.is_some()
    }

    pub fn join_parent(&self) -> Option<&Arc<Schema>> {
        self.join.as_ref().and_then(|j| j.parent.as_ref())
    }

    /// Resolve a field by name: declared fields, memoized dynamic fields,
    /// then the first matching dynamic template.
    pub fn resolve(&self, name: &str) -> Result<Arc<Field>> {
        if let Some(field) = self
            .user_fields
            .get(name)
            .or_else(|| self.mapping_fields.get(name))
        {
            return Ok(Arc::clone(field));
        }

        if let Some(field) = self.dynamic_cache.read().get(name) {
            return Ok(Arc::clone(field));
        }

        let synthesized = match self.dynamic_templates.iter().find(|t| t.matches(name)) {
            Some(template) => template.instantiate(name),
            None if self.catch_all => Field {
                dynamic: true,
                ..Field::new(name, FieldType::Any)
            },
            None => {
                return Err(DslError::UnknownField {
                    doc_type: self.doc_type.clone(),
                    name: name.to_string(),
                })
            }
        };

        // Racing writers synthesize equal fields; the first insert wins.
        let mut cache = self.dynamic_cache.write();
        if let Some(field) = cache.get(name) {
            return Ok(Arc::clone(field));
        }
        let field = Arc::new(synthesized);
        cache.insert(name.to_string(), Arc::clone(&field));
        trace!(
            doc_type = self.doc_type.as_deref().unwrap_or("-"),
            field = name,
            "Synthesized dynamic field"
        );
        Ok(field)
    }

    /// Bound field lookup, failing with `UnknownField`
    pub fn field(self: &Arc<Self>, name: &str) -> Result<BoundField> {
        self.resolve(name)
            .map(|field| BoundField::new(Arc::clone(self), field))
    }

    /// Bound field lookup returning `None` for unknown names
    pub fn get(self: &Arc<Self>, name: &str) -> Option<BoundField> {
        self.field(name).ok()
    }

    /// Ad hoc untyped field that is not memoized, e.g. for `title.*` in a
    /// multi_match field list
    pub fn wildcard(self: &Arc<Self>, name: &str) -> BoundField {
        let field = Field {
            dynamic: true,
            ..Field::new(name, FieldType::Any)
        };
        BoundField::new(Arc::clone(self), Arc::new(field))
    }

    /// Dynamic fields synthesized so far, in first-access order
    pub fn dynamic_fields(&self) -> Vec<Arc<Field>> {
        self.dynamic_cache.read().values().cloned().collect()
    }
}

/// Builder producing an immutable [`Schema`]
pub struct SchemaBuilder {
    doc_type: Option<String>,
    mapping_fields: IndexMap<String, Arc<Field>>,
    user_fields: IndexMap<String, Arc<Field>>,
    dynamic_templates: Vec<DynamicTemplate>,
    catch_all: bool,
    mapping_options: Map<String, Value>,
    search_params: Map<String, Value>,
    join: Option<JoinSpec>,
}

impl SchemaBuilder {
    fn new(doc_type: Option<String>) -> Self {
        let mapping_fields = MAPPING_FIELDS
            .iter()
            .map(|(name, tag)| {
                (
                    name.to_string(),
                    Arc::new(Field::new(*name, tag.field_type())),
                )
            })
            .collect();

        Self {
            doc_type,
            mapping_fields,
            user_fields: IndexMap::new(),
            dynamic_templates: Vec::new(),
            catch_all: false,
            mapping_options: Map::new(),
            search_params: Map::new(),
            join: None,
        }
    }

    /// Inherit fields, templates and options of another schema. Fields
    /// declared afterwards override inherited ones by name and keep the
    /// inherited position.
    pub fn extends(mut self, parent: &Arc<Schema>) -> Self {
        for (name, field) in &parent.mapping_fields {
            self.mapping_fields.insert(name.clone(), Arc::clone(field));
        }
        for (name, field) in &parent.user_fields {
            self.user_fields.insert(name.clone(), Arc::clone(field));
        }
        self.dynamic_templates
            .extend(parent.dynamic_templates.iter().cloned());
        self.catch_all |= parent.catch_all;
        for (key, value) in &parent.mapping_options {
            self.mapping_options.insert(key.clone(), value.clone());
        }
        for (key, value) in &parent.search_params {
            self.search_params.insert(key.clone(), value.clone());
        }
        self
    }

    /// Declare a field. Meta field names (`_routing`, `_parent` ...)
    /// update the corresponding mapping field.
    pub fn field(mut self, field: Field) -> Self {
        let name = field.name.clone();
        if is_mapping_field(&name) {
            self.mapping_fields.insert(name, Arc::new(field));
        } else {
            self.user_fields.insert(name, Arc::new(field));
        }
        self
    }

    /// Declare a field and move it after every other field
    pub fn field_last(mut self, field: Field) -> Self {
        self.user_fields.shift_remove(&field.name);
        self.field(field)
    }

    pub fn dynamic_template(mut self, template: DynamicTemplate) -> Self {
        self.dynamic_templates
            .retain(|t| t.pattern() != template.pattern());
        self.dynamic_templates.push(template);
        self
    }

    pub fn mapping_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.mapping_options.insert(key.into(), value.into());
        self
    }

    pub fn search_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.search_params.insert(key.into(), value.into());
        self
    }

    /// Take part in parent/child joins; `None` marks a root type
    pub fn join_parent(mut self, parent: Option<&Arc<Schema>>) -> Self {
        self.join = Some(JoinSpec {
            parent: parent.cloned(),
        });
        self
    }

    pub fn build(self) -> Arc<Schema> {
        Arc::new(Schema {
            doc_type: self.doc_type,
            mapping_fields: self.mapping_fields,
            user_fields: self.user_fields,
            dynamic_templates: self.dynamic_templates,
            catch_all: self.catch_all,
            mapping_options: self.mapping_options,
            search_params: self.search_params,
            join: self.join,
            dynamic_cache: RwLock::new(IndexMap::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    fn product() -> Arc<Schema> {
        Schema::builder("product")
            .field(Field::new("name", FieldType::Text))
            .field(Field::new("price", FieldType::Float))
            .field(Field::new("_routing", FieldType::String).option("required", true))
            .dynamic_template(DynamicTemplate::new("attr_*", FieldType::Keyword).unwrap())
            .build()
    }

    #[test]
    fn test_declaration_order() {
        let schema = product();
        let names: Vec<&str> = schema.user_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["name", "price"]);
        assert_eq!(schema.mapping_fields().count(), 14);
    }

    #[test]
    fn test_mapping_field_redeclared() {
        let schema = product();
        let routing = schema.resolve("_routing").unwrap();
        assert_eq!(routing.options.get("required"), Some(&json!(true)));
        assert!(schema.user_fields().all(|f| f.name != "_routing"));
    }

    #[test]
    fn test_inheritance_override_keeps_position() {
        let base = product();
        let book = Schema::builder("book")
            .extends(&base)
            .field(Field::new("isbn", FieldType::Keyword))
            .field(Field::new("name", FieldType::Keyword))
            .build();

        let fields: Vec<(&str, &FieldType)> = book
            .user_fields()
            .map(|f| (f.name.as_str(), &f.field_type))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("name", &FieldType::Keyword),
                ("price", &FieldType::Float),
                ("isbn", &FieldType::Keyword),
            ]
        );
        // templates are inherited
        assert!(book.resolve("attr_color").is_ok());
    }

    #[test]
    fn test_field_last_repositions() {
        let schema = Schema::builder("doc")
            .field(Field::new("a", FieldType::Integer))
            .field(Field::new("b", FieldType::Integer))
            .field_last(Field::new("a", FieldType::Long))
            .build();
        let names: Vec<&str> = schema.user_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_dynamic_field_memoized() {
        let schema = product();
        let first = schema.field("attr_color").unwrap();
        let second = schema.field("attr_color").unwrap();

        assert_eq!(first, second);
        assert!(first.field().dynamic);
        assert_eq!(first.field_type(), &FieldType::Keyword);
        assert_eq!(schema.dynamic_fields().len(), 1);
    }

    #[test]
    fn test_unknown_field() {
        let schema = product();
        let err = schema.field("color").unwrap_err();
        assert!(matches!(
            err,
            DslError::UnknownField { ref name, .. } if name == "color"
        ));
        assert!(schema.get("color").is_none());
    }

    #[test]
    fn test_dynamic_schema_resolves_anything() {
        let schema = Schema::dynamic();
        let field = schema.field("whatever").unwrap();
        assert_eq!(field.field_type(), &FieldType::Any);
        assert!(schema.doc_type().is_none());
    }

    #[test]
    fn test_concurrent_dynamic_resolution() {
        let schema = product();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let schema = Arc::clone(&schema);
                thread::spawn(move || schema.field("attr_size").unwrap())
            })
            .collect();

        let fields: Vec<BoundField> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(fields.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(schema.dynamic_fields().len(), 1);
        assert_eq!(schema.user_fields().count(), 2);
    }

    #[test]
    fn test_dynamic_field_inserted_once() {
        let schema = product();
        let first = schema.resolve("attr_size").unwrap();
        let again = schema.resolve("attr_size").unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert!(Arc::ptr_eq(&first, &schema.dynamic_fields()[0]));
        assert_eq!(schema.dynamic_fields().len(), 1);
    }

    #[test]
    fn test_join_spec() {
        let question = Schema::builder("question").join_parent(None).build();
        let answer = Schema::builder("answer")
            .join_parent(Some(&question))
            .build();

        assert!(question.participates_in_join());
        assert!(question.join_parent().is_none());
        assert_eq!(answer.join_parent().and_then(|p| p.doc_type()), Some("question"));
    }
}
