//! Get, multi-get and delete endpoints
//!
//! The schema used to hydrate a fetched document is resolved in order:
//! schema given to the compiler, schema embedded in the target, type-keyed
//! lookup, dynamic schema.

use super::{ApiMethod, CallParams, CompiledEndpoint};
use crate::compiler::{doc_types, Compiler};
use crate::document::{value_to_string, Document};
use crate::error::DslError;
use crate::result::{hit_type, hydrate, DeleteResult};
use crate::schema::{Schema, SchemaRegistry};
use crate::Result;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// What a get, multi-get or delete call points at
#[derive(Debug, Clone)]
pub enum DocTarget {
    Id(String),
    Doc(Document),
    /// Raw identity (`id`/`_id`, `index`, `routing` ...) with an optional
    /// schema hint
    Params {
        params: CallParams,
        schema: Option<Arc<Schema>>,
    },
}

impl DocTarget {
    fn schema(&self) -> Option<&Arc<Schema>> {
        match self {
            DocTarget::Id(_) => None,
            DocTarget::Doc(doc) => Some(doc.schema()),
            DocTarget::Params { schema, .. } => schema.as_ref(),
        }
    }
}

impl From<&str> for DocTarget {
    fn from(id: &str) -> Self {
        DocTarget::Id(id.to_string())
    }
}

impl From<String> for DocTarget {
    fn from(id: String) -> Self {
        DocTarget::Id(id)
    }
}

impl From<u64> for DocTarget {
    fn from(id: u64) -> Self {
        DocTarget::Id(id.to_string())
    }
}

impl From<Document> for DocTarget {
    fn from(doc: Document) -> Self {
        DocTarget::Doc(doc)
    }
}

impl From<CallParams> for DocTarget {
    fn from(params: CallParams) -> Self {
        DocTarget::Params {
            params,
            schema: None,
        }
    }
}

pub struct CompiledGet {
    params: CallParams,
    schema: Arc<Schema>,
}

impl CompiledGet {
    /// Schema the response is hydrated with
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}

impl CompiledEndpoint for CompiledGet {
    /// `None` when the document was not found
    type Output = Option<Document>;

    fn api_method(&self) -> ApiMethod {
        ApiMethod::Get
    }

    fn params(&self) -> &CallParams {
        &self.params
    }

    fn body(&self) -> Option<&Value> {
        None
    }

    fn process_result(&self, raw: Value) -> Result<Option<Document>> {
        if raw.get("found").and_then(Value::as_bool) == Some(false) {
            return Ok(None);
        }
        Ok(Some(hydrate(&self.schema, &raw)))
    }
}

pub struct CompiledDelete {
    params: CallParams,
}

impl CompiledEndpoint for CompiledDelete {
    type Output = DeleteResult;

    fn api_method(&self) -> ApiMethod {
        ApiMethod::Delete
    }

    fn params(&self) -> &CallParams {
        &self.params
    }

    fn body(&self) -> Option<&Value> {
        None
    }

    fn process_result(&self, raw: Value) -> Result<DeleteResult> {
        Ok(DeleteResult::new(&raw))
    }
}

pub struct CompiledMultiGet {
    params: CallParams,
    body: Value,
    schema: Option<Arc<Schema>>,
    item_schemas: Vec<Option<Arc<Schema>>>,
    type_map: IndexMap<String, Arc<Schema>>,
    dynamic: Arc<Schema>,
}

impl CompiledMultiGet {
    /// Schemas looked up by the type reported for each fetched document
    pub fn with_type_map(mut self, schemas: &[Arc<Schema>]) -> Self {
        for schema in schemas {
            if let Some(doc_type) = schema.doc_type() {
                self.type_map.insert(doc_type.to_string(), Arc::clone(schema));
            }
        }
        self
    }

    pub fn with_registry(self, registry: &SchemaRegistry) -> Self {
        self.with_type_map(&registry.schemas())
    }

    fn item_schema(&self, position: usize, raw_doc: &Value) -> Arc<Schema> {
        self.schema
            .as_ref()
            .or_else(|| self.item_schemas.get(position).and_then(Option::as_ref))
            .or_else(|| hit_type(raw_doc).and_then(|t| self.type_map.get(&t)))
            .unwrap_or(&self.dynamic)
            .clone()
    }
}

impl CompiledEndpoint for CompiledMultiGet {
    /// One entry per requested document, `None` when not found
    type Output = Vec<Option<Document>>;

    fn api_method(&self) -> ApiMethod {
        ApiMethod::MultiGet
    }

    fn params(&self) -> &CallParams {
        &self.params
    }

    fn body(&self) -> Option<&Value> {
        Some(&self.body)
    }

    fn process_result(&self, raw: Value) -> Result<Vec<Option<Document>>> {
        let Some(Value::Array(raw_docs)) = raw.get("docs") else {
            return Err(DslError::InvalidResponse(
                "multi get response has no 'docs'".to_string(),
            ));
        };
        let docs = raw_docs
            .iter()
            .enumerate()
            .map(|(position, raw_doc)| {
                if raw_doc.get("found").and_then(Value::as_bool) != Some(true) {
                    return None;
                }
                Some(hydrate(&self.item_schema(position, raw_doc), raw_doc))
            })
            .collect();
        Ok(docs)
    }
}

impl Compiler {
    pub fn get(
        &self,
        target: impl Into<DocTarget>,
        params: CallParams,
        schema: Option<&Arc<Schema>>,
    ) -> CompiledGet {
        let target = target.into();
        let schema = schema
            .or_else(|| target.schema())
            .cloned()
            .unwrap_or_else(Schema::dynamic);
        let params = self.document_params(&target, &schema, params);
        debug!(api = "get", doc_type = ?schema.doc_type(), "Compiled get");
        CompiledGet { params, schema }
    }

    pub fn delete(
        &self,
        target: impl Into<DocTarget>,
        params: CallParams,
        schema: Option<&Arc<Schema>>,
    ) -> CompiledDelete {
        let target = target.into();
        let schema = schema
            .or_else(|| target.schema())
            .cloned()
            .unwrap_or_else(Schema::dynamic);
        let params = self.document_params(&target, &schema, params);
        debug!(api = "delete", doc_type = ?schema.doc_type(), "Compiled delete");
        CompiledDelete { params }
    }

    pub fn multi_get(
        &self,
        targets: Vec<DocTarget>,
        params: CallParams,
        schema: Option<&Arc<Schema>>,
    ) -> CompiledMultiGet {
        let mut docs = Vec::with_capacity(targets.len());
        let mut item_schemas = Vec::with_capacity(targets.len());
        for target in &targets {
            let item_schema = schema.or_else(|| target.schema());
            docs.push(Value::Object(self.multi_get_item(target, item_schema)));
            item_schemas.push(target.schema().cloned());
        }
        debug!(api = "mget", docs = docs.len(), "Compiled multi get");

        let mut body = Map::new();
        body.insert("docs".to_string(), Value::Array(docs));
        CompiledMultiGet {
            params,
            body: Value::Object(body),
            schema: schema.cloned(),
            item_schemas,
            type_map: IndexMap::new(),
            dynamic: Schema::dynamic(),
        }
    }

    /// Call parameters identifying one document. Caller parameters win.
    fn document_params(&self, target: &DocTarget, schema: &Schema, params: CallParams) -> CallParams {
        let mut prepared = CallParams::new();
        match target {
            DocTarget::Id(id) => {
                prepared.insert("id".to_string(), Value::from(id.as_str()));
            }
            DocTarget::Doc(doc) => {
                let fields = [
                    ("id", doc.id.clone()),
                    ("index", doc.index.clone()),
                    ("doc_type", doc.doc_type.clone()),
                    ("routing", doc.routing.clone()),
                    ("parent", doc.parent.clone()),
                ];
                for (name, value) in fields {
                    if let Some(value) = value {
                        prepared.insert(name.to_string(), Value::from(value));
                    }
                }
                if let Some(version) = doc.version {
                    prepared.insert("version".to_string(), Value::from(version));
                }
            }
            DocTarget::Params { params, .. } => prepared.extend(params.clone()),
        }
        if !prepared.contains_key("doc_type") {
            if let Some(doc_type) = schema.doc_type() {
                prepared.insert("doc_type".to_string(), Value::from(doc_type));
            }
        }

        if self.is_emulated(schema) {
            self.emulate_identity(schema, &mut prepared, "id", "doc_type", "parent", "routing");
        }
        prepared.extend(params);
        prepared
    }

    fn multi_get_item(&self, target: &DocTarget, schema: Option<&Arc<Schema>>) -> Map<String, Value> {
        let mut item = Map::new();
        match target {
            DocTarget::Id(id) => {
                item.insert("_id".to_string(), Value::from(id.as_str()));
            }
            DocTarget::Doc(doc) => {
                let fields = [
                    ("_id", doc.id.clone()),
                    ("_index", doc.index.clone()),
                    ("_type", doc.doc_type.clone()),
                    ("routing", doc.routing.clone()),
                    ("parent", doc.parent.clone()),
                ];
                for (name, value) in fields {
                    if let Some(value) = value {
                        item.insert(name.to_string(), Value::from(value));
                    }
                }
                if let Some(version) = doc.version {
                    item.insert("_version".to_string(), Value::from(version));
                }
            }
            DocTarget::Params { params, .. } => item.extend(params.clone()),
        }
        if let Some(schema) = schema {
            if !item.contains_key("_type") {
                if let Some(doc_type) = schema.doc_type() {
                    item.insert("_type".to_string(), Value::from(doc_type));
                }
            }
            if self.is_emulated(schema) {
                self.emulate_identity(schema, &mut item, "_id", "_type", "parent", "routing");
            }
        }
        item
    }

    /// Prefix the id with the logical type, target the shared type and
    /// route by the emulated parent id instead of `parent`
    pub(crate) fn emulate_identity(
        &self,
        schema: &Schema,
        identity: &mut Map<String, Value>,
        id_key: &str,
        type_key: &str,
        parent_key: &str,
        routing_key: &str,
    ) {
        let Some(doc_type) = schema.doc_type() else {
            return;
        };
        if let Some(id) = identity.get(id_key).and_then(value_to_string) {
            identity.insert(
                id_key.to_string(),
                Value::from(doc_types::doc_type_and_id(doc_type, &id)),
            );
        }
        identity.insert(type_key.to_string(), Value::from(self.default_doc_type()));
        if let Some(parent) = identity.remove(parent_key).as_ref().and_then(value_to_string) {
            if !identity.contains_key(routing_key) {
                identity.insert(
                    routing_key.to_string(),
                    Value::from(doc_types::emulated_parent_id(schema, &parent)),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Features;
    use crate::schema::Field;
    use crate::types::FieldType;
    use serde_json::json;

    fn blog_schemas() -> (Arc<Schema>, Arc<Schema>) {
        let blog = Schema::builder("blog")
            .field(Field::new("name", FieldType::Text))
            .join_parent(None)
            .build();
        let post = Schema::builder("post")
            .field(Field::new("title", FieldType::Text))
            .join_parent(Some(&blog))
            .build();
        (blog, post)
    }

    #[test]
    fn test_get_plain() {
        let post = Schema::builder("post").build();
        let compiled = Compiler::new(Features::es_5()).get("42", CallParams::new(), Some(&post));
        assert_eq!(
            compiled.params(),
            json!({"id": "42", "doc_type": "post"}).as_object().unwrap()
        );
        assert!(compiled.body().is_none());
    }

    #[test]
    fn test_get_emulated() {
        let (_, post) = blog_schemas();
        let doc = Document::new(&post).with_id("42").with_parent("7");
        let compiled = Compiler::new(Features::es_6()).get(doc, CallParams::new(), None);
        assert_eq!(
            compiled.params(),
            json!({"id": "post:42", "doc_type": "_doc", "routing": "blog:7"})
                .as_object()
                .unwrap()
        );

        let doc = compiled
            .process_result(json!({
                "_id": "post:42",
                "_type": "_doc",
                "found": true,
                "_source": {"title": "t", "_doc_type": {"name": "post", "parent": "blog:7"}}
            }))
            .unwrap()
            .unwrap();
        assert_eq!(doc.id.as_deref(), Some("42"));
        assert_eq!(doc.parent.as_deref(), Some("7"));
        assert_eq!(doc.doc_type.as_deref(), Some("post"));
    }

    #[test]
    fn test_get_not_found() {
        let compiled = Compiler::default().get("1", CallParams::new(), None);
        assert!(compiled
            .process_result(json!({"_id": "1", "found": false}))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_delete_params_override() {
        let post = Schema::builder("post").build();
        let mut params = CallParams::new();
        params.insert("refresh".to_string(), json!(true));
        let compiled = Compiler::new(Features::es_5()).delete(
            Document::new(&post).with_id("3").with_routing("u1"),
            params,
            None,
        );
        assert_eq!(compiled.api_method(), ApiMethod::Delete);
        assert_eq!(
            compiled.params(),
            json!({"id": "3", "routing": "u1", "doc_type": "post", "refresh": true})
                .as_object()
                .unwrap()
        );
    }

    #[test]
    fn test_multi_get_body() {
        let post = Schema::builder("post").build();
        let mut raw = CallParams::new();
        raw.insert("_id".to_string(), json!("9"));
        raw.insert("_index".to_string(), json!("archive"));
        let compiled = Compiler::new(Features::es_5()).multi_get(
            vec![
                "1".into(),
                Document::new(&post).with_id("2").into(),
                DocTarget::Params {
                    params: raw,
                    schema: None,
                },
            ],
            CallParams::new(),
            None,
        );
        assert_eq!(
            compiled.body(),
            Some(&json!({"docs": [
                {"_id": "1"},
                {"_id": "2", "_type": "post"},
                {"_id": "9", "_index": "archive"}
            ]}))
        );
    }

    #[test]
    fn test_multi_get_dynamic_schema_shared() {
        let compiled = Compiler::new(Features::es_5()).multi_get(
            vec!["1".into(), "2".into()],
            CallParams::new(),
            None,
        );
        let docs = compiled
            .process_result(json!({"docs": [
                {"_id": "1", "found": true, "_source": {"color": "red"}},
                {"_id": "2", "found": true, "_source": {"color": "blue"}}
            ]}))
            .unwrap();
        let first = docs[0].as_ref().unwrap().schema();
        let second = docs[1].as_ref().unwrap().schema();
        assert!(first.is_dynamic());
        assert!(Arc::ptr_eq(first, second));
        assert_eq!(first.dynamic_fields().len(), 1);
    }
}
