//! Bulk endpoint
//!
//! Every action becomes a meta line followed by a source line; delete
//! actions have no source line.

use super::{ApiMethod, CallParams, CompiledEndpoint};
use crate::compiler::{doc_types, Compiler};
use crate::document::{Document, META_FIELD_NAMES};
use crate::expr::{Expr, Params};
use crate::result::BulkResult;
use crate::schema::is_mapping_field;
use crate::Result;
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Index,
    Create,
    Update,
    Delete,
}

impl ActionKind {
    pub fn name(self) -> &'static str {
        match self {
            ActionKind::Index => "index",
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
        }
    }
}

/// Document an action applies to
#[derive(Debug, Clone)]
pub enum ActionDoc {
    Doc(Document),
    /// Plain source with meta keys (`_id`, `_routing` ...) mixed in
    Raw(Map<String, Value>),
}

impl From<Document> for ActionDoc {
    fn from(doc: Document) -> Self {
        ActionDoc::Doc(doc)
    }
}

impl From<Map<String, Value>> for ActionDoc {
    fn from(raw: Map<String, Value>) -> Self {
        ActionDoc::Raw(raw)
    }
}

#[derive(Debug, Clone)]
pub struct Action {
    kind: ActionKind,
    doc: ActionDoc,
    meta_params: Map<String, Value>,
    source_params: Params,
    script: Option<Expr>,
}

impl Action {
    pub fn new(kind: ActionKind, doc: impl Into<ActionDoc>) -> Self {
        Self {
            kind,
            doc: doc.into(),
            meta_params: Map::new(),
            source_params: Params::new(),
            script: None,
        }
    }

    pub fn index(doc: impl Into<ActionDoc>) -> Self {
        Self::new(ActionKind::Index, doc)
    }

    pub fn create(doc: impl Into<ActionDoc>) -> Self {
        Self::new(ActionKind::Create, doc)
    }

    pub fn update(doc: impl Into<ActionDoc>) -> Self {
        Self::new(ActionKind::Update, doc)
    }

    pub fn delete(doc: impl Into<ActionDoc>) -> Self {
        Self::new(ActionKind::Delete, doc)
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Extra key of the meta line (`retry_on_conflict`, `_version_type` ...)
    pub fn meta_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta_params.insert(key.into(), value.into());
        self
    }

    /// Extra key of an update's source line (`doc_as_upsert`, `upsert` ...)
    pub fn source_param(mut self, key: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.source_params.insert(key.into(), value.into());
        self
    }

    /// Update by script instead of a partial document
    pub fn script(mut self, script: Expr) -> Self {
        self.script = Some(script);
        self
    }
}

pub struct CompiledBulk {
    params: CallParams,
    body: Value,
}

impl CompiledEndpoint for CompiledBulk {
    type Output = BulkResult;

    fn api_method(&self) -> ApiMethod {
        ApiMethod::Bulk
    }

    fn params(&self) -> &CallParams {
        &self.params
    }

    fn body(&self) -> Option<&Value> {
        Some(&self.body)
    }

    fn process_result(&self, raw: Value) -> Result<BulkResult> {
        BulkResult::new(&raw)
    }
}

impl Compiler {
    pub fn bulk(&self, actions: &[Action], params: CallParams) -> Result<CompiledBulk> {
        let mut lines = Vec::with_capacity(actions.len() * 2);
        for action in actions {
            lines.push(self.action_meta(action));
            if let Some(source) = self.action_source(action)? {
                lines.push(source);
            }
        }
        debug!(api = "bulk", actions = actions.len(), lines = lines.len(), "Compiled bulk");
        Ok(CompiledBulk {
            params,
            body: Value::Array(lines),
        })
    }

    fn action_meta(&self, action: &Action) -> Value {
        let mut meta = match &action.doc {
            ActionDoc::Doc(doc) => {
                let mut meta = doc.to_meta();
                if self.is_emulated(doc.schema()) {
                    self.emulate_identity(doc.schema(), &mut meta, "_id", "_type", "_parent", "_routing");
                }
                meta
            }
            ActionDoc::Raw(raw) => META_FIELD_NAMES
                .iter()
                .filter_map(|name| {
                    raw.get(*name)
                        .filter(|v| !v.is_null())
                        .map(|v| (name.to_string(), v.clone()))
                })
                .collect(),
        };
        meta.extend(action.meta_params.clone());

        let mut line = Map::new();
        line.insert(action.kind.name().to_string(), Value::Object(meta));
        Value::Object(line)
    }

    fn action_source(&self, action: &Action) -> Result<Option<Value>> {
        if action.kind == ActionKind::Delete {
            return Ok(None);
        }

        let (doc, schemas) = match &action.doc {
            ActionDoc::Doc(doc) => {
                let mut source = doc.to_source(self.validation())?;
                if self.is_emulated(doc.schema()) {
                    source.insert(
                        doc_types::DOC_TYPE_FIELD.to_string(),
                        doc_types::join_source(doc.schema(), doc.parent.as_deref()),
                    );
                }
                (source, vec![doc.schema().clone()])
            }
            ActionDoc::Raw(raw) => {
                let source = raw
                    .iter()
                    .filter(|(key, _)| !is_mapping_field(key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                (source, Vec::new())
            }
        };

        if action.kind != ActionKind::Update {
            return Ok(Some(Value::Object(doc)));
        }

        let compiler = self.expression_compiler(&schemas);
        let mut source = Map::new();
        match &action.script {
            Some(script) => {
                source.insert("script".to_string(), compiler.compile(script)?);
            }
            None => {
                source.insert("doc".to_string(), Value::Object(doc));
            }
        }
        source.extend(compiler.compile_params(&action.source_params)?);
        Ok(Some(Value::Object(source)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Features;
    use crate::config::ValidationMode;
    use crate::error::DslError;
    use crate::expr::params;
    use crate::schema::{Field, Schema};
    use crate::types::FieldType;
    use serde_json::json;
    use std::sync::Arc;

    fn post() -> Arc<Schema> {
        Schema::builder("post")
            .field(Field::new("title", FieldType::Text).required())
            .field(Field::new("rank", FieldType::Integer))
            .build()
    }

    #[test]
    fn test_bulk_lines() {
        let post = post();
        let doc = Document::new(&post)
            .with_id("1")
            .with("title", "Hello")
            .unwrap()
            .with("rank", "3")
            .unwrap();
        let mut raw = Map::new();
        raw.insert("_id".to_string(), json!("2"));
        raw.insert("_routing".to_string(), json!("u1"));
        raw.insert("title".to_string(), json!("Raw"));

        let actions = vec![
            Action::index(doc.clone()).meta_param("_index", "blog"),
            Action::create(raw),
            Action::delete(Document::new(&post).with_id("3")),
        ];
        let compiled = Compiler::new(Features::es_5()).bulk(&actions, CallParams::new()).unwrap();
        assert_eq!(
            compiled.body(),
            Some(&json!([
                {"index": {"_id": "1", "_type": "post", "_index": "blog"}},
                {"title": "Hello", "rank": 3},
                {"create": {"_id": "2", "_routing": "u1"}},
                {"title": "Raw"},
                {"delete": {"_id": "3", "_type": "post"}}
            ]))
        );
    }

    #[test]
    fn test_update_doc_and_script() {
        let post = post();
        let doc = Document::new(&post).with_id("1").with("rank", 4).unwrap();
        let actions = vec![
            Action::update(doc.clone()).source_param("doc_as_upsert", true),
            Action::update(doc).script(Expr::script(params([
                ("source", "ctx._source.rank += params.n"),
                ("lang", "painless"),
            ]))),
        ];
        let compiled = Compiler::default().bulk(&actions, CallParams::new()).unwrap();
        let body = compiled.body().unwrap();
        assert_eq!(body[1], json!({"doc": {"rank": 4}, "doc_as_upsert": true}));
        assert_eq!(
            body[3],
            json!({"script": {"source": "ctx._source.rank += params.n", "lang": "painless"}})
        );
    }

    #[test]
    fn test_bulk_emulated() {
        let question = Schema::builder("question").join_parent(None).build();
        let answer = Schema::builder("answer")
            .field(Field::new("body", FieldType::Text))
            .join_parent(Some(&question))
            .build();
        let doc = Document::new(&answer)
            .with_id("3")
            .with_parent("1")
            .with("body", "yes")
            .unwrap();
        let compiled = Compiler::new(Features::es_6())
            .bulk(&[Action::index(doc)], CallParams::new())
            .unwrap();
        assert_eq!(
            compiled.body(),
            Some(&json!([
                {"index": {"_id": "answer:3", "_type": "_doc", "_routing": "question:1"}},
                {"body": "yes", "_doc_type": {"name": "answer", "parent": "question:1"}}
            ]))
        );
    }

    #[test]
    fn test_bulk_validation() {
        let post = post();
        let doc = Document::new(&post).with_id("1").with("rank", 1).unwrap();
        let compiler = Compiler::default().with_validation(ValidationMode::Strict);
        let err = compiler
            .bulk(&[Action::index(doc)], CallParams::new())
            .err()
            .unwrap();
        assert!(matches!(err, DslError::Validation(_)));
    }
}
