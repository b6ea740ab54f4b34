//! Endpoint compilers end to end: request shape and response parsing

use prism_es_dsl::endpoints::{parse_mapping, Action, DocTarget};
use prism_es_dsl::{
    execute, ApiMethod, CallParams, CompiledEndpoint, Compiler, Document, DslConfig, DslError,
    Expr, Features, Field, FieldType, Schema, SchemaRegistry, SearchQuery, Transport,
    ValidationMode,
};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

// ── Helpers ─────────────────────────────────────────────────────────────────

fn blog_and_post() -> (Arc<Schema>, Arc<Schema>) {
    let blog = Schema::builder("blog")
        .field(Field::new("name", FieldType::Text))
        .join_parent(None)
        .build();
    let post = Schema::builder("post")
        .field(Field::new("title", FieldType::Text).required())
        .field(Field::new("rank", FieldType::Integer))
        .join_parent(Some(&blog))
        .build();
    (blog, post)
}

fn plain_post() -> Arc<Schema> {
    Schema::builder("post")
        .field(Field::new("title", FieldType::Text).required())
        .field(Field::new("rank", FieldType::Integer))
        .build()
}

struct StaticTransport(Value);

impl Transport for StaticTransport {
    fn invoke(
        &self,
        _method: ApiMethod,
        _params: &CallParams,
        _body: Option<&Value>,
    ) -> prism_es_dsl::Result<Value> {
        Ok(self.0.clone())
    }
}

// ── Get under type emulation ────────────────────────────────────────────────

#[test]
fn test_emulated_get_prefixes_id_and_uses_shared_type() {
    let (_, post) = blog_and_post();
    let compiler = Compiler::new(Features::es_6());
    let compiled = compiler.get("42", CallParams::new(), Some(&post));

    assert_eq!(compiled.params()["id"], json!("post:42"));
    assert_eq!(compiled.params()["doc_type"], json!("_doc"));

    let custom = Compiler::new(Features::es_6()).with_default_doc_type("doc");
    let compiled = custom.get("42", CallParams::new(), Some(&post));
    assert_eq!(compiled.params()["doc_type"], json!("doc"));
}

#[test]
fn test_get_without_emulation_keeps_id() {
    let (_, post) = blog_and_post();
    let compiled = Compiler::new(Features::es_5()).get("42", CallParams::new(), Some(&post));
    assert_eq!(compiled.params()["id"], json!("42"));
    assert_eq!(compiled.params()["doc_type"], json!("post"));
}

// ── Multi-get schema precedence ─────────────────────────────────────────────

fn found(doc_type: &str, id: &str) -> Value {
    json!({"_type": doc_type, "_id": id, "found": true, "_source": {"title": "t"}})
}

#[test]
fn test_multi_get_type_map() {
    let post = plain_post();
    let compiled = Compiler::new(Features::es_5())
        .multi_get(vec!["7".into()], CallParams::new(), None)
        .with_type_map(&[post]);
    let docs = compiled
        .process_result(json!({"docs": [found("post", "7")]}))
        .unwrap();
    let doc = docs[0].as_ref().unwrap();
    assert_eq!(doc.schema().doc_type(), Some("post"));
    assert_eq!(doc.id.as_deref(), Some("7"));
}

#[test]
fn test_multi_get_dynamic_fallback() {
    let compiled = Compiler::new(Features::es_5()).multi_get(vec!["7".into()], CallParams::new(), None);
    let docs = compiled
        .process_result(json!({"docs": [found("post", "7"), {"_id": "8", "found": false}]}))
        .unwrap();
    assert!(docs[0].as_ref().unwrap().schema().is_dynamic());
    assert!(docs[1].is_none());
}

#[test]
fn test_multi_get_embedded_hint_beats_type_map() {
    let post = plain_post();
    let article = Schema::builder("article")
        .field(Field::new("title", FieldType::Text))
        .build();
    let target = DocTarget::Params {
        params: json!({"_id": "7"}).as_object().unwrap().clone(),
        schema: Some(article),
    };
    let compiled = Compiler::new(Features::es_5())
        .multi_get(vec![target], CallParams::new(), None)
        .with_type_map(&[post]);
    assert_eq!(
        compiled.body(),
        Some(&json!({"docs": [{"_id": "7", "_type": "article"}]}))
    );
    let docs = compiled
        .process_result(json!({"docs": [found("post", "7")]}))
        .unwrap();
    assert_eq!(docs[0].as_ref().unwrap().schema().doc_type(), Some("article"));
}

#[test]
fn test_multi_get_explicit_schema_wins() {
    let post = plain_post();
    let article = Schema::builder("article").build();
    let comment = Schema::builder("comment").build();
    let registry = SchemaRegistry::new();
    registry.register(post);

    let target = DocTarget::Doc(Document::new(&article).with_id("7"));
    let compiled = Compiler::new(Features::es_5())
        .multi_get(vec![target], CallParams::new(), Some(&comment))
        .with_registry(&registry);
    let docs = compiled
        .process_result(json!({"docs": [found("post", "7")]}))
        .unwrap();
    assert_eq!(docs[0].as_ref().unwrap().schema().doc_type(), Some("comment"));
}

#[test]
fn test_multi_get_missing_docs() {
    let compiled = Compiler::default().multi_get(vec!["1".into()], CallParams::new(), None);
    let err = compiled.process_result(json!({})).unwrap_err();
    assert!(matches!(err, DslError::InvalidResponse(_)));
}

// ── Multi-search ────────────────────────────────────────────────────────────

#[test]
fn test_multi_search_raises_with_every_error() {
    let queries = vec![
        SearchQuery::new().query(Expr::term("a", 1)),
        SearchQuery::new().query(Expr::term("b", 2)),
        SearchQuery::new().query(Expr::term("c", 3)),
    ];
    let compiled = Compiler::default()
        .multi_search(&queries, CallParams::new(), true)
        .unwrap();
    let transport = StaticTransport(json!({"responses": [
        {"error": {"type": "search_phase_execution_exception"}, "status": 400},
        {"hits": {"total": 0, "hits": []}},
        {"error": {"type": "index_not_found_exception"}, "status": 404}
    ]}));

    let err = execute(&transport, &compiled).unwrap_err();
    match &err {
        DslError::MultiSearch { errors } => {
            assert_eq!(errors.len(), 2);
            assert_eq!(errors[1]["type"], json!("index_not_found_exception"));
        }
        other => panic!("Expected MultiSearch error, got {:?}", other),
    }
}

// ── Validation ──────────────────────────────────────────────────────────────

#[test]
fn test_strict_validation_on_bulk() {
    let post = plain_post();
    let compiler = Compiler::new(Features::es_5()).with_validation(ValidationMode::Strict);

    let missing = Document::new(&post).with_id("1").with("rank", 2).unwrap();
    let err = compiler
        .bulk(&[Action::index(missing)], CallParams::new())
        .err()
        .unwrap();
    match err {
        DslError::Validation(messages) => assert_eq!(messages, vec!["'title' is required"]),
        other => panic!("Expected validation error, got {:?}", other),
    }

    let complete = Document::new(&post)
        .with_id("1")
        .with("title", "Hello")
        .unwrap()
        .with("rank", Value::Null)
        .unwrap();
    let compiled = compiler
        .bulk(&[Action::index(complete)], CallParams::new())
        .unwrap();
    assert_eq!(compiled.body().unwrap()[1], json!({"title": "Hello"}));
}

#[test]
fn test_empty_values_count_as_absent() {
    let post = plain_post();
    for empty in [Value::Null, json!(""), json!([])] {
        let doc = Document::new(&post).with("title", empty).unwrap();
        let err = doc.to_source(ValidationMode::Strict).unwrap_err();
        assert!(matches!(err, DslError::Validation(_)));
    }
}

// ── Mapping round trip ──────────────────────────────────────────────────────

#[test]
fn test_mapping_round_trip_under_es5() {
    let schema = Schema::builder("article")
        .field(Field::new("headline", FieldType::Text).sub_field(Field::new("raw", FieldType::Keyword)))
        .field(Field::new("published", FieldType::Date))
        .field(Field::new("views", FieldType::Long))
        .field(Field::new("score", FieldType::Float))
        .field(Field::new("public", FieldType::Boolean))
        .build();
    let compiler = Compiler::new(Features::es_5());
    let compiled = compiler.put_mapping(&schema, CallParams::new()).unwrap();
    let parsed = parse_mapping(Some("article"), compiled.body().unwrap()).unwrap();

    let fields = |s: &Schema| {
        s.user_fields()
            .map(|f| (f.name.clone(), f.field_type.wire_name()))
            .collect::<Vec<_>>()
    };
    assert_eq!(fields(&parsed), fields(&schema));
    assert_eq!(parsed.doc_type(), Some("article"));
}

// ── Configuration ───────────────────────────────────────────────────────────

#[test]
fn test_compiler_from_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "version = \"5.6.3\"\nvalidation = \"full\"").unwrap();

    let config = DslConfig::load(file.path()).unwrap();
    let compiler = Compiler::from_config(&config).unwrap();
    assert_eq!(compiler.features(), &Features::es_5());
    assert_eq!(compiler.validation(), ValidationMode::Full);
    assert_eq!(compiler.default_doc_type(), "_doc");
}
