//! Document-type emulation
//!
//! Versions without mapping types store every logical type of an index
//! under one physical type. The logical type and the parent link live in
//! a join field, and ids are prefixed with the logical type.

use crate::capability::Features;
use crate::document::{value_to_string, Document};
use crate::schema::Schema;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Join field holding the logical type and the parent link
pub const DOC_TYPE_FIELD: &str = "_doc_type";
pub const DOC_TYPE_ID_DELIMITER: char = ':';
pub const DOC_TYPE_PARENT_DELIMITER: char = '#';

/// Whether documents of `schema` are stored with emulated types
pub fn is_emulated(features: &Features, schema: &Schema) -> bool {
    !features.supports_mapping_types && schema.doc_type().is_some() && schema.participates_in_join()
}

/// `"{doc_type}:{id}"`
pub fn doc_type_and_id(doc_type: &str, id: &str) -> String {
    format!("{}{}{}", doc_type, DOC_TYPE_ID_DELIMITER, id)
}

/// Docvalue field carrying the parent id for children of `parent_type`
pub fn doc_type_field_name(parent_type: &str) -> String {
    format!("{}{}{}", DOC_TYPE_FIELD, DOC_TYPE_PARENT_DELIMITER, parent_type)
}

/// Strip the `"{doc_type}:"` prefix of an emulated id
pub fn strip_doc_type(doc_type: &str, id: &str) -> String {
    id.strip_prefix(doc_type)
        .and_then(|rest| rest.strip_prefix(DOC_TYPE_ID_DELIMITER))
        .unwrap_or(id)
        .to_string()
}

/// Emulated id of the parent document
pub(crate) fn emulated_parent_id(schema: &Schema, parent_id: &str) -> String {
    match schema.join_parent().and_then(|p| p.doc_type()) {
        Some(parent_type) => doc_type_and_id(parent_type, parent_id),
        None => parent_id.to_string(),
    }
}

/// Join field value written into the source of an emulated document
pub(crate) fn join_source(schema: &Schema, parent: Option<&str>) -> Value {
    let mut join = Map::new();
    if let Some(doc_type) = schema.doc_type() {
        join.insert("name".to_string(), Value::from(doc_type));
    }
    if let Some(parent) = parent {
        join.insert(
            "parent".to_string(),
            Value::from(emulated_parent_id(schema, parent)),
        );
    }
    Value::Object(join)
}

/// Sorted docvalue fields needed to recover logical types and parent ids
/// of hits, empty when no schema is emulated
pub(crate) fn docvalue_fields(features: &Features, doc_classes: &[Arc<Schema>]) -> Vec<String> {
    let mut join_types: Vec<&str> = Vec::new();
    for schema in doc_classes.iter().filter(|s| is_emulated(features, s)) {
        let own = schema.doc_type();
        let parent = schema.join_parent().and_then(|p| p.doc_type());
        for doc_type in own.into_iter().chain(parent) {
            if !join_types.contains(&doc_type) {
                join_types.push(doc_type);
            }
        }
    }
    if join_types.is_empty() {
        return Vec::new();
    }

    let mut fields = vec![DOC_TYPE_FIELD.to_string()];
    fields.extend(join_types.into_iter().map(doc_type_field_name));
    fields.sort();
    fields
}

/// Logical type of an emulated hit, read from the join docvalue field or
/// from the join value in the source
pub(crate) fn hit_doc_type(hit: &Value) -> Option<String> {
    let from_fields = hit
        .get("fields")
        .and_then(|f| f.get(DOC_TYPE_FIELD))
        .and_then(first_string);
    from_fields.or_else(|| {
        hit.get("_source")
            .and_then(|s| s.get(DOC_TYPE_FIELD))
            .and_then(|j| match j {
                Value::String(name) => Some(name.clone()),
                other => other.get("name").and_then(value_to_string),
            })
    })
}

/// Undo the emulation on a hydrated document: logical type, plain id and
/// plain parent id. The join value is removed from the source.
pub(crate) fn restore(doc: &mut Document, hit: &Value) {
    let schema = Arc::clone(doc.schema());
    let Some(doc_type) = schema.doc_type() else {
        return;
    };
    let join = doc.remove(DOC_TYPE_FIELD);

    doc.doc_type = Some(doc_type.to_string());
    if let Some(id) = doc.id.take() {
        doc.id = Some(strip_doc_type(doc_type, &id));
    }

    let Some(parent_type) = schema.join_parent().and_then(|p| p.doc_type()) else {
        return;
    };
    let parent = hit
        .get("fields")
        .and_then(|f| f.get(doc_type_field_name(parent_type)))
        .and_then(first_string)
        .or_else(|| join.as_ref().and_then(|j| j.get("parent")).and_then(value_to_string));
    if let Some(parent) = parent {
        doc.parent = Some(strip_doc_type(parent_type, &parent));
    }
}

fn first_string(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.first().and_then(value_to_string),
        other => value_to_string(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn question_answer() -> (Arc<Schema>, Arc<Schema>) {
        let question = Schema::builder("question").join_parent(None).build();
        let answer = Schema::builder("answer")
            .join_parent(Some(&question))
            .build();
        (question, answer)
    }

    #[test]
    fn test_is_emulated() {
        let (question, answer) = question_answer();
        let plain = Schema::builder("post").build();

        assert!(is_emulated(&Features::es_6(), &question));
        assert!(is_emulated(&Features::es_6(), &answer));
        assert!(!is_emulated(&Features::es_6(), &plain));
        assert!(!is_emulated(&Features::es_5(), &answer));
    }

    #[test]
    fn test_ids() {
        assert_eq!(doc_type_and_id("post", "42"), "post:42");
        assert_eq!(strip_doc_type("post", "post:42"), "42");
        assert_eq!(strip_doc_type("post", "42"), "42");
        assert_eq!(doc_type_field_name("question"), "_doc_type#question");
    }

    #[test]
    fn test_docvalue_fields_sorted() {
        let (question, answer) = question_answer();
        let fields = docvalue_fields(&Features::es_6(), &[answer, question]);
        assert_eq!(
            fields,
            vec!["_doc_type", "_doc_type#answer", "_doc_type#question"]
        );
        assert!(docvalue_fields(&Features::es_5(), &[]).is_empty());
    }

    #[test]
    fn test_restore_from_docvalues() {
        let (_, answer) = question_answer();
        let hit = json!({
            "_id": "answer:3",
            "_type": "_doc",
            "_source": {"_doc_type": {"name": "answer", "parent": "question:1"}},
            "fields": {
                "_doc_type": ["answer"],
                "_doc_type#question": ["question:1"]
            }
        });
        assert_eq!(hit_doc_type(&hit).as_deref(), Some("answer"));

        let mut doc = Document::from_hit(&answer, &hit);
        restore(&mut doc, &hit);
        assert_eq!(doc.id.as_deref(), Some("3"));
        assert_eq!(doc.doc_type.as_deref(), Some("answer"));
        assert_eq!(doc.parent.as_deref(), Some("1"));
        assert!(doc.get(DOC_TYPE_FIELD).is_none());
    }

    #[test]
    fn test_join_source() {
        let (_, answer) = question_answer();
        assert_eq!(
            join_source(&answer, Some("1")),
            json!({"name": "answer", "parent": "question:1"})
        );
    }
}
