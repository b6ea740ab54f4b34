//! Schema registry keyed by document type
//!
//! Holds the process-lifetime set of document schemas and serves as the
//! type-keyed lookup table used by multi-get and result hydration.

use super::Schema;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: RwLock<IndexMap<String, Arc<Schema>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema under its document type. Untyped schemas are not
    /// registered. Re-registering a type replaces the previous schema.
    pub fn register(&self, schema: Arc<Schema>) -> Arc<Schema> {
        if let Some(doc_type) = schema.doc_type() {
            let previous = self
                .schemas
                .write()
                .insert(doc_type.to_string(), Arc::clone(&schema));
            debug!(
                doc_type = doc_type,
                replaced = previous.is_some(),
                "Registered document schema"
            );
        }
        schema
    }

    pub fn get(&self, doc_type: &str) -> Option<Arc<Schema>> {
        self.schemas.read().get(doc_type).cloned()
    }

    /// Registered schemas in registration order
    pub fn schemas(&self) -> Vec<Arc<Schema>> {
        self.schemas.read().values().cloned().collect()
    }

    /// Document types whose join parent is `doc_type`
    pub fn children_of(&self, doc_type: &str) -> Vec<Arc<Schema>> {
        self.schemas
            .read()
            .values()
            .filter(|s| s.join_parent().and_then(|p| p.doc_type()) == Some(doc_type))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.schemas.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.read().is_empty()
    }
}
