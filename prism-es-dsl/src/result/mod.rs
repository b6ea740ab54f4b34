//! Response parsing
//!
//! Raw responses are parsed into typed results. Search hits are hydrated
//! into [`Document`]s of the matching schema, aggregations into
//! [`AggResult`] trees mirroring their specs.

mod aggregation;

pub use aggregation::{AggResult, Bucket};

use crate::compiler::doc_types;
use crate::document::{value_to_string, Document};
use crate::error::DslError;
use crate::expr::Agg;
use crate::schema::Schema;
use crate::search::InstanceMapper;
use crate::Result;
use aggregation::total_value;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Schema selection for hits
#[derive(Debug, Clone)]
pub(crate) struct HitSchemas {
    by_type: IndexMap<String, Arc<Schema>>,
    single: Option<Arc<Schema>>,
    /// Fallback for hits no declared schema matches
    dynamic: Arc<Schema>,
}

impl HitSchemas {
    pub(crate) fn new(doc_classes: &[Arc<Schema>]) -> Self {
        let by_type = doc_classes
            .iter()
            .filter_map(|s| s.doc_type().map(|t| (t.to_string(), Arc::clone(s))))
            .collect();
        let single = match doc_classes {
            [schema] => Some(Arc::clone(schema)),
            _ => None,
        };
        Self {
            by_type,
            single,
            dynamic: Schema::dynamic(),
        }
    }

    /// Type-keyed match, else the only candidate, else the dynamic schema
    pub(crate) fn select(&self, doc_type: Option<&str>) -> Arc<Schema> {
        doc_type
            .and_then(|t| self.by_type.get(t))
            .or(self.single.as_ref())
            .unwrap_or(&self.dynamic)
            .clone()
    }

    pub(crate) fn document(&self, hit: &Value) -> Document {
        let schema = self.select(hit_type(hit).as_deref());
        hydrate(&schema, hit)
    }
}

/// Logical type of a hit: the emulated join type, else `_type`
pub(crate) fn hit_type(hit: &Value) -> Option<String> {
    doc_types::hit_doc_type(hit).or_else(|| hit.get("_type").and_then(value_to_string))
}

/// Build a document of `schema` from a hit, undoing type emulation when
/// the hit carries join information
pub(crate) fn hydrate(schema: &Arc<Schema>, hit: &Value) -> Document {
    let mut doc = Document::from_hit(schema, hit);
    if schema.participates_in_join() && doc_types::hit_doc_type(hit).is_some() {
        doc_types::restore(&mut doc, hit);
    }
    doc
}

pub struct SearchResult {
    raw: Value,
    pub total: u64,
    pub max_score: Option<f64>,
    pub took: Option<u64>,
    pub timed_out: bool,
    pub scroll_id: Option<String>,
    /// Error of a failed sub-request in a multi-search
    pub error: Option<Value>,
    pub hits: Vec<Document>,
    pub aggregations: IndexMap<String, AggResult>,
    instance_mapper: Option<InstanceMapper>,
    instances: OnceLock<HashMap<String, Value>>,
}

impl fmt::Debug for SearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchResult")
            .field("total", &self.total)
            .field("max_score", &self.max_score)
            .field("took", &self.took)
            .field("timed_out", &self.timed_out)
            .field("error", &self.error)
            .field("hits", &self.hits.len())
            .field("aggregations", &self.aggregations.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SearchResult {
    pub fn new(
        raw: Value,
        aggregations: &IndexMap<String, Agg>,
        doc_classes: &[Arc<Schema>],
        instance_mapper: Option<InstanceMapper>,
    ) -> Result<Self> {
        let error = raw.get("error").cloned();
        let hits_section = raw.get("hits");
        if hits_section.is_none() && error.is_none() {
            return Err(DslError::InvalidResponse(
                "search response has no 'hits'".to_string(),
            ));
        }

        let schemas = HitSchemas::new(doc_classes);
        let hits: Vec<Document> = hits_section
            .and_then(|h| h.get("hits"))
            .and_then(Value::as_array)
            .map(|items| items.iter().map(|hit| schemas.document(hit)).collect())
            .unwrap_or_default();

        let mut agg_results = IndexMap::new();
        if let Some(raw_aggs) = raw.get("aggregations") {
            for (name, agg) in aggregations {
                if let Some(raw_agg) = raw_aggs.get(name) {
                    agg_results.insert(name.clone(), AggResult::build(agg, raw_agg, &schemas)?);
                }
            }
        }

        let result = Self {
            total: hits_section
                .and_then(|h| h.get("total"))
                .map(total_value)
                .unwrap_or(0),
            max_score: hits_section
                .and_then(|h| h.get("max_score"))
                .and_then(Value::as_f64),
            took: raw.get("took").and_then(Value::as_u64),
            timed_out: raw.get("timed_out").and_then(Value::as_bool).unwrap_or(false),
            scroll_id: raw.get("_scroll_id").and_then(value_to_string),
            error,
            hits,
            aggregations: agg_results,
            instance_mapper,
            instances: OnceLock::new(),
            raw,
        };
        debug!(
            hits = result.hits.len(),
            total = result.total,
            aggregations = result.aggregations.len(),
            "Parsed search response"
        );
        Ok(result)
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.hits.iter()
    }

    pub fn get_aggregation(&self, name: &str) -> Option<&AggResult> {
        self.aggregations.get(name)
    }

    /// External instance for a hit of this result.
    ///
    /// The first call hands every hit id to the instance mapper at once;
    /// later calls are served from that batch.
    pub fn instance(&self, doc: &Document) -> Option<&Value> {
        let instances = self.instances.get_or_init(|| {
            let Some(mapper) = &self.instance_mapper else {
                return HashMap::new();
            };
            let ids: Vec<String> = self.hits.iter().filter_map(|d| d.id.clone()).collect();
            mapper(&ids)
        });
        doc.id.as_ref().and_then(|id| instances.get(id))
    }
}

impl<'a> IntoIterator for &'a SearchResult {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountResult {
    pub count: u64,
}

impl CountResult {
    pub fn new(raw: &Value) -> Result<Self> {
        let count = raw
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| DslError::InvalidResponse("count response has no 'count'".to_string()))?;
        Ok(Self { count })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExistsResult {
    pub exists: bool,
}

impl ExistsResult {
    pub fn new(raw: &Value) -> Self {
        Self {
            exists: raw.get("exists").and_then(Value::as_bool).unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteResult {
    pub found: bool,
    pub result: Option<String>,
    pub index: Option<String>,
    pub doc_type: Option<String>,
    pub id: Option<String>,
    pub version: Option<i64>,
}

impl DeleteResult {
    pub fn new(raw: &Value) -> Self {
        let result = raw.get("result").and_then(Value::as_str).map(String::from);
        let found = raw
            .get("found")
            .and_then(Value::as_bool)
            .unwrap_or(result.as_deref() == Some("deleted"));
        Self {
            found,
            result,
            index: raw.get("_index").and_then(value_to_string),
            doc_type: raw.get("_type").and_then(value_to_string),
            id: raw.get("_id").and_then(value_to_string),
            version: raw.get("_version").and_then(Value::as_i64),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteByQueryResult {
    pub took: Option<u64>,
    pub timed_out: bool,
    pub total: u64,
    pub deleted: u64,
    pub batches: u64,
    pub version_conflicts: u64,
    pub noops: u64,
    pub failures: Vec<Value>,
}

impl DeleteByQueryResult {
    pub fn new(raw: &Value) -> Self {
        let count = |key: &str| raw.get(key).and_then(Value::as_u64).unwrap_or(0);
        Self {
            took: raw.get("took").and_then(Value::as_u64),
            timed_out: raw.get("timed_out").and_then(Value::as_bool).unwrap_or(false),
            total: count("total"),
            deleted: count("deleted"),
            batches: count("batches"),
            version_conflicts: count("version_conflicts"),
            noops: count("noops"),
            failures: raw
                .get("failures")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        }
    }
}

/// Outcome of one bulk action
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemResult {
    /// `index`, `create`, `update` or `delete`
    pub action: String,
    pub index: Option<String>,
    pub doc_type: Option<String>,
    pub id: Option<String>,
    pub version: Option<i64>,
    pub status: Option<u64>,
    pub result: Option<String>,
    pub error: Option<Value>,
}

impl BulkItemResult {
    fn new(raw: &Value) -> Result<Self> {
        let Some((action, data)) = raw.as_object().and_then(|item| item.iter().next()) else {
            return Err(DslError::InvalidResponse(format!(
                "unexpected bulk item: {}",
                raw
            )));
        };
        Ok(Self {
            action: action.clone(),
            index: data.get("_index").and_then(value_to_string),
            doc_type: data.get("_type").and_then(value_to_string),
            id: data.get("_id").and_then(value_to_string),
            version: data.get("_version").and_then(Value::as_i64),
            status: data.get("status").and_then(Value::as_u64),
            result: data.get("result").and_then(Value::as_str).map(String::from),
            error: data.get("error").cloned(),
        })
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkResult {
    pub took: Option<u64>,
    pub errors: bool,
    pub items: Vec<BulkItemResult>,
}

impl BulkResult {
    pub fn new(raw: &Value) -> Result<Self> {
        let items = raw
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| DslError::InvalidResponse("bulk response has no 'items'".to_string()))?
            .iter()
            .map(BulkItemResult::new)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            took: raw.get("took").and_then(Value::as_u64),
            errors: raw.get("errors").and_then(Value::as_bool).unwrap_or(false),
            items,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PutMappingResult {
    pub acknowledged: bool,
}

impl PutMappingResult {
    pub fn new(raw: &Value) -> Self {
        Self {
            acknowledged: raw
                .get("acknowledged")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}
