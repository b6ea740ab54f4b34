//! Search query context
//!
//! [`SearchQuery`] accumulates everything a search request can carry
//! (query, filters, sorting, aggregations, paging, highlighting ...) and
//! is compiled by the search, count, exists and delete-by-query
//! endpoints.

use crate::expr::{params, Agg, BoolQuery, Expr, Function, Highlight, Params, Rescore, Source};
use crate::schema::Schema;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Maps document ids of a result page to external instances
pub type InstanceMapper = Arc<dyn Fn(&[String]) -> HashMap<String, Value> + Send + Sync>;

/// Explicit stored field selection
#[derive(Debug, Clone)]
pub enum StoredFields {
    /// `"*"`
    All,
    /// Nothing is emitted
    Disabled,
    Fields(Vec<Expr>),
}

/// A `function_score` layer wrapped around the query
#[derive(Debug, Clone, Default)]
pub struct ScoreLayer {
    pub functions: Vec<Function>,
    pub params: Params,
}

#[derive(Clone, Default)]
pub struct SearchQuery {
    query: Option<Expr>,
    filters: Vec<Expr>,
    post_filters: Vec<Expr>,
    order_by: Vec<Expr>,
    source: Option<Source>,
    stored_fields: Option<StoredFields>,
    docvalue_fields: Vec<Expr>,
    aggregations: IndexMap<String, Agg>,
    limit: Option<u64>,
    offset: Option<u64>,
    min_score: Option<f64>,
    rescores: Vec<Rescore>,
    suggest: Params,
    highlight: Option<Highlight>,
    script_fields: Params,
    function_score: ScoreLayer,
    boost_score: ScoreLayer,
    doc_classes: Vec<Arc<Schema>>,
    doc_type: Option<String>,
    index: Option<String>,
    search_params: Map<String, Value>,
    instance_mapper: Option<InstanceMapper>,
}

impl fmt::Debug for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchQuery")
            .field("query", &self.query)
            .field("filters", &self.filters)
            .field("post_filters", &self.post_filters)
            .field("order_by", &self.order_by)
            .field("aggregations", &self.aggregations.keys().collect::<Vec<_>>())
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("doc_type", &self.doc_type)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the main query
    pub fn query(mut self, query: Expr) -> Self {
        self.query = Some(query);
        self
    }

    /// Add a filter clause; filters are combined with `must`
    pub fn filter(mut self, filter: Expr) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn post_filter(mut self, filter: Expr) -> Self {
        self.post_filters.push(filter);
        self
    }

    pub fn order_by(mut self, sort: impl Into<Expr>) -> Self {
        self.order_by.push(sort.into());
        self
    }

    pub fn source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn stored_fields(mut self, fields: StoredFields) -> Self {
        self.stored_fields = Some(fields);
        self
    }

    pub fn docvalue_field(mut self, field: impl Into<Expr>) -> Self {
        self.docvalue_fields.push(field.into());
        self
    }

    pub fn aggregation(mut self, name: impl Into<String>, agg: Agg) -> Self {
        self.aggregations.insert(name.into(), agg);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn min_score(mut self, min_score: f64) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn rescore(mut self, rescore: Rescore) -> Self {
        self.rescores.push(rescore);
        self
    }

    pub fn suggest(mut self, name: impl Into<String>, suggester: impl Into<Expr>) -> Self {
        self.suggest.insert(name.into(), suggester.into());
        self
    }

    pub fn highlight(mut self, highlight: Highlight) -> Self {
        self.highlight = Some(highlight);
        self
    }

    pub fn script_field(mut self, name: impl Into<String>, script: Expr) -> Self {
        self.script_fields
            .insert(name.into(), Expr::Params(params([("script", script)])));
        self
    }

    /// Add functions to the outer `function_score` layer
    pub fn function_score(mut self, functions: Vec<Function>, params: Params) -> Self {
        self.function_score.functions.extend(functions);
        self.function_score.params.extend(params);
        self
    }

    /// Add functions to the inner boosting layer. Its scores are summed
    /// and added to the query score unless `params` says otherwise.
    pub fn boost_score(mut self, functions: Vec<Function>, overrides: Params) -> Self {
        if self.boost_score.params.is_empty() {
            self.boost_score.params = params([("score_mode", "sum"), ("boost_mode", "sum")]);
        }
        self.boost_score.functions.extend(functions);
        self.boost_score.params.extend(overrides);
        self
    }

    /// Restrict hydration to these document schemas
    pub fn doc_class(mut self, schema: &Arc<Schema>) -> Self {
        self.doc_classes.push(Arc::clone(schema));
        self
    }

    pub fn doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Query-string level parameter (`routing`, `search_type` ...)
    pub fn search_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.search_params.insert(key.into(), value.into());
        self
    }

    pub fn instance_mapper(mut self, mapper: InstanceMapper) -> Self {
        self.instance_mapper = Some(mapper);
        self
    }

    pub fn get_query(&self) -> Option<&Expr> {
        self.query.as_ref()
    }

    pub fn filters(&self) -> &[Expr] {
        &self.filters
    }

    pub fn post_filters(&self) -> &[Expr] {
        &self.post_filters
    }

    pub fn sorting(&self) -> &[Expr] {
        &self.order_by
    }

    pub fn get_source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    pub fn get_stored_fields(&self) -> Option<&StoredFields> {
        self.stored_fields.as_ref()
    }

    pub fn docvalue_fields(&self) -> &[Expr] {
        &self.docvalue_fields
    }

    pub fn aggregations(&self) -> &IndexMap<String, Agg> {
        &self.aggregations
    }

    pub fn get_limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn get_offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn get_min_score(&self) -> Option<f64> {
        self.min_score
    }

    pub fn rescores(&self) -> &[Rescore] {
        &self.rescores
    }

    pub fn get_suggest(&self) -> &Params {
        &self.suggest
    }

    pub fn get_highlight(&self) -> Option<&Highlight> {
        self.highlight.as_ref()
    }

    pub fn script_fields(&self) -> &Params {
        &self.script_fields
    }

    pub fn get_index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    pub fn get_instance_mapper(&self) -> Option<&InstanceMapper> {
        self.instance_mapper.as_ref()
    }

    /// The query wrapped in its score layers, boosting layer innermost
    pub fn scored_query(&self) -> Option<Expr> {
        let mut query = self.query.clone();
        for layer in [&self.boost_score, &self.function_score] {
            if layer.functions.is_empty() {
                continue;
            }
            query = Some(Expr::FunctionScore {
                query: query.map(Box::new),
                functions: layer.functions.clone(),
                params: layer.params.clone(),
            });
        }
        query
    }

    /// Scored query combined with the filters
    pub fn filtered_query(&self) -> Option<Expr> {
        let query = self.scored_query();
        if self.filters.is_empty() {
            return query;
        }
        Some(Expr::Filtered {
            query: query.map(Box::new),
            filter: Box::new(Expr::must(self.filters.clone())),
        })
    }

    pub fn post_filter_expr(&self) -> Option<Expr> {
        if self.post_filters.is_empty() {
            return None;
        }
        Some(Expr::must(self.post_filters.clone()))
    }

    /// Explicit document schemas, else the typed schemas referenced
    /// anywhere in the request
    pub fn collect_doc_classes(&self) -> Vec<Arc<Schema>> {
        if !self.doc_classes.is_empty() {
            return self.doc_classes.clone();
        }

        let mut found = Vec::new();
        let mut visit = |expr: &Expr| expr.collect_schemas_into(&mut found);
        if let Some(query) = &self.query {
            visit(query);
        }
        self.filters
            .iter()
            .chain(&self.post_filters)
            .chain(&self.order_by)
            .chain(&self.docvalue_fields)
            .chain(self.suggest.values())
            .chain(self.script_fields.values())
            .for_each(&mut visit);
        for layer in [&self.function_score, &self.boost_score] {
            for function in &layer.functions {
                visit(&Expr::Function(Box::new(function.clone())));
            }
        }
        if let Some(source) = &self.source {
            visit(&Expr::Source(source.clone()));
        }
        if let Some(highlight) = &self.highlight {
            visit(&Expr::Highlight(highlight.clone()));
        }
        for agg in self.aggregations.values() {
            crate::expr::collect_agg(agg, &mut found);
        }
        found
    }

    /// Document type parameter: explicit, else the comma-joined types of
    /// the document schemas
    pub fn resolve_doc_type(&self, doc_classes: &[Arc<Schema>]) -> Option<String> {
        if self.doc_type.is_some() {
            return self.doc_type.clone();
        }
        let types: Vec<&str> = doc_classes.iter().filter_map(|s| s.doc_type()).collect();
        if types.is_empty() {
            None
        } else {
            Some(types.join(","))
        }
    }

    /// Default search parameters of the document schemas, overridden by
    /// the query's own parameters
    pub fn merged_search_params(&self, doc_classes: &[Arc<Schema>]) -> Map<String, Value> {
        let mut merged = Map::new();
        for schema in doc_classes {
            for (key, value) in schema.search_params() {
                merged.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in &self.search_params {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

impl From<Expr> for SearchQuery {
    fn from(query: Expr) -> Self {
        SearchQuery::new().query(query)
    }
}

impl From<BoolQuery> for SearchQuery {
    fn from(query: BoolQuery) -> Self {
        SearchQuery::new().query(Expr::Bool(query))
    }
}
