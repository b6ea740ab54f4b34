//! Search family endpoints: search, scroll, count, exists and
//! delete-by-query

use super::{ApiMethod, CallParams, CompiledEndpoint};
use crate::compiler::{doc_types, Compiler, ExprCompiler};
use crate::expr::{Agg, Expr};
use crate::result::{CountResult, DeleteByQueryResult, ExistsResult, SearchResult};
use crate::schema::Schema;
use crate::search::{InstanceMapper, SearchQuery, StoredFields};
use crate::Result;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

pub struct CompiledSearchQuery {
    params: CallParams,
    body: Value,
    aggregations: IndexMap<String, Agg>,
    doc_classes: Vec<Arc<Schema>>,
    instance_mapper: Option<InstanceMapper>,
}

impl CompiledSearchQuery {
    pub fn doc_classes(&self) -> &[Arc<Schema>] {
        &self.doc_classes
    }

    pub(crate) fn params_mut(&mut self) -> &mut CallParams {
        &mut self.params
    }
}

impl CompiledEndpoint for CompiledSearchQuery {
    type Output = SearchResult;

    fn api_method(&self) -> ApiMethod {
        ApiMethod::Search
    }

    fn params(&self) -> &CallParams {
        &self.params
    }

    fn body(&self) -> Option<&Value> {
        Some(&self.body)
    }

    fn process_result(&self, raw: Value) -> Result<SearchResult> {
        SearchResult::new(
            raw,
            &self.aggregations,
            &self.doc_classes,
            self.instance_mapper.clone(),
        )
    }
}

/// Next page of a scrolled search
pub struct CompiledScroll {
    params: CallParams,
    doc_classes: Vec<Arc<Schema>>,
    instance_mapper: Option<InstanceMapper>,
}

impl CompiledScroll {
    pub fn instance_mapper(mut self, mapper: InstanceMapper) -> Self {
        self.instance_mapper = Some(mapper);
        self
    }
}

impl CompiledEndpoint for CompiledScroll {
    type Output = SearchResult;

    fn api_method(&self) -> ApiMethod {
        ApiMethod::Scroll
    }

    fn params(&self) -> &CallParams {
        &self.params
    }

    fn body(&self) -> Option<&Value> {
        None
    }

    fn process_result(&self, raw: Value) -> Result<SearchResult> {
        SearchResult::new(
            raw,
            &IndexMap::new(),
            &self.doc_classes,
            self.instance_mapper.clone(),
        )
    }
}

pub struct CompiledCountQuery {
    params: CallParams,
    body: Value,
}

impl CompiledEndpoint for CompiledCountQuery {
    type Output = CountResult;

    fn api_method(&self) -> ApiMethod {
        ApiMethod::Count
    }

    fn params(&self) -> &CallParams {
        &self.params
    }

    fn body(&self) -> Option<&Value> {
        Some(&self.body)
    }

    fn process_result(&self, raw: Value) -> Result<CountResult> {
        CountResult::new(&raw)
    }
}

/// Existence check. Versions without the exists API run a search that
/// stops at the first match.
pub struct CompiledExistsQuery {
    params: CallParams,
    body: Value,
    exists_api: bool,
}

impl CompiledEndpoint for CompiledExistsQuery {
    type Output = ExistsResult;

    fn api_method(&self) -> ApiMethod {
        if self.exists_api {
            ApiMethod::Exists
        } else {
            ApiMethod::Search
        }
    }

    fn params(&self) -> &CallParams {
        &self.params
    }

    fn body(&self) -> Option<&Value> {
        Some(&self.body)
    }

    fn process_result(&self, raw: Value) -> Result<ExistsResult> {
        if self.exists_api {
            return Ok(ExistsResult::new(&raw));
        }
        let result = SearchResult::new(raw, &IndexMap::new(), &[], None)?;
        Ok(ExistsResult {
            exists: result.total >= 1,
        })
    }
}

pub struct CompiledDeleteByQuery {
    params: CallParams,
    body: Value,
}

impl CompiledEndpoint for CompiledDeleteByQuery {
    type Output = DeleteByQueryResult;

    fn api_method(&self) -> ApiMethod {
        ApiMethod::DeleteByQuery
    }

    fn params(&self) -> &CallParams {
        &self.params
    }

    fn body(&self) -> Option<&Value> {
        Some(&self.body)
    }

    fn process_result(&self, raw: Value) -> Result<DeleteByQueryResult> {
        Ok(DeleteByQueryResult::new(&raw))
    }
}

impl Compiler {
    pub fn search_query(&self, query: &SearchQuery, params: CallParams) -> Result<CompiledSearchQuery> {
        let doc_classes = query.collect_doc_classes();
        let params = self.prepare_search_params(query, &doc_classes, params);
        let body = self.search_body(query, &doc_classes)?;
        debug!(
            api = "search",
            doc_classes = doc_classes.len(),
            aggregations = query.aggregations().len(),
            "Compiled search query"
        );
        Ok(CompiledSearchQuery {
            params,
            body: Value::Object(body),
            aggregations: query.aggregations().clone(),
            doc_classes,
            instance_mapper: query.get_instance_mapper().cloned(),
        })
    }

    /// `scroll` is the keep-alive of the scroll context (`"1m"`)
    pub fn scroll(
        &self,
        scroll_id: &str,
        scroll: Option<&str>,
        doc_classes: &[Arc<Schema>],
        params: CallParams,
    ) -> CompiledScroll {
        let mut prepared = CallParams::new();
        prepared.insert("scroll_id".to_string(), Value::from(scroll_id));
        if let Some(scroll) = scroll {
            prepared.insert("scroll".to_string(), Value::from(scroll));
        }
        prepared.extend(params);
        CompiledScroll {
            params: prepared,
            doc_classes: doc_classes.to_vec(),
            instance_mapper: None,
        }
    }

    pub fn count_query(&self, query: &SearchQuery, params: CallParams) -> Result<CompiledCountQuery> {
        let doc_classes = query.collect_doc_classes();
        let params = self.prepare_search_params(query, &doc_classes, params);
        let body = self.scalar_body(query, &doc_classes)?;
        debug!(api = "count", "Compiled count query");
        Ok(CompiledCountQuery {
            params,
            body: Value::Object(body),
        })
    }

    pub fn exists_query(&self, query: &SearchQuery, params: CallParams) -> Result<CompiledExistsQuery> {
        let doc_classes = query.collect_doc_classes();
        let params = self.prepare_search_params(query, &doc_classes, params);
        let mut body = self.scalar_body(query, &doc_classes)?;
        let exists_api = self.features().supports_search_exists_api;
        if !exists_api {
            body.insert("size".to_string(), Value::from(0));
            body.insert("terminate_after".to_string(), Value::from(1));
        }
        debug!(api = "exists", exists_api, "Compiled exists query");
        Ok(CompiledExistsQuery {
            params,
            body: Value::Object(body),
            exists_api,
        })
    }

    pub fn delete_by_query(&self, query: &SearchQuery, params: CallParams) -> Result<CompiledDeleteByQuery> {
        let doc_classes = query.collect_doc_classes();
        let params = self.prepare_search_params(query, &doc_classes, params);
        let body = self.scalar_body(query, &doc_classes)?;
        debug!(api = "delete_by_query", "Compiled delete by query");
        Ok(CompiledDeleteByQuery {
            params,
            body: Value::Object(body),
        })
    }

    /// Schema defaults, then caller parameters, then the query's own
    /// type and index. Emulated searches always target the shared type.
    fn prepare_search_params(
        &self,
        query: &SearchQuery,
        doc_classes: &[Arc<Schema>],
        params: CallParams,
    ) -> CallParams {
        let mut prepared = query.merged_search_params(doc_classes);
        prepared.extend(params);

        if doc_classes.iter().any(|s| self.is_emulated(s)) {
            prepared.insert(
                "doc_type".to_string(),
                Value::from(self.default_doc_type()),
            );
        } else if let Some(doc_type) = query.resolve_doc_type(doc_classes) {
            prepared
                .entry("doc_type")
                .or_insert_with(|| Value::from(doc_type));
        }
        if let Some(index) = query.get_index() {
            prepared
                .entry("index")
                .or_insert_with(|| Value::from(index));
        }
        prepared
    }

    fn search_body(&self, query: &SearchQuery, doc_classes: &[Arc<Schema>]) -> Result<Map<String, Value>> {
        let compiler = self.expression_compiler(doc_classes);
        let mut body = Map::new();

        if let Some(q) = query.filtered_query() {
            body.insert("query".to_string(), compiler.compile(&q)?);
        }
        if let Some(post_filter) = query.post_filter_expr() {
            body.insert("post_filter".to_string(), compiler.compile(&post_filter)?);
        }
        if !query.sorting().is_empty() {
            body.insert("sort".to_string(), compiler.compile_list(query.sorting())?);
        }
        if let Some(source) = query.get_source() {
            body.insert(
                "_source".to_string(),
                compiler.compile(&Expr::Source(source.clone()))?,
            );
        }
        match query.get_stored_fields() {
            Some(StoredFields::All) => {
                body.insert(self.features().stored_fields_param.to_string(), Value::from("*"));
            }
            Some(StoredFields::Fields(fields)) => {
                body.insert(
                    self.features().stored_fields_param.to_string(),
                    compiler.compile_list(fields)?,
                );
            }
            Some(StoredFields::Disabled) | None => {}
        }
        if !query.aggregations().is_empty() {
            body.insert(
                "aggregations".to_string(),
                Value::Object(compile_aggregations(&compiler, query.aggregations())?),
            );
        }
        if let Some(limit) = query.get_limit() {
            body.insert("size".to_string(), Value::from(limit));
        }
        if let Some(offset) = query.get_offset() {
            body.insert("from".to_string(), Value::from(offset));
        }
        if let Some(min_score) = query.get_min_score() {
            body.insert("min_score".to_string(), Value::from(min_score));
        }
        if !query.rescores().is_empty() {
            let rescores = query
                .rescores()
                .iter()
                .map(|r| compiler.compile(&Expr::Rescore(r.clone())))
                .collect::<Result<Vec<_>>>()?;
            body.insert("rescore".to_string(), Value::Array(rescores));
        }
        if !query.get_suggest().is_empty() {
            body.insert(
                "suggest".to_string(),
                Value::Object(compiler.compile_params(query.get_suggest())?),
            );
        }
        if let Some(highlight) = query.get_highlight() {
            body.insert(
                "highlight".to_string(),
                compiler.compile(&Expr::Highlight(highlight.clone()))?,
            );
        }
        if !query.script_fields().is_empty() {
            body.insert(
                "script_fields".to_string(),
                Value::Object(compiler.compile_params(query.script_fields())?),
            );
        }

        let mut docvalue_fields = match compiler.compile_list(query.docvalue_fields())? {
            Value::Array(fields) => fields,
            other => vec![other],
        };
        for field in doc_types::docvalue_fields(self.features(), doc_classes) {
            let field = Value::from(field);
            if !docvalue_fields.contains(&field) {
                docvalue_fields.push(field);
            }
        }
        if !docvalue_fields.is_empty() {
            body.insert("docvalue_fields".to_string(), Value::Array(docvalue_fields));
        }
        Ok(body)
    }

    /// Body of count, exists and delete-by-query
    fn scalar_body(&self, query: &SearchQuery, doc_classes: &[Arc<Schema>]) -> Result<Map<String, Value>> {
        let compiler = self.expression_compiler(doc_classes);
        let mut body = Map::new();
        if let Some(q) = query.filtered_query() {
            body.insert("query".to_string(), compiler.compile(&q)?);
        }
        if let Some(post_filter) = query.post_filter_expr() {
            body.insert("post_filter".to_string(), compiler.compile(&post_filter)?);
        }
        if let Some(min_score) = query.get_min_score() {
            body.insert("min_score".to_string(), Value::from(min_score));
        }
        Ok(body)
    }
}

fn compile_aggregations(
    compiler: &ExprCompiler<'_>,
    aggregations: &IndexMap<String, Agg>,
) -> Result<Map<String, Value>> {
    let mut compiled = Map::new();
    for (name, agg) in aggregations {
        compiled.insert(name.clone(), compiler.compile_agg(agg)?);
    }
    Ok(compiled)
}
