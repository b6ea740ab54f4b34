//! Multi-search endpoint
//!
//! Sub-searches are compiled independently and interleaved into one
//! header/body sequence. Responses come back in request order.

use super::search::CompiledSearchQuery;
use super::{ApiMethod, CallParams, CompiledEndpoint};
use crate::compiler::Compiler;
use crate::error::DslError;
use crate::result::SearchResult;
use crate::search::SearchQuery;
use crate::Result;
use serde_json::Value;
use tracing::debug;

pub struct CompiledMultiSearch {
    params: CallParams,
    body: Value,
    searches: Vec<CompiledSearchQuery>,
    raise_on_error: bool,
}

impl CompiledMultiSearch {
    pub fn searches(&self) -> &[CompiledSearchQuery] {
        &self.searches
    }
}

impl CompiledEndpoint for CompiledMultiSearch {
    type Output = Vec<SearchResult>;

    fn api_method(&self) -> ApiMethod {
        ApiMethod::MultiSearch
    }

    fn params(&self) -> &CallParams {
        &self.params
    }

    fn body(&self) -> Option<&Value> {
        Some(&self.body)
    }

    /// One result per sub-search. Failed sub-searches carry their error;
    /// with `raise_on_error` all of them are returned as one error.
    fn process_result(&self, raw: Value) -> Result<Vec<SearchResult>> {
        let Some(Value::Array(responses)) = raw.get("responses") else {
            return Err(DslError::InvalidResponse(
                "multi search response has no 'responses'".to_string(),
            ));
        };
        if responses.len() != self.searches.len() {
            return Err(DslError::InvalidResponse(format!(
                "expected {} responses, got {}",
                self.searches.len(),
                responses.len()
            )));
        }

        let mut results = Vec::with_capacity(responses.len());
        let mut errors = Vec::new();
        for (search, response) in self.searches.iter().zip(responses) {
            let result = search.process_result(response.clone())?;
            if let Some(error) = &result.error {
                errors.push(error.clone());
            }
            results.push(result);
        }
        debug!(
            api = "msearch",
            responses = results.len(),
            failed = errors.len(),
            "Parsed multi search response"
        );

        if self.raise_on_error && !errors.is_empty() {
            return Err(DslError::MultiSearch { errors });
        }
        Ok(results)
    }
}

impl Compiler {
    pub fn multi_search(
        &self,
        queries: &[SearchQuery],
        params: CallParams,
        raise_on_error: bool,
    ) -> Result<CompiledMultiSearch> {
        let mut searches = Vec::with_capacity(queries.len());
        let mut body = Vec::with_capacity(queries.len() * 2);
        for query in queries {
            let mut search = self.search_query(query, CallParams::new())?;
            let header = search.params_mut();
            if let Some(doc_type) = header.remove("doc_type") {
                header.insert("type".to_string(), doc_type);
            }
            body.push(Value::Object(search.params().clone()));
            body.push(search.body().cloned().unwrap_or_default());
            searches.push(search);
        }
        debug!(api = "msearch", searches = searches.len(), "Compiled multi search");
        Ok(CompiledMultiSearch {
            params,
            body: Value::Array(body),
            searches,
            raise_on_error,
        })
    }
}
