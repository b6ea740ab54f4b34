//! Endpoint compilers
//!
//! One compiled endpoint per protocol operation. Each prepares the call
//! parameters, compiles the body and parses the raw response into a
//! typed result. Sending the request is left to a [`Transport`].

pub mod bulk;
pub mod get;
pub mod mapping;
pub mod msearch;
pub mod search;

pub use bulk::{Action, ActionDoc, ActionKind, CompiledBulk};
pub use get::{CompiledDelete, CompiledGet, CompiledMultiGet, DocTarget};
pub use mapping::{parse_mapping, CompiledPutMapping};
pub use msearch::CompiledMultiSearch;
pub use search::{
    CompiledCountQuery, CompiledDeleteByQuery, CompiledExistsQuery, CompiledScroll,
    CompiledSearchQuery,
};

use crate::Result;
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// Query-string level parameters of a call
pub type CallParams = Map<String, Value>;

/// Client operation an endpoint is sent with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiMethod {
    Search,
    Scroll,
    Count,
    Exists,
    DeleteByQuery,
    MultiSearch,
    Get,
    MultiGet,
    Delete,
    Bulk,
    PutMapping,
}

impl ApiMethod {
    pub fn name(self) -> &'static str {
        match self {
            ApiMethod::Search => "search",
            ApiMethod::Scroll => "scroll",
            ApiMethod::Count => "count",
            ApiMethod::Exists => "exists",
            ApiMethod::DeleteByQuery => "delete_by_query",
            ApiMethod::MultiSearch => "msearch",
            ApiMethod::Get => "get",
            ApiMethod::MultiGet => "mget",
            ApiMethod::Delete => "delete",
            ApiMethod::Bulk => "bulk",
            ApiMethod::PutMapping => "indices.put_mapping",
        }
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A compiled request paired with the parser for its response
pub trait CompiledEndpoint {
    type Output;

    fn api_method(&self) -> ApiMethod;

    fn params(&self) -> &CallParams;

    /// `None` for operations without a body (get, scroll ...)
    fn body(&self) -> Option<&Value>;

    fn process_result(&self, raw: Value) -> Result<Self::Output>;
}

/// Sends compiled requests; implemented outside this crate by an HTTP
/// client
pub trait Transport {
    fn invoke(&self, method: ApiMethod, params: &CallParams, body: Option<&Value>) -> Result<Value>;
}

/// Send a compiled endpoint and parse its response
pub fn execute<E: CompiledEndpoint>(transport: &dyn Transport, endpoint: &E) -> Result<E::Output> {
    let method = endpoint.api_method();
    debug!(api = method.name(), "Invoking endpoint");
    let raw = transport.invoke(method, endpoint.params(), endpoint.body())?;
    endpoint.process_result(raw)
}
