//! Elasticsearch query DSL compiler
//!
//! This crate builds Elasticsearch requests from typed expression trees
//! and document schemas, and parses the responses back into typed
//! results. The shape of every request follows the capability record of
//! the target server version, so the same tree can be sent to 1.x, 2.x,
//! 5.x and 6.x clusters.
//!
//! # Pieces
//!
//! - [`schema`] - document schemas with inheritance and dynamic templates
//! - [`expr`] - query, filter, sort, aggregation and score expressions
//! - [`search::SearchQuery`] - everything one search request carries
//! - [`compiler::Compiler`] - expression compiler and endpoint factory
//! - [`endpoints`] - compiled requests paired with their response parsers
//! - [`result`] - search hits, aggregations and per-operation results
//!
//! # Versions without mapping types
//!
//! From 6.x an index holds a single mapping type. Schemas that take part
//! in a parent/child join are then stored under one shared type with a
//! `_doc_type` join field and ids prefixed with the logical type. The
//! compiler applies and undoes this transparently.
//!
//! Sending requests is left to a [`endpoints::Transport`] implementation.

pub mod capability;
pub mod compiler;
pub mod config;
pub mod document;
pub mod endpoints;
pub mod error;
pub mod expr;
pub mod result;
pub mod schema;
pub mod search;
pub mod types;

pub use capability::{EsVersion, Features};
pub use compiler::{Compiler, ExprCompiler};
pub use config::{DslConfig, ValidationMode};
pub use document::Document;
pub use endpoints::{execute, ApiMethod, CallParams, CompiledEndpoint, Transport};
pub use error::DslError;
pub use expr::{Agg, BoolQuery, Expr, Function, Params, Sort};
pub use result::{AggResult, SearchResult};
pub use schema::{DynamicTemplate, Field, Schema, SchemaRegistry};
pub use search::SearchQuery;
pub use types::FieldType;

/// Result type for DSL operations
pub type Result<T> = std::result::Result<T, DslError>;
