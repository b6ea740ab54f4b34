//! Error types for the query DSL compiler

use serde_json::Value;

/// Errors raised while compiling requests or parsing responses
#[derive(Debug, thiserror::Error)]
pub enum DslError {
    /// Type or parent information cannot be inferred, a feature is not
    /// supported by the target version, or mappings conflict
    #[error("Compilation error: {0}")]
    Compilation(String),

    /// One message per missing or invalid document field
    #[error("Validation error: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Unknown field '{name}' for document type {}", .doc_type.as_deref().unwrap_or("<untyped>"))]
    UnknownField {
        doc_type: Option<String>,
        name: String,
    },

    /// Batched search failures, one entry per failed sub-request
    #[error("{}", multi_search_message(.errors.len()))]
    MultiSearch { errors: Vec<Value> },

    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(String),
}

fn multi_search_message(count: usize) -> String {
    if count == 1 {
        "1 query was failed".to_string()
    } else {
        format!("{} queries were failed", count)
    }
}

impl DslError {
    pub(crate) fn required(field: &str) -> String {
        format!("'{}' is required", field)
    }

    /// Per-item failures of an aggregate multi-search error
    pub fn errors(&self) -> &[Value] {
        match self {
            Self::MultiSearch { errors } => errors,
            _ => &[],
        }
    }
}
