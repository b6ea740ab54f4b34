//! Protocol capability records
//!
//! Each Elasticsearch major version is described by an immutable
//! [`Features`] record. The compiler consults it to choose between legacy
//! and canonical query shapes and to switch on document-type emulation.

use crate::error::DslError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version-dependent compiler switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    /// `and`/`or`/`not` compile verbatim instead of being rewritten to `bool`
    pub supports_old_boolean_queries: bool,
    /// `missing` compiles verbatim instead of `bool.must_not(exists)`
    pub supports_missing_query: bool,
    pub supports_parent_id_query: bool,
    /// Filtered queries compile to `bool{must, filter}` instead of `filtered`
    pub supports_bool_filter: bool,
    pub supports_search_exists_api: bool,
    /// When false, logical document types are emulated with a join field
    pub supports_mapping_types: bool,
    /// Wire key for explicit stored field selection
    pub stored_fields_param: String,
}

impl Features {
    pub fn es_1() -> Self {
        Self {
            supports_old_boolean_queries: true,
            supports_missing_query: true,
            supports_parent_id_query: false,
            supports_bool_filter: false,
            supports_search_exists_api: true,
            supports_mapping_types: true,
            stored_fields_param: "fields".to_string(),
        }
    }

    pub fn es_2() -> Self {
        Self {
            supports_old_boolean_queries: false,
            supports_bool_filter: true,
            ..Self::es_1()
        }
    }

    pub fn es_5() -> Self {
        Self {
            supports_old_boolean_queries: false,
            supports_missing_query: false,
            supports_parent_id_query: true,
            supports_bool_filter: true,
            supports_search_exists_api: false,
            supports_mapping_types: true,
            stored_fields_param: "stored_fields".to_string(),
        }
    }

    pub fn es_6() -> Self {
        Self {
            supports_mapping_types: false,
            ..Self::es_5()
        }
    }

    /// Select the record for a protocol version
    pub fn for_version(version: &EsVersion) -> Self {
        match version.major {
            0 | 1 => Self::es_1(),
            2 => Self::es_2(),
            3..=5 => Self::es_5(),
            _ => Self::es_6(),
        }
    }
}

impl Default for Features {
    fn default() -> Self {
        Self::es_6()
    }
}

/// Elasticsearch protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EsVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl EsVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for EsVersion {
    type Err = DslError;

    /// Parses `"6"`, `"6.8"` or `"6.8.1"`; a pre-release suffix such as
    /// `"7.0.0-beta1"` is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let core = s.trim().split('-').next().unwrap_or_default();
        if core.is_empty() {
            return Err(DslError::InvalidVersion(s.to_string()));
        }

        let mut parts = [0u32; 3];
        for (i, part) in core.split('.').enumerate() {
            if i >= parts.len() {
                return Err(DslError::InvalidVersion(s.to_string()));
            }
            parts[i] = part
                .parse()
                .map_err(|_| DslError::InvalidVersion(s.to_string()))?;
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for EsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
