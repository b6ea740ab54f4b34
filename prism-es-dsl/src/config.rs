//! Compiler configuration
//!
//! Example `prism-es.toml`:
//!
//! ```toml
//! version = "6.8.1"
//! default_doc_type = "_doc"
//! validation = "strict"
//! ```

use crate::capability::EsVersion;
use crate::error::DslError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Shared physical mapping type used by document-type emulation
pub const DEFAULT_DOC_TYPE: &str = "_doc";

/// How document sources are validated before serialization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Values pass through without checks
    #[default]
    Off,
    /// Fail on the first missing or invalid field
    Strict,
    /// Collect every missing or invalid field before failing
    Full,
}

impl ValidationMode {
    pub fn is_enabled(self) -> bool {
        !matches!(self, ValidationMode::Off)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DslConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_doc_type")]
    pub default_doc_type: String,
    #[serde(default)]
    pub validation: ValidationMode,
}

fn default_version() -> String {
    "6.0.0".to_string()
}

fn default_doc_type() -> String {
    DEFAULT_DOC_TYPE.to_string()
}

impl Default for DslConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            default_doc_type: default_doc_type(),
            validation: ValidationMode::default(),
        }
    }
}

impl DslConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: DslConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn es_version(&self) -> Result<EsVersion> {
        self.version.parse()
    }

    fn validate(&self) -> Result<()> {
        self.es_version()?;
        if self.default_doc_type.trim().is_empty() {
            return Err(DslError::Config(
                "default_doc_type must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = DslConfig::default();
        assert_eq!(config.version, "6.0.0");
        assert_eq!(config.default_doc_type, "_doc");
        assert_eq!(config.validation, ValidationMode::Off);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = DslConfig::from_toml_str("version = \"5.6\"\nvalidation = \"full\"").unwrap();
        assert_eq!(config.es_version().unwrap(), EsVersion::new(5, 6, 0));
        assert_eq!(config.default_doc_type, "_doc");
        assert_eq!(config.validation, ValidationMode::Full);
    }

    #[test]
    fn test_from_toml_rejects_bad_version() {
        let err = DslConfig::from_toml_str("version = \"latest\"").unwrap_err();
        assert!(matches!(err, DslError::InvalidVersion(_)));
    }

    #[test]
    fn test_from_toml_rejects_empty_doc_type() {
        let err = DslConfig::from_toml_str("default_doc_type = \" \"").unwrap_err();
        assert!(matches!(err, DslError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "version = \"2.4.6\"\ndefault_doc_type = \"doc\"").unwrap();

        let config = DslConfig::load(file.path()).unwrap();
        assert_eq!(config.es_version().unwrap().major, 2);
        assert_eq!(config.default_doc_type, "doc");
    }
}
