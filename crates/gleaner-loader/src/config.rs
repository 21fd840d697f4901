//! Configuration for the load stage

use crate::mapper::MapperConfig;
use gleaner_harvest::mtime::DEFAULT_EPSILON_SECS;
use serde::{Deserialize, Serialize};

/// Load stage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Keep going after a failed document instead of aborting (enrichment mode)
    #[serde(default)]
    pub skip_failed_documents: bool,

    /// Tolerance for coarse file timestamps, in seconds
    #[serde(default = "default_epsilon")]
    pub mtime_epsilon_secs: i64,

    /// Glob pattern of documents under the raw directory
    #[serde(default = "default_pattern")]
    pub pattern: String,

    /// Query id of the load checkpoint (the source id is the first half)
    #[serde(default = "default_checkpoint_query")]
    pub checkpoint_query: String,

    /// Record mapping
    #[serde(default)]
    pub mapper: MapperConfig,
}

fn default_epsilon() -> i64 {
    DEFAULT_EPSILON_SECS
}

fn default_pattern() -> String {
    "**/*.json".to_string()
}

fn default_checkpoint_query() -> String {
    "load".to_string()
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            skip_failed_documents: false,
            mtime_epsilon_secs: default_epsilon(),
            pattern: default_pattern(),
            checkpoint_query: default_checkpoint_query(),
            mapper: MapperConfig::default(),
        }
    }
}

impl LoaderConfig {
    /// Enrichment mode: failed documents are counted and skipped
    pub fn enrichment() -> Self {
        Self {
            skip_failed_documents: true,
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.mtime_epsilon_secs < 0 {
            return Err("mtime_epsilon_secs must not be negative".to_string());
        }
        if self.pattern.trim().is_empty() {
            return Err("pattern must not be empty".to_string());
        }
        if self.checkpoint_query.trim().is_empty() {
            return Err("checkpoint_query must not be empty".to_string());
        }
        self.mapper.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::default();
        assert!(!config.skip_failed_documents);
        assert_eq!(config.mtime_epsilon_secs, 1);
        assert_eq!(config.mapper.records_pointer, "/records");
        assert!(config.validate().is_ok());
        assert!(LoaderConfig::enrichment().skip_failed_documents);
    }

    #[test]
    fn test_negative_epsilon_rejected() {
        let config = LoaderConfig {
            mtime_epsilon_secs: -1,
            ..LoaderConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parses_from_toml() {
        let config: LoaderConfig = toml::from_str(
            r#"
            skip_failed_documents = true

            [mapper]
            payload_pointer = ""

            [[mapper.nodes]]
            alias = "org"
            entity_type = "institution"
            key = { ror_id = "/id" }
            "#,
        )
        .unwrap();
        assert!(config.skip_failed_documents);
        assert_eq!(config.pattern, "**/*.json");
        assert_eq!(config.mapper.payload_pointer, "");
        assert_eq!(config.mapper.nodes.len(), 1);
        assert!(config.validate().is_ok());
    }
}
