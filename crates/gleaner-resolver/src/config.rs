//! Resolver configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for entity resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Enable fuzzy matching on display text
    #[serde(default = "default_true")]
    pub enable_fuzzy: bool,

    /// Allowed edit distance as a fraction of the search text length
    /// Also bounds the normalized length difference of candidates
    #[serde(default = "default_fuzzy_tolerance")]
    pub fuzzy_tolerance: f64,

    /// Trigram similarity a candidate must strictly exceed (0.0-1.0)
    #[serde(default = "default_trigram_threshold")]
    pub trigram_threshold: f64,

    /// Minimum token length for the shared-token pre-filter
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,

    /// Conflict samples kept per (entity type, field)
    #[serde(default = "default_max_conflict_samples")]
    pub max_conflict_samples: usize,

    /// Natural keys callers will use, per entity type
    ///
    /// Each key must equal a unique constraint of the store schema. Types
    /// left out accept any of their declared unique constraints.
    #[serde(default)]
    pub natural_keys: BTreeMap<String, Vec<Vec<String>>>,
}

fn default_true() -> bool {
    true
}

fn default_fuzzy_tolerance() -> f64 {
    0.15
}

fn default_trigram_threshold() -> f64 {
    0.25
}

fn default_min_token_len() -> usize {
    4
}

fn default_max_conflict_samples() -> usize {
    10
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            enable_fuzzy: true,
            fuzzy_tolerance: default_fuzzy_tolerance(),
            trigram_threshold: default_trigram_threshold(),
            min_token_len: default_min_token_len(),
            max_conflict_samples: default_max_conflict_samples(),
            natural_keys: BTreeMap::new(),
        }
    }
}

impl ResolverConfig {
    /// Strict matching: fewer fuzzy merges, more new rows
    pub fn strict() -> Self {
        Self {
            fuzzy_tolerance: 0.10,
            trigram_threshold: 0.40,
            ..Self::default()
        }
    }

    /// Lenient matching: more fuzzy merges
    pub fn lenient() -> Self {
        Self {
            fuzzy_tolerance: 0.20,
            trigram_threshold: 0.20,
            ..Self::default()
        }
    }

    /// Exact-key resolution only
    pub fn exact_only() -> Self {
        Self {
            enable_fuzzy: false,
            ..Self::default()
        }
    }

    /// Declare a natural key for an entity type
    pub fn with_natural_key<I, S>(mut self, entity_type: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.natural_keys
            .entry(entity_type.into())
            .or_default()
            .push(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..1.0).contains(&self.fuzzy_tolerance) {
            return Err("fuzzy_tolerance must be in [0.0, 1.0)".to_string());
        }
        if !(0.0..1.0).contains(&self.trigram_threshold) {
            return Err("trigram_threshold must be in [0.0, 1.0)".to_string());
        }
        if self.min_token_len == 0 {
            return Err("min_token_len must be greater than 0".to_string());
        }
        for (entity_type, keys) in &self.natural_keys {
            if keys.iter().any(|k| k.is_empty()) {
                return Err(format!("empty natural key declared for '{}'", entity_type));
            }
        }
        Ok(())
    }
}
