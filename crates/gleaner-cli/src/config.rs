//! Configuration file for the CLI.
//!
//! ```toml
//! [store]
//! path = "gleaner.db"
//!
//! [checkpoints]
//! backend = "file"
//! dir = "checkpoints"
//!
//! [raw]
//! dir = "raw"
//!
//! [[sources]]
//! id = "openalex-works"
//! protocol = "cursor"
//! url = "https://api.openalex.org/works"
//! items_pointer = "/results"
//! next_pointer = "/meta/next_cursor"
//! ```
//!
//! Relative paths are taken relative to the directory of the file.

use crate::error::{CliError, Result};
use gleaner_harvest::SourceConfig;
use gleaner_loader::LoaderConfig;
use gleaner_resolver::ResolverConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

const IN_MEMORY: &str = ":memory:";

/// CLI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GleanerConfig {
    /// Entity store
    #[serde(default)]
    pub store: StoreSettings,

    /// Checkpoint storage
    #[serde(default)]
    pub checkpoints: CheckpointSettings,

    /// Raw document directory
    #[serde(default)]
    pub raw: RawSettings,

    /// Output settings
    #[serde(default)]
    pub output: OutputSettings,

    /// Entity resolution
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Load stage and record mapping
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Configured sources
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Entity store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// SQLite database file
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

/// Where checkpoints live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    /// One scalar file per key under `dir`
    File,
    /// The `checkpoints` table of the entity store
    Sqlite,
}

/// Checkpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSettings {
    /// Storage backend
    #[serde(default = "default_backend")]
    pub backend: CheckpointBackend,

    /// Directory of the file backend
    #[serde(default = "default_checkpoint_dir")]
    pub dir: PathBuf,
}

/// Raw document settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSettings {
    /// Directory the harvest writes to and the load reads from
    #[serde(default = "default_raw_dir")]
    pub dir: PathBuf,
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,

    /// Default output format
    #[serde(default = "default_format")]
    pub format: OutputFormat,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format
    Table,
    /// JSON format
    Json,
    /// Quiet (minimal) format
    Quiet,
}

impl GleanerConfig {
    /// Load and validate the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CliError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        let contents = fs::read_to_string(path)?;
        let mut config = Self::from_toml(&contents)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    /// Parse and validate a configuration document.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: GleanerConfig = toml::from_str(contents)?;
        config.validate().map_err(CliError::Config)?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.resolver.validate().map_err(|e| format!("[resolver] {}", e))?;
        self.loader.validate().map_err(|e| format!("[loader] {}", e))?;

        let mut ids = HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !ids.insert((source.id.as_str(), source.query_id.as_str())) {
                return Err(format!(
                    "source '{}' with query '{}' is configured twice",
                    source.id, source.query_id
                ));
            }
        }
        Ok(())
    }

    /// Find a source by id, and by query id when the source has several.
    pub fn source(&self, id: &str, query: Option<&str>) -> Result<&SourceConfig> {
        let mut matches = self
            .sources
            .iter()
            .filter(|s| s.id == id && query.map_or(true, |q| s.query_id == q));
        match (matches.next(), matches.next()) {
            (Some(source), None) => Ok(source),
            (Some(_), Some(_)) => Err(CliError::InvalidInput(format!(
                "Source '{}' has several queries configured; pick one with --query",
                id
            ))),
            (None, _) => {
                let known: Vec<String> = self
                    .sources
                    .iter()
                    .map(|s| format!("{}/{}", s.id, s.query_id))
                    .collect();
                Err(CliError::InvalidInput(format!(
                    "Unknown source '{}' (configured: {})",
                    id,
                    if known.is_empty() { "none".to_string() } else { known.join(", ") }
                )))
            }
        }
    }

    /// Resolve relative paths against `base`.
    pub fn rebase(&mut self, base: &Path) {
        if self.store.path != Path::new(IN_MEMORY) {
            self.store.path = join(base, &self.store.path);
        }
        self.checkpoints.dir = join(base, &self.checkpoints.dir);
        self.raw.dir = join(base, &self.raw.dir);
    }
}

fn join(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            dir: default_checkpoint_dir(),
        }
    }
}

impl Default for RawSettings {
    fn default() -> Self {
        Self {
            dir: default_raw_dir(),
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            color: true,
            format: OutputFormat::Table,
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("gleaner.db")
}

fn default_backend() -> CheckpointBackend {
    CheckpointBackend::File
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

fn default_raw_dir() -> PathBuf {
    PathBuf::from("raw")
}

fn default_true() -> bool {
    true
}

fn default_format() -> OutputFormat {
    OutputFormat::Table
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner_harvest::ProtocolConfig;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
        [store]
        path = "data/gleaner.db"

        [checkpoints]
        backend = "sqlite"

        [output]
        format = "json"

        [resolver]
        fuzzy_tolerance = 0.1

        [loader]
        skip_failed_documents = true

        [[loader.mapper.nodes]]
        alias = "org"
        entity_type = "institution"
        key = { ror_id = "/id" }
        search_text = "/display_name"

        [[sources]]
        id = "ror"
        protocol = "offset"
        url = "https://api.ror.org/organizations"
        items_pointer = "/items"
        page_size = 20

        [[sources]]
        id = "openalex"
        protocol = "cursor"
        url = "https://api.openalex.org/works"
        items_pointer = "/results"
        next_pointer = "/meta/next_cursor"

        [sources.retry]
        max_retries = 5
    "#;

    #[test]
    fn test_default_config() {
        let config = GleanerConfig::default();
        assert_eq!(config.store.path, PathBuf::from("gleaner.db"));
        assert_eq!(config.checkpoints.backend, CheckpointBackend::File);
        assert!(config.output.color);
        assert!(config.sources.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parses_every_section() {
        let config = GleanerConfig::from_toml(CONFIG).unwrap();
        assert_eq!(config.checkpoints.backend, CheckpointBackend::Sqlite);
        assert_eq!(config.checkpoints.dir, PathBuf::from("checkpoints"));
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.resolver.fuzzy_tolerance, 0.1);
        assert!(config.loader.skip_failed_documents);
        assert_eq!(config.loader.mapper.nodes.len(), 1);
        assert_eq!(config.sources.len(), 2);

        let openalex = config.source("openalex", None).unwrap();
        assert_eq!(openalex.retry.max_retries, 5);
        assert!(matches!(openalex.protocol, ProtocolConfig::Cursor(_)));
    }

    #[test]
    fn test_unknown_source_lists_configured_ones() {
        let config = GleanerConfig::from_toml(CONFIG).unwrap();
        let err = config.source("crossref", None).unwrap_err().to_string();
        assert!(err.contains("ror/default, openalex/default"));
    }

    #[test]
    fn test_source_with_several_queries_needs_a_query() {
        let second = format!(
            "{}\n[[sources]]\nid = \"ror\"\nquery_id = \"v2\"\nprotocol = \"offset\"\nurl = \"https://api.ror.org/v2\"\n",
            CONFIG
        );
        let config = GleanerConfig::from_toml(&second).unwrap();
        assert!(matches!(config.source("ror", None), Err(CliError::InvalidInput(_))));
        assert_eq!(config.source("ror", Some("v2")).unwrap().query_id, "v2");
    }

    #[test]
    fn test_duplicate_source_rejected() {
        let doubled = format!(
            "{}\n[[sources]]\nid = \"ror\"\nprotocol = \"offset\"\nurl = \"https://api.ror.org/v2\"\nitems_pointer = \"/items\"\n",
            CONFIG
        );
        assert!(matches!(GleanerConfig::from_toml(&doubled), Err(CliError::Config(_))));
    }

    #[test]
    fn test_load_rebases_relative_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gleaner.toml");
        fs::write(&path, CONFIG).unwrap();

        let config = GleanerConfig::load(&path).unwrap();
        assert_eq!(config.store.path, dir.path().join("data/gleaner.db"));
        assert_eq!(config.raw.dir, dir.path().join("raw"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = GleanerConfig::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(CliError::Config(_))));
    }
}
