//! Document sources

use crate::error::LoaderError;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// A document and its modification time (epoch seconds)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEntry {
    /// Document path
    pub path: PathBuf,
    /// Modification time
    pub mtime: i64,
}

/// Where raw documents come from
pub trait DocumentSource {
    /// Every document, in a stable order
    fn list(&self) -> Result<Vec<DocumentEntry>, LoaderError>;

    /// Read one document as JSON
    fn read(&self, entry: &DocumentEntry) -> Result<Value, LoaderError>;
}

/// JSON files matching a glob pattern under a root directory
#[derive(Debug, Clone)]
pub struct DirectoryDocuments {
    root: PathBuf,
    pattern: String,
}

impl DirectoryDocuments {
    /// Every `**/*.json` file under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_pattern(root, "**/*.json")
    }

    /// Files under `root` matching `pattern`
    pub fn with_pattern(root: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            pattern: pattern.into(),
        }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DocumentSource for DirectoryDocuments {
    fn list(&self) -> Result<Vec<DocumentEntry>, LoaderError> {
        let pattern = self.root.join(&self.pattern);
        let pattern = pattern
            .to_str()
            .ok_or_else(|| LoaderError::Config(format!("Non UTF-8 path: {}", self.root.display())))?;
        let paths = glob::glob(pattern).map_err(|e| LoaderError::Config(e.to_string()))?;

        let mut entries = Vec::new();
        for path in paths {
            let path = path.map_err(|e| LoaderError::Io(e.into_error()))?;
            let metadata = fs::metadata(&path)?;
            if !metadata.is_file() {
                continue;
            }
            let mtime = DateTime::<Utc>::from(metadata.modified()?).timestamp();
            entries.push(DocumentEntry { path, mtime });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn read(&self, entry: &DocumentEntry) -> Result<Value, LoaderError> {
        let text = fs::read_to_string(&entry.path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Documents held in memory, for tests and replays
#[derive(Debug, Clone, Default)]
pub struct StaticDocuments {
    documents: Vec<(DocumentEntry, Value)>,
}

impl StaticDocuments {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document
    pub fn with(mut self, path: impl Into<PathBuf>, mtime: i64, document: Value) -> Self {
        self.documents.push((
            DocumentEntry {
                path: path.into(),
                mtime,
            },
            document,
        ));
        self
    }
}

impl DocumentSource for StaticDocuments {
    fn list(&self) -> Result<Vec<DocumentEntry>, LoaderError> {
        Ok(self.documents.iter().map(|(entry, _)| entry.clone()).collect())
    }

    fn read(&self, entry: &DocumentEntry) -> Result<Value, LoaderError> {
        self.documents
            .iter()
            .find(|(e, _)| e.path == entry.path)
            .map(|(_, document)| document.clone())
            .ok_or_else(|| LoaderError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, entry.path.display().to_string())))
    }
}
