//! File-backed checkpoint store
//!
//! Layout: `<root>/<source_id>/<query_id>.checkpoint`, each file holding the
//! cursor as a single scalar. Writes go to a sibling temporary file which is
//! then renamed over the target, so a crash leaves either the old or the new
//! value and never a partial one.

use crate::{validate_identifier, StoreError};
use gleaner_domain::traits::CheckpointStore;
use gleaner_domain::{Checkpoint, CheckpointKey, CursorKind, CursorValue};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const EXTENSION: &str = "checkpoint";

/// Checkpoint store keeping one small file per `(source_id, query_id)`
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    /// Create a store rooted at `root` (created lazily on first save)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file for a key
    pub fn path_for(&self, key: &CheckpointKey) -> Result<PathBuf, StoreError> {
        validate_identifier(&key.source_id)?;
        validate_identifier(&key.query_id)?;
        Ok(self
            .root
            .join(&key.source_id)
            .join(format!("{}.{}", key.query_id, EXTENSION)))
    }
}

impl CheckpointStore for FileCheckpointStore {
    type Error = StoreError;

    fn load(&self, key: &CheckpointKey, kind: CursorKind) -> Result<Option<Checkpoint>, Self::Error> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        let cursor = CursorValue::parse(kind, &raw)?;
        Ok(Some(Checkpoint::new(key.clone(), cursor)))
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> Result<(), Self::Error> {
        let path = self.path_for(&checkpoint.key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension(format!("{}.tmp", EXTENSION));
        fs::write(&tmp, checkpoint.cursor.to_scalar())?;
        fs::rename(&tmp, &path)?;

        debug!("Checkpoint {} saved to {}", checkpoint.key, path.display());
        Ok(())
    }

    fn list(&self) -> Result<Vec<(CheckpointKey, String)>, Self::Error> {
        let pattern = self.root.join("*").join(format!("*.{}", EXTENSION));
        let pattern = pattern
            .to_str()
            .ok_or_else(|| StoreError::InvalidData(format!("Non UTF-8 path: {}", self.root.display())))?;
        let entries = glob::glob(pattern).map_err(|e| StoreError::InvalidData(e.to_string()))?;

        let mut checkpoints = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::Io(e.into_error()))?;
            let source_id = path
                .parent()
                .and_then(Path::file_name)
                .and_then(|s| s.to_str());
            let query_id = path.file_stem().and_then(|s| s.to_str());
            if let (Some(source_id), Some(query_id)) = (source_id, query_id) {
                let value = fs::read_to_string(&path)?.trim().to_string();
                checkpoints.push((CheckpointKey::new(source_id, query_id), value));
            }
        }
        checkpoints.sort();
        Ok(checkpoints)
    }
}
