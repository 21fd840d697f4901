//! Checkpoint backend selected by the configuration.

use crate::config::{CheckpointBackend, GleanerConfig};
use crate::error::Result;
use gleaner_domain::traits::CheckpointStore;
use gleaner_domain::{Checkpoint, CheckpointKey, CursorKind};
use gleaner_store::{catalogue, FileCheckpointStore, SqliteStore, StoreError};
use std::fs;
use std::path::Path;

/// Either checkpoint store, behind one type.
pub enum Checkpoints {
    /// Scalar files under a directory
    File(FileCheckpointStore),
    /// The `checkpoints` table of a SQLite database
    Sqlite(SqliteStore),
}

impl Checkpoints {
    /// Open the configured backend.
    ///
    /// The SQLite backend opens its own connection to the entity store file.
    pub fn open(config: &GleanerConfig) -> Result<Self> {
        match config.checkpoints.backend {
            CheckpointBackend::File => Ok(Checkpoints::File(FileCheckpointStore::new(&config.checkpoints.dir))),
            CheckpointBackend::Sqlite => Ok(Checkpoints::Sqlite(open_store(&config.store.path)?)),
        }
    }
}

/// Open the entity store, creating its parent directory.
pub fn open_store(path: &Path) -> Result<SqliteStore> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(SqliteStore::new(path, catalogue::default_catalogue())?)
}

impl CheckpointStore for Checkpoints {
    type Error = StoreError;

    fn load(&self, key: &CheckpointKey, kind: CursorKind) -> std::result::Result<Option<Checkpoint>, StoreError> {
        match self {
            Checkpoints::File(store) => store.load(key, kind),
            Checkpoints::Sqlite(store) => store.load(key, kind),
        }
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> std::result::Result<(), StoreError> {
        match self {
            Checkpoints::File(store) => store.save(checkpoint),
            Checkpoints::Sqlite(store) => store.save(checkpoint),
        }
    }

    fn list(&self) -> std::result::Result<Vec<(CheckpointKey, String)>, StoreError> {
        match self {
            Checkpoints::File(store) => store.list(),
            Checkpoints::Sqlite(store) => store.list(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner_domain::CursorValue;
    use tempfile::TempDir;

    fn config(dir: &TempDir, backend: CheckpointBackend) -> GleanerConfig {
        let mut config = GleanerConfig::default();
        config.checkpoints.backend = backend;
        config.rebase(dir.path());
        config
    }

    #[test]
    fn test_both_backends_round_trip() {
        for backend in [CheckpointBackend::File, CheckpointBackend::Sqlite] {
            let dir = TempDir::new().unwrap();
            let mut checkpoints = Checkpoints::open(&config(&dir, backend)).unwrap();
            let key = CheckpointKey::new("ror", "default");
            checkpoints
                .save(&Checkpoint::new(key.clone(), CursorValue::Offset(40)))
                .unwrap();

            let loaded = checkpoints.load(&key, CursorKind::Offset).unwrap().unwrap();
            assert_eq!(loaded.cursor, CursorValue::Offset(40));
            assert_eq!(checkpoints.list().unwrap(), vec![(key, "40".to_string())]);
        }
    }

    #[test]
    fn test_file_backend_writes_under_dir() {
        let dir = TempDir::new().unwrap();
        let mut checkpoints = Checkpoints::open(&config(&dir, CheckpointBackend::File)).unwrap();
        checkpoints
            .save(&Checkpoint::new(CheckpointKey::new("ror", "default"), CursorValue::Offset(1)))
            .unwrap();
        assert!(dir.path().join("checkpoints/ror/default.checkpoint").exists());
        assert!(!dir.path().join("gleaner.db").exists());
    }
}
