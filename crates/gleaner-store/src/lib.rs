//! Gleaner Storage Layer
//!
//! Implements the `EntityStore` and `CheckpointStore` traits.
//!
//! # Architecture
//!
//! - SQLite for entity rows, relationship rows and checkpoints
//! - One table per entity type, generated from an [`EntitySchema`] catalogue,
//!   with the declared unique constraints and foreign keys
//! - A normalized-length column per display field backing the fuzzy
//!   pre-filter range query
//! - A plain-file checkpoint store for sources that keep cursors on disk
//!
//! # Examples
//!
//! ```no_run
//! use gleaner_store::{catalogue, SqliteStore};
//!
//! let store = SqliteStore::new(":memory:", catalogue::default_catalogue()).unwrap();
//! // Store is now ready for entity operations
//! ```
//!
//! [`EntitySchema`]: gleaner_domain::EntitySchema

#![warn(missing_docs)]

pub mod catalogue;
mod file_checkpoint;
mod sqlite;

pub use file_checkpoint::FileCheckpointStore;
pub use sqlite::SqliteStore;

use gleaner_domain::CheckpointError;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity type not declared in the catalogue
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    /// Field not declared for the entity type
    #[error("Unknown field '{field}' for entity type '{entity_type}'")]
    UnknownField {
        /// Entity type
        entity_type: String,
        /// Offending field
        field: String,
    },

    /// Invalid data format
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Stored checkpoint could not be used
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}

/// Reject identifiers that cannot be safely quoted as SQL names or path segments
pub(crate) fn validate_identifier(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        Ok(())
    } else {
        Err(StoreError::InvalidData(format!("Invalid identifier: '{}'", name)))
    }
}
