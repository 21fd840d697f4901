//! Trait definitions for external interactions
//!
//! These traits define the boundaries between domain logic and infrastructure.
//! Infrastructure implementations live in other crates.

use crate::checkpoint::{Checkpoint, CheckpointKey, CursorKind};
use crate::entity::{FieldMap, RowId, StoredEntity};
use crate::schema::EntitySchema;

/// Durable storage for extraction checkpoints
///
/// Implemented by the infrastructure layer (gleaner-store)
pub trait CheckpointStore {
    /// Error type for checkpoint operations
    type Error;

    /// Load the checkpoint for a key, parsing it as the given kind
    fn load(&self, key: &CheckpointKey, kind: CursorKind) -> Result<Option<Checkpoint>, Self::Error>;

    /// Replace the checkpoint for its key atomically
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<(), Self::Error>;

    /// List every stored key with its raw scalar value
    fn list(&self) -> Result<Vec<(CheckpointKey, String)>, Self::Error>;
}

/// Outcome of an insert against the store's unique constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Row inserted with the given id
    Inserted(RowId),
    /// A unique constraint rejected the row
    DuplicateKey,
}

/// A fuzzy-match candidate returned by the store's length pre-filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzyCandidate {
    /// Store row id
    pub row_id: RowId,
    /// Raw display value
    pub display: String,
}

/// A relationship row between two entities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Entity type of the source row
    pub from_type: String,
    /// Source row id
    pub from_id: RowId,
    /// Relationship name
    pub relation: String,
    /// Entity type of the target row
    pub to_type: String,
    /// Target row id
    pub to_id: RowId,
}

/// Relational storage for resolved entities
///
/// Implemented by the infrastructure layer (gleaner-store)
pub trait EntityStore {
    /// Error type for store operations
    type Error;

    /// Schema for an entity type, if declared
    fn schema(&self, entity_type: &str) -> Option<&EntitySchema>;

    /// Find a row whose fields equal every entry of `key`
    fn find_by_key(&self, entity_type: &str, key: &FieldMap) -> Result<Option<StoredEntity>, Self::Error>;

    /// Get a row by id
    fn get(&self, entity_type: &str, row_id: RowId) -> Result<Option<StoredEntity>, Self::Error>;

    /// Rows whose normalized display length lies in `[min_len, max_len]`, ordered by row id
    fn fuzzy_candidates(
        &self,
        entity_type: &str,
        min_len: usize,
        max_len: usize,
    ) -> Result<Vec<FuzzyCandidate>, Self::Error>;

    /// Insert a new row; the id is assigned immediately
    fn insert(&mut self, entity_type: &str, fields: &FieldMap) -> Result<InsertOutcome, Self::Error>;

    /// Set a single field on an existing row
    fn set_field(&mut self, entity_type: &str, row_id: RowId, field: &str, value: &str) -> Result<(), Self::Error>;

    /// Insert a relationship row, returning false when it already existed
    fn link(&mut self, relation: &Relation) -> Result<bool, Self::Error>;

    /// Whether a relationship row exists
    fn has_link(&self, relation: &Relation) -> Result<bool, Self::Error>;

    /// Open a write transaction
    fn begin(&mut self) -> Result<(), Self::Error>;

    /// Commit the open transaction
    fn commit(&mut self) -> Result<(), Self::Error>;

    /// Roll back the open transaction
    fn rollback(&mut self) -> Result<(), Self::Error>;
}
