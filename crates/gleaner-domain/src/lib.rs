//! Gleaner Domain Layer
//!
//! Core value types and trait interfaces for resumable harvesting and entity
//! resolution. Infrastructure (SQLite, HTTP, files) lives in other crates.
//!
//! ## Key Concepts
//!
//! - **Checkpoint**: durable cursor marking how far extraction got for one source
//! - **Extraction unit**: one connector call's worth of raw records plus the next cursor
//! - **Entity reference**: a request to find-or-create a row by natural key or text
//! - **Conflict**: an incoming value that disagrees with a stored one
//!
//! ## Architecture
//!
//! - Pure data and rules only
//! - Trait definitions for every store interaction
//! - Only value-type dependencies (dates, JSON, errors)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod entity;
pub mod record;
pub mod schema;
pub mod text;
pub mod traits;

// Re-exports for convenience
pub use checkpoint::{Checkpoint, CheckpointError, CheckpointKey, CursorKind, CursorValue, Transition};
pub use entity::{ConflictRecord, EntityReference, FieldMap, Resolution, ResolvedEntity, RowId, StoredEntity};
pub use record::{ExtractionUnit, RawRecord};
pub use schema::{EntitySchema, ForeignKey};
