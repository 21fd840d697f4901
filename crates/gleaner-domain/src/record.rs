//! Raw records and extraction units

use crate::checkpoint::CursorValue;
use serde::{Deserialize, Serialize};

/// A record as delivered by a provider, before any mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Provider-side identifier (may be empty when the provider has none)
    #[serde(default)]
    pub id: String,
    /// Provider payload
    pub payload: serde_json::Value,
}

impl RawRecord {
    /// Create a raw record
    pub fn new(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

/// The result of one connector call
///
/// Transient: never persisted as such. The driver persists `items` to the raw
/// sink and `next_cursor` to the checkpoint store.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionUnit {
    /// Records fetched in this unit
    pub items: Vec<RawRecord>,
    /// Cursor to resume from after this unit
    pub next_cursor: CursorValue,
    /// Whether the source has nothing more to give for now
    pub is_complete: bool,
}

impl ExtractionUnit {
    /// Create a unit
    pub fn new(items: Vec<RawRecord>, next_cursor: CursorValue, is_complete: bool) -> Self {
        Self {
            items,
            next_cursor,
            is_complete,
        }
    }
}
