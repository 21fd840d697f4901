//! Checkpoint module - durable per-source extraction cursors
//!
//! A checkpoint marks how far extraction has progressed for one
//! `(source_id, query_id)` pair. It is persisted as a single scalar string
//! and only ever replaced wholesale.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised when parsing or advancing a checkpoint
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CheckpointError {
    /// The persisted scalar could not be parsed as the expected cursor kind
    #[error("Invalid {kind} cursor value '{value}'")]
    InvalidValue {
        /// Expected cursor kind
        kind: CursorKind,
        /// Raw persisted value
        value: String,
    },

    /// A transition would change the cursor kind of a source
    #[error("Cursor kind mismatch: checkpoint is {current}, update is {update}")]
    KindMismatch {
        /// Kind of the stored cursor
        current: CursorKind,
        /// Kind of the proposed cursor
        update: CursorKind,
    },

    /// A transition would move a monotonic cursor backwards
    #[error("Cursor regression from '{from}' to '{to}'")]
    Regression {
        /// Current cursor
        from: String,
        /// Proposed cursor
        to: String,
    },
}

/// The four cursor shapes a source can use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorKind {
    /// Epoch seconds (incremental "modified since" sources)
    Timestamp,
    /// Numeric offset into a result set of known size
    Offset,
    /// Opaque provider token for deep pagination
    CursorToken,
    /// Start date of a fixed-size date window
    DateWindow,
}

impl CursorKind {
    /// Get the kind name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            CursorKind::Timestamp => "timestamp",
            CursorKind::Offset => "offset",
            CursorKind::CursorToken => "cursor_token",
            CursorKind::DateWindow => "date_window",
        }
    }

    /// Parse a kind from its string name
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "timestamp" => Some(CursorKind::Timestamp),
            "offset" => Some(CursorKind::Offset),
            "cursor_token" | "cursor" | "token" => Some(CursorKind::CursorToken),
            "date_window" | "window" => Some(CursorKind::DateWindow),
            _ => None,
        }
    }

    /// Whether cursors of this kind must never decrease
    pub fn is_monotonic(&self) -> bool {
        matches!(self, CursorKind::Timestamp | CursorKind::Offset)
    }
}

impl fmt::Display for CursorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cursor value, tagged with its kind
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CursorValue {
    /// Epoch seconds
    Timestamp(i64),
    /// Result-set offset
    Offset(u64),
    /// Opaque provider token
    Token(String),
    /// Window start date
    Window(NaiveDate),
}

impl CursorValue {
    /// Kind of this cursor
    pub fn kind(&self) -> CursorKind {
        match self {
            CursorValue::Timestamp(_) => CursorKind::Timestamp,
            CursorValue::Offset(_) => CursorKind::Offset,
            CursorValue::Token(_) => CursorKind::CursorToken,
            CursorValue::Window(_) => CursorKind::DateWindow,
        }
    }

    /// Render the cursor as the scalar that gets persisted
    pub fn to_scalar(&self) -> String {
        match self {
            CursorValue::Timestamp(ts) => ts.to_string(),
            CursorValue::Offset(offset) => offset.to_string(),
            CursorValue::Token(token) => token.clone(),
            CursorValue::Window(date) => date.format("%Y-%m-%d").to_string(),
        }
    }

    /// Parse a persisted scalar as a cursor of the given kind
    ///
    /// Window cursors accept either an ISO date or a bare year, which is
    /// read as January 1st of that year.
    ///
    /// # Examples
    ///
    /// ```
    /// use gleaner_domain::{CursorKind, CursorValue};
    /// use chrono::NaiveDate;
    ///
    /// let cursor = CursorValue::parse(CursorKind::DateWindow, "2020").unwrap();
    /// assert_eq!(cursor, CursorValue::Window(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()));
    /// ```
    pub fn parse(kind: CursorKind, raw: &str) -> Result<Self, CheckpointError> {
        let value = raw.trim();
        let invalid = || CheckpointError::InvalidValue {
            kind,
            value: raw.to_string(),
        };

        match kind {
            CursorKind::Timestamp => value
                .parse::<i64>()
                .map(CursorValue::Timestamp)
                .map_err(|_| invalid()),
            CursorKind::Offset => value
                .parse::<u64>()
                .map(CursorValue::Offset)
                .map_err(|_| invalid()),
            CursorKind::CursorToken => {
                if value.is_empty() {
                    Err(invalid())
                } else {
                    Ok(CursorValue::Token(value.to_string()))
                }
            }
            CursorKind::DateWindow => {
                if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
                    return Ok(CursorValue::Window(date));
                }
                value
                    .parse::<i32>()
                    .ok()
                    .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
                    .map(CursorValue::Window)
                    .ok_or_else(invalid)
            }
        }
    }
}

impl fmt::Display for CursorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.to_scalar())
    }
}

/// Deterministic storage key for a checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CheckpointKey {
    /// Provider / source identifier
    pub source_id: String,
    /// Query identifier within the source
    pub query_id: String,
}

impl CheckpointKey {
    /// Create a key
    pub fn new(source_id: impl Into<String>, query_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            query_id: query_id.into(),
        }
    }
}

impl fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source_id, self.query_id)
    }
}

/// How a checkpoint moved from one cursor to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Normal forward progress (or an unchanged cursor)
    Advance,
    /// Deliberate backwards move of a date-window cursor
    Reset,
}

/// A persisted extraction checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// Storage key
    pub key: CheckpointKey,
    /// Current cursor
    pub cursor: CursorValue,
}

impl Checkpoint {
    /// Create a checkpoint
    pub fn new(key: CheckpointKey, cursor: CursorValue) -> Self {
        Self { key, cursor }
    }

    /// Kind of the stored cursor
    pub fn cursor_kind(&self) -> CursorKind {
        self.cursor.kind()
    }

    /// Produce the checkpoint that results from moving to `next`
    ///
    /// Timestamp and offset cursors may never decrease. Tokens are opaque and
    /// may change freely. Date windows may only move backwards as a declared
    /// [`Transition::Reset`].
    pub fn advance(&self, next: CursorValue, transition: Transition) -> Result<Self, CheckpointError> {
        check_transition(&self.cursor, &next, transition)?;
        Ok(Self {
            key: self.key.clone(),
            cursor: next,
        })
    }
}

/// Validate a cursor transition against the checkpoint invariant
pub fn check_transition(
    current: &CursorValue,
    next: &CursorValue,
    transition: Transition,
) -> Result<(), CheckpointError> {
    let regression = || CheckpointError::Regression {
        from: current.to_scalar(),
        to: next.to_scalar(),
    };

    match (current, next) {
        (CursorValue::Timestamp(a), CursorValue::Timestamp(b)) if b < a => Err(regression()),
        (CursorValue::Offset(a), CursorValue::Offset(b)) if b < a => Err(regression()),
        (CursorValue::Window(a), CursorValue::Window(b))
            if b < a && transition != Transition::Reset =>
        {
            Err(regression())
        }
        (a, b) if a.kind() != b.kind() => Err(CheckpointError::KindMismatch {
            current: a.kind(),
            update: b.kind(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn key() -> CheckpointKey {
        CheckpointKey::new("cordis", "projects")
    }

    #[test]
    fn test_scalar_round_trip_per_kind() {
        let cursors = [
            CursorValue::Timestamp(1_700_000_000),
            CursorValue::Offset(200),
            CursorValue::Token("AoJ+8Y3c".to_string()),
            CursorValue::Window(date(2020, 1, 1)),
        ];
        for cursor in cursors {
            let parsed = CursorValue::parse(cursor.kind(), &cursor.to_scalar()).unwrap();
            assert_eq!(parsed, cursor);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(CursorValue::parse(CursorKind::Timestamp, "yesterday").is_err());
        assert!(CursorValue::parse(CursorKind::Offset, "-5").is_err());
        assert!(CursorValue::parse(CursorKind::CursorToken, "  ").is_err());
        assert!(CursorValue::parse(CursorKind::DateWindow, "2020-13-01").is_err());
    }

    #[test]
    fn test_monotonic_kinds_reject_regression() {
        let cp = Checkpoint::new(key(), CursorValue::Offset(100));
        assert!(cp.advance(CursorValue::Offset(100), Transition::Advance).is_ok());
        assert!(cp.advance(CursorValue::Offset(150), Transition::Advance).is_ok());
        assert!(matches!(
            cp.advance(CursorValue::Offset(50), Transition::Advance),
            Err(CheckpointError::Regression { .. })
        ));

        // A reset never excuses a timestamp regression.
        let cp = Checkpoint::new(key(), CursorValue::Timestamp(1000));
        assert!(cp.advance(CursorValue::Timestamp(999), Transition::Reset).is_err());
    }

    #[test]
    fn test_window_regression_only_on_reset() {
        let cp = Checkpoint::new(key(), CursorValue::Window(date(2035, 1, 1)));
        let back = CursorValue::Window(date(2020, 1, 1));

        assert!(cp.advance(back.clone(), Transition::Advance).is_err());
        let reset = cp.advance(back.clone(), Transition::Reset).unwrap();
        assert_eq!(reset.cursor, back);
    }

    #[test]
    fn test_tokens_are_opaque() {
        let cp = Checkpoint::new(key(), CursorValue::Token("zzz".to_string()));
        assert!(cp
            .advance(CursorValue::Token("aaa".to_string()), Transition::Advance)
            .is_ok());
    }

    #[test]
    fn test_kind_change_rejected() {
        let cp = Checkpoint::new(key(), CursorValue::Offset(10));
        assert!(matches!(
            cp.advance(CursorValue::Timestamp(20), Transition::Advance),
            Err(CheckpointError::KindMismatch { .. })
        ));
    }
}
