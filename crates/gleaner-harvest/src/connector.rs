//! The capability every provider protocol implements

use crate::error::HarvestError;
use crate::window::WindowPlan;
use async_trait::async_trait;
use gleaner_domain::{CursorKind, CursorValue, ExtractionUnit};

/// One provider's pagination/completion protocol
///
/// A connector is stateless between calls: everything needed to resume is in
/// the cursor it is handed. Implementations are selected by configuration.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Source identifier (first half of the checkpoint key)
    fn source_id(&self) -> &str;

    /// Kind of cursor this connector consumes and produces
    fn cursor_kind(&self) -> CursorKind;

    /// Cursor to start from when no checkpoint exists
    fn initial_cursor(&self) -> CursorValue;

    /// Fetch one unit of work starting at `cursor`
    async fn fetch_page(&self, cursor: &CursorValue) -> Result<ExtractionUnit, HarvestError>;

    /// Window progression, for date-windowed sources
    fn window_plan(&self) -> Option<&WindowPlan> {
        None
    }
}

/// Require a cursor of the expected kind
pub(crate) fn expect_kind(expected: CursorKind, cursor: &CursorValue) -> Result<(), HarvestError> {
    if cursor.kind() == expected {
        Ok(())
    } else {
        Err(HarvestError::Checkpoint(gleaner_domain::CheckpointError::KindMismatch {
            current: cursor.kind(),
            update: expected,
        }))
    }
}
