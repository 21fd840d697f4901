//! Extraction driver
//!
//! Runs one connector against one checkpoint. The checkpoint only moves after
//! a unit has been fetched in full and its records handed to the sink, so an
//! interrupted or failed run resumes from the last completed unit.

use crate::clock::Clock;
use crate::connector::SourceConnector;
use crate::error::HarvestError;
use crate::sink::RawSink;
use crate::window::WindowMove;
use gleaner_domain::traits::CheckpointStore;
use gleaner_domain::{Checkpoint, CheckpointKey, CursorValue, Transition};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Identifier of one harvest run (UUIDv7, so ids sort by start time)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// A new time-ordered id
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Source exhausted, or a window reset ended the run
    Completed,
    /// Cancellation observed between units
    Cancelled,
    /// `max_units` reached
    UnitLimit,
    /// A unit failed; the checkpoint stays at the last completed unit
    Failed,
}

impl RunOutcome {
    /// Get the outcome name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::UnitLimit => "unit_limit",
            RunOutcome::Failed => "failed",
        }
    }
}

/// What one run did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Run identifier
    pub run_id: RunId,
    /// Source identifier
    pub source_id: String,
    /// Query identifier
    pub query_id: String,
    /// Units fetched, persisted and checkpointed
    pub units_completed: usize,
    /// Units abandoned
    pub units_failed: usize,
    /// Records persisted
    pub records: usize,
    /// Cursor the run started from
    pub start_cursor: String,
    /// Cursor the run left in the checkpoint
    pub final_cursor: String,
    /// Whether a window reset happened
    pub reset: bool,
    /// Why the run stopped
    pub outcome: RunOutcome,
    /// Error of the failed unit, if any
    pub error: Option<String>,
}

impl RunReport {
    fn new(run_id: RunId, key: &CheckpointKey, start: &CursorValue) -> Self {
        Self {
            run_id,
            source_id: key.source_id.clone(),
            query_id: key.query_id.clone(),
            units_completed: 0,
            units_failed: 0,
            records: 0,
            start_cursor: start.to_scalar(),
            final_cursor: start.to_scalar(),
            reset: false,
            outcome: RunOutcome::Completed,
            error: None,
        }
    }

    /// Whether the run ended without a failed unit
    pub fn is_success(&self) -> bool {
        self.outcome != RunOutcome::Failed
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "run {} {}/{}: {} ({} units, {} failed, {} records, cursor {} -> {}{})",
            self.run_id,
            self.source_id,
            self.query_id,
            self.outcome.as_str(),
            self.units_completed,
            self.units_failed,
            self.records,
            self.start_cursor,
            self.final_cursor,
            if self.reset { ", reset" } else { "" }
        )
    }
}

/// Drives a connector, a checkpoint store and a raw sink
pub struct ExtractionDriver<C: CheckpointStore> {
    connector: Box<dyn SourceConnector>,
    checkpoints: C,
    sink: Box<dyn RawSink>,
    clock: Arc<dyn Clock>,
    query_id: String,
    max_units: Option<usize>,
}

impl<C> ExtractionDriver<C>
where
    C: CheckpointStore,
    C::Error: fmt::Display,
{
    /// Create a driver
    pub fn new(
        connector: Box<dyn SourceConnector>,
        checkpoints: C,
        sink: Box<dyn RawSink>,
        clock: Arc<dyn Clock>,
        query_id: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            checkpoints,
            sink,
            clock,
            query_id: query_id.into(),
            max_units: None,
        }
    }

    /// Stop after this many completed units
    pub fn with_max_units(mut self, max_units: Option<usize>) -> Self {
        self.max_units = max_units;
        self
    }

    /// Checkpoint key this driver owns
    pub fn key(&self) -> CheckpointKey {
        CheckpointKey::new(self.connector.source_id(), self.query_id.clone())
    }

    /// The checkpoint store
    pub fn checkpoints(&self) -> &C {
        &self.checkpoints
    }

    /// Run until the source is exhausted, a unit fails, a window resets,
    /// the unit limit is reached or `cancel` fires
    ///
    /// A failed unit is reported (outcome `Failed`), not returned as `Err`.
    /// `Err` is reserved for checkpoint store failures and invariant
    /// violations, where continuing would be unsafe.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<RunReport, HarvestError> {
        let key = self.key();
        let run_id = RunId::new();

        let mut checkpoint = match self
            .checkpoints
            .load(&key, self.connector.cursor_kind())
            .map_err(|e| HarvestError::CheckpointStore(e.to_string()))?
        {
            Some(checkpoint) => checkpoint,
            None => Checkpoint::new(key.clone(), self.connector.initial_cursor()),
        };

        let mut report = RunReport::new(run_id, &key, &checkpoint.cursor);
        info!("Run {} for {} starting at {}", run_id, key, checkpoint.cursor);

        loop {
            if cancel.is_cancelled() {
                info!("Run {} cancelled", run_id);
                report.outcome = RunOutcome::Cancelled;
                break;
            }
            if self.max_units.is_some_and(|max| report.units_completed >= max) {
                report.outcome = RunOutcome::UnitLimit;
                break;
            }

            let unit = match self.connector.fetch_page(&checkpoint.cursor).await {
                Ok(unit) => unit,
                Err(e) => {
                    error!("Unit at {} for {} abandoned: {}", checkpoint.cursor, key, e);
                    report.units_failed += 1;
                    report.outcome = RunOutcome::Failed;
                    report.error = Some(e.to_string());
                    break;
                }
            };

            if let Err(e) = self
                .sink
                .write_unit(&run_id, &key, &checkpoint.cursor, &unit.items)
            {
                error!("Persisting unit at {} for {} failed: {}", checkpoint.cursor, key, e);
                report.units_failed += 1;
                report.outcome = RunOutcome::Failed;
                report.error = Some(e.to_string());
                break;
            }

            let (next, transition) = match (self.connector.window_plan(), &checkpoint.cursor) {
                (Some(plan), CursorValue::Window(start)) => {
                    match plan.next(*start, self.clock.now().date_naive())? {
                        WindowMove::Advance(date) => (CursorValue::Window(date), Transition::Advance),
                        WindowMove::Reset(date) => (CursorValue::Window(date), Transition::Reset),
                    }
                }
                _ => (unit.next_cursor.clone(), Transition::Advance),
            };

            let advanced = checkpoint.advance(next, transition)?;
            self.checkpoints
                .save(&advanced)
                .map_err(|e| HarvestError::CheckpointStore(e.to_string()))?;

            report.units_completed += 1;
            report.records += unit.items.len();
            checkpoint = advanced;

            if transition == Transition::Reset {
                warn!("Window horizon reached for {}, checkpoint reset to {}", key, checkpoint.cursor);
                report.reset = true;
                report.outcome = RunOutcome::Completed;
                break;
            }
            if self.connector.window_plan().is_none() && unit.is_complete {
                report.outcome = RunOutcome::Completed;
                break;
            }
        }

        report.final_cursor = checkpoint.cursor.to_scalar();
        info!("{}", report.summary());
        Ok(report)
    }
}
