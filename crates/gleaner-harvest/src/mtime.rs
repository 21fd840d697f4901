//! Modification-time skip for file-backed sources
//!
//! Records are not guaranteed to arrive in mtime order, so the checkpoint is
//! only ever written once, after the whole source has been scanned. A crash
//! mid-scan means a full rescan next time, which downstream idempotence makes
//! safe.

/// Default tolerance for coarse file-system timestamps (seconds)
pub const DEFAULT_EPSILON_SECS: i64 = 1;

/// Tracks which records to process and the candidate next checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MtimeScan {
    checkpoint: Option<i64>,
    epsilon: i64,
    candidate: Option<i64>,
    processed: usize,
    skipped: usize,
}

impl MtimeScan {
    /// Start a scan against the stored checkpoint (epoch seconds)
    pub fn new(checkpoint: Option<i64>, epsilon: i64) -> Self {
        Self {
            checkpoint,
            epsilon,
            candidate: None,
            processed: 0,
            skipped: 0,
        }
    }

    /// Decide whether a record with this mtime must be processed
    ///
    /// Skipped when `mtime + epsilon < checkpoint`; otherwise counted and
    /// folded into the candidate checkpoint.
    pub fn observe(&mut self, mtime: i64) -> bool {
        if let Some(checkpoint) = self.checkpoint {
            if mtime.saturating_add(self.epsilon) < checkpoint {
                self.skipped += 1;
                return false;
            }
        }
        self.processed += 1;
        self.candidate = Some(self.candidate.map_or(mtime, |c| c.max(mtime)));
        true
    }

    /// Records processed so far
    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Records skipped so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Checkpoint to persist after the full scan, never below the old one
    ///
    /// `None` when there was nothing before and nothing was processed.
    pub fn finish(&self) -> Option<i64> {
        match (self.checkpoint, self.candidate) {
            (Some(old), Some(new)) => Some(old.max(new)),
            (old, new) => old.or(new),
        }
    }
}
