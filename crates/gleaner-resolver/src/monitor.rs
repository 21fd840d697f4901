//! Run-scoped resolution statistics

use gleaner_domain::{ConflictRecord, Resolution};
use std::collections::BTreeMap;
use std::io::{self, Write};

/// Conflict count and bounded samples for one `(entity_type, field)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictStats {
    /// Conflicts seen, including those not sampled
    pub count: usize,
    /// First conflicts seen, up to the monitor's sample cap
    pub samples: Vec<ConflictRecord>,
}

/// Statistics collected during one load run
///
/// Created by the caller at run start and passed into every resolver call.
/// Tracks exact/fuzzy merges, creations, null-fills and per-field conflicts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictMonitor {
    /// Total `resolve` calls that returned a row
    pub resolutions: usize,

    /// Rows inserted
    pub created: usize,

    /// Rows found by natural key
    pub exact_matches: usize,

    /// Rows found by fuzzy match
    pub fuzzy_matches: usize,

    /// Empty stored fields filled from incoming values
    pub fields_filled: usize,

    /// Conflicts keyed by `(entity_type, field)`
    pub conflicts: BTreeMap<(String, String), ConflictStats>,

    max_samples: usize,
}

impl Default for ConflictMonitor {
    fn default() -> Self {
        Self::new(10)
    }
}

impl ConflictMonitor {
    /// Create an empty monitor keeping at most `max_samples` samples per key
    pub fn new(max_samples: usize) -> Self {
        Self {
            resolutions: 0,
            created: 0,
            exact_matches: 0,
            fuzzy_matches: 0,
            fields_filled: 0,
            conflicts: BTreeMap::new(),
            max_samples,
        }
    }

    /// Sample cap per `(entity_type, field)`
    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    /// Record how a reference was resolved
    pub fn record_resolution(&mut self, resolution: Resolution) {
        self.resolutions += 1;
        match resolution {
            Resolution::Exact => self.exact_matches += 1,
            Resolution::Fuzzy { .. } => self.fuzzy_matches += 1,
            Resolution::Created => self.created += 1,
        }
    }

    /// Record an empty field being filled
    pub fn record_fill(&mut self) {
        self.fields_filled += 1;
    }

    /// Record a conflicting value
    pub fn record_conflict(&mut self, conflict: ConflictRecord) {
        let key = (conflict.entity_type.clone(), conflict.field.clone());
        let stats = self.conflicts.entry(key).or_default();
        stats.count += 1;
        if stats.samples.len() < self.max_samples {
            stats.samples.push(conflict);
        }
    }

    /// Rows found rather than created
    pub fn merged(&self) -> usize {
        self.exact_matches + self.fuzzy_matches
    }

    /// Conflicts across all keys
    pub fn total_conflicts(&self) -> usize {
        self.conflicts.values().map(|s| s.count).sum()
    }

    /// Conflict count for one key
    pub fn conflict_count(&self, entity_type: &str, field: &str) -> usize {
        self.conflicts
            .get(&(entity_type.to_string(), field.to_string()))
            .map_or(0, |s| s.count)
    }

    /// Reset all statistics
    pub fn reset(&mut self) {
        self.resolutions = 0;
        self.created = 0;
        self.exact_matches = 0;
        self.fuzzy_matches = 0;
        self.fields_filled = 0;
        self.conflicts.clear();
    }

    /// Generate a summary report
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Resolution Summary".to_string(),
            "==================".to_string(),
            format!("Resolutions: {}", self.resolutions),
            format!("Created: {}", self.created),
            format!(
                "Merged: {} (exact {}, fuzzy {})",
                self.merged(),
                self.exact_matches,
                self.fuzzy_matches
            ),
            format!("Fields filled: {}", self.fields_filled),
        ];

        if !self.conflicts.is_empty() {
            lines.push(String::new());
            lines.push("Conflicts by field:".to_string());
            for ((entity_type, field), stats) in &self.conflicts {
                lines.push(format!("  {}.{}: {}", entity_type, field, stats.count));
            }
            lines.push(format!("  Total: {}", self.total_conflicts()));
        }

        lines.join("\n")
    }

    /// Write every sampled conflict as one JSON object per line
    pub fn write_conflict_log<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for stats in self.conflicts.values() {
            for sample in &stats.samples {
                serde_json::to_writer(&mut writer, sample)?;
                writer.write_all(b"\n")?;
            }
        }
        writer.flush()
    }
}
