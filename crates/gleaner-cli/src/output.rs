//! Output formatting for the CLI.

use crate::config::OutputFormat;
use crate::error::Result;
use colored::*;
use gleaner_domain::CheckpointKey;
use gleaner_harvest::RunReport;
use gleaner_loader::LoadReport;
use gleaner_resolver::ConflictMonitor;
use serde_json::json;
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};

/// Output formatter.
pub struct Formatter {
    format: OutputFormat,
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(format: OutputFormat, color_enabled: bool) -> Self {
        Self {
            format,
            color_enabled,
        }
    }

    /// Format a harvest run.
    pub fn format_run(&self, report: &RunReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
            OutputFormat::Quiet => Ok(format!("{} {}", report.run_id, report.final_cursor)),
            OutputFormat::Table => {
                let mut builder = Builder::default();
                builder.push_record(["Run", "Source", "Query", "Outcome", "Units", "Failed", "Records", "Cursor"]);
                let cursor = if report.reset {
                    format!("{} -> {} (reset)", report.start_cursor, report.final_cursor)
                } else {
                    format!("{} -> {}", report.start_cursor, report.final_cursor)
                };
                let run_id = report.run_id.to_string();
                builder.push_record([
                    run_id[..8].to_string(),
                    report.source_id.clone(),
                    report.query_id.clone(),
                    report.outcome.as_str().to_string(),
                    report.units_completed.to_string(),
                    report.units_failed.to_string(),
                    report.records.to_string(),
                    cursor,
                ]);

                let status = match &report.error {
                    Some(error) => self.error(error),
                    None if report.is_success() => self.success(&format!("Harvest {}", report.outcome.as_str())),
                    None => self.error("Harvest failed"),
                };
                Ok(format!("{}\n{}", self.table(builder), status))
            }
        }
    }

    /// Format a load run together with its resolution statistics.
    pub fn format_load(&self, report: &LoadReport, monitor: &ConflictMonitor) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                let conflicts: serde_json::Map<String, serde_json::Value> = monitor
                    .conflicts
                    .iter()
                    .map(|((entity_type, field), stats)| (format!("{}.{}", entity_type, field), json!(stats.count)))
                    .collect();
                let value = json!({
                    "report": report,
                    "resolution": {
                        "resolutions": monitor.resolutions,
                        "created": monitor.created,
                        "exact_matches": monitor.exact_matches,
                        "fuzzy_matches": monitor.fuzzy_matches,
                        "fields_filled": monitor.fields_filled,
                        "conflicts": conflicts,
                    }
                });
                Ok(serde_json::to_string_pretty(&value)?)
            }
            OutputFormat::Quiet => Ok(report.summary()),
            OutputFormat::Table => {
                let mut builder = Builder::default();
                builder.push_record(["Documents", "Skipped", "Failed", "Records", "Unmapped", "Created", "Merged", "Conflicts"]);
                builder.push_record([
                    report.documents_processed.to_string(),
                    report.documents_skipped.to_string(),
                    report.documents_failed.to_string(),
                    report.records_loaded.to_string(),
                    report.records_skipped.to_string(),
                    monitor.created.to_string(),
                    format!("{} ({} fuzzy)", monitor.merged(), monitor.fuzzy_matches),
                    monitor.total_conflicts().to_string(),
                ]);

                let mut lines = vec![self.table(builder)];
                if !monitor.conflicts.is_empty() {
                    let mut conflicts = Builder::default();
                    conflicts.push_record(["Entity type", "Field", "Conflicts"]);
                    for ((entity_type, field), stats) in &monitor.conflicts {
                        conflicts.push_record([entity_type.clone(), field.clone(), stats.count.to_string()]);
                    }
                    lines.push(self.table(conflicts));
                }
                lines.push(if report.is_success() {
                    self.success(&format!("Loaded {} documents", report.documents_processed))
                } else {
                    self.warning(&format!(
                        "{} documents failed; load checkpoint not advanced",
                        report.documents_failed
                    ))
                });
                Ok(lines.join("\n"))
            }
        }
    }

    /// Format stored checkpoints.
    pub fn format_checkpoints(&self, checkpoints: &[(CheckpointKey, String)]) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                let rows: Vec<serde_json::Value> = checkpoints
                    .iter()
                    .map(|(key, value)| {
                        json!({
                            "source_id": key.source_id,
                            "query_id": key.query_id,
                            "value": value,
                        })
                    })
                    .collect();
                Ok(serde_json::to_string_pretty(&rows)?)
            }
            OutputFormat::Quiet => Ok(checkpoints
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect::<Vec<_>>()
                .join("\n")),
            OutputFormat::Table => {
                if checkpoints.is_empty() {
                    return Ok(self.colorize("No checkpoints found.", "yellow"));
                }
                let mut builder = Builder::default();
                builder.push_record(["Source", "Query", "Value"]);
                for (key, value) in checkpoints {
                    builder.push_record([key.source_id.as_str(), key.query_id.as_str(), value.as_str()]);
                }
                Ok(self.table(builder))
            }
        }
    }

    /// Format a success message.
    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {}", message), "green")
    }

    /// Format an error message.
    pub fn error(&self, message: &str) -> String {
        self.colorize(&format!("✗ {}", message), "red")
    }

    /// Format a warning message.
    pub fn warning(&self, message: &str) -> String {
        self.colorize(&format!("⚠ {}", message), "yellow")
    }

    fn table(&self, builder: Builder) -> String {
        let mut table = builder.build();
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()));
        table.to_string()
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "red" => text.red().to_string(),
            "green" => text.green().to_string(),
            "yellow" => text.yellow().to_string(),
            _ => text.to_string(),
        }
    }
}
