//! Checkpoint command implementation.

use crate::checkpoints::Checkpoints;
use crate::cli::{CheckpointAction, CheckpointArgs};
use crate::config::GleanerConfig;
use crate::error::Result;
use crate::output::Formatter;
use gleaner_domain::traits::CheckpointStore;
use gleaner_domain::CheckpointKey;

/// Execute the checkpoint command.
pub fn execute_checkpoint(args: CheckpointArgs, config: &GleanerConfig, formatter: &Formatter) -> Result<()> {
    let checkpoints = Checkpoints::open(config)?;
    let entries = select(checkpoints.list()?, &args.action);
    println!("{}", formatter.format_checkpoints(&entries)?);
    Ok(())
}

fn select(mut entries: Vec<(CheckpointKey, String)>, action: &CheckpointAction) -> Vec<(CheckpointKey, String)> {
    if let CheckpointAction::Show { source, query } = action {
        entries.retain(|(key, _)| {
            key.source_id == *source && query.as_ref().map_or(true, |q| key.query_id == *q)
        });
    }
    entries
}
