//! CLI command definitions and argument parsing.

use crate::config::OutputFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Gleaner - Harvest research metadata and load it into one entity store.
#[derive(Debug, Parser)]
#[command(name = "gleaner")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<CliFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "GLEANER_CONFIG", default_value = "gleaner.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliFormat {
    /// Table format (default)
    Table,
    /// JSON format
    Json,
    /// Quiet format (one line per result)
    Quiet,
}

impl From<CliFormat> for OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Table => OutputFormat::Table,
            CliFormat::Json => OutputFormat::Json,
            CliFormat::Quiet => OutputFormat::Quiet,
        }
    }
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Harvest one configured source into the raw directory
    Harvest(HarvestArgs),

    /// Load raw documents of a source into the entity store
    Load(LoadArgs),

    /// Inspect stored checkpoints
    Checkpoint(CheckpointArgs),
}

/// Arguments for the harvest command.
#[derive(Debug, Parser)]
pub struct HarvestArgs {
    /// Source id from the configuration
    pub source: String,

    /// Query id, when the source is configured with several
    #[arg(short, long)]
    pub query: Option<String>,

    /// Stop after this many units (overrides the source setting)
    #[arg(short, long)]
    pub max_units: Option<usize>,
}

/// Arguments for the load command.
#[derive(Debug, Parser)]
pub struct LoadArgs {
    /// Source id; names the load checkpoint and the default raw subdirectory
    pub source: String,

    /// Directory to scan instead of `<raw dir>/<source>`
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Skip documents that fail instead of aborting (enrichment mode)
    #[arg(long)]
    pub enrich: bool,

    /// Write sampled conflicts as JSON lines to this file
    #[arg(long)]
    pub conflict_log: Option<PathBuf>,
}

/// Arguments for checkpoint inspection.
#[derive(Debug, Parser)]
pub struct CheckpointArgs {
    #[command(subcommand)]
    pub action: CheckpointAction,
}

/// Checkpoint actions.
#[derive(Debug, Subcommand)]
pub enum CheckpointAction {
    /// List every stored checkpoint
    List,

    /// Show the checkpoints of one source
    Show {
        /// Source id
        source: String,

        /// Only this query id
        #[arg(short, long)]
        query: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_harvest() {
        let cli = Cli::try_parse_from(["gleaner", "harvest", "cordis", "--max-units", "3"]).unwrap();
        match cli.command {
            Command::Harvest(args) => {
                assert_eq!(args.source, "cordis");
                assert_eq!(args.max_units, Some(3));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_load_with_global_flags() {
        let cli = Cli::try_parse_from([
            "gleaner",
            "load",
            "cordis",
            "--enrich",
            "--format",
            "json",
            "--config",
            "/etc/gleaner.toml",
        ])
        .unwrap();
        assert!(matches!(cli.format, Some(CliFormat::Json)));
        assert_eq!(cli.config, PathBuf::from("/etc/gleaner.toml"));
        match cli.command {
            Command::Load(args) => {
                assert!(args.enrich);
                assert!(args.dir.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_checkpoint_show() {
        let cli = Cli::try_parse_from(["gleaner", "checkpoint", "show", "openalex", "-q", "works"]).unwrap();
        match cli.command {
            Command::Checkpoint(CheckpointArgs {
                action: CheckpointAction::Show { source, query },
            }) => {
                assert_eq!(source, "openalex");
                assert_eq!(query.as_deref(), Some("works"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_command_is_required() {
        assert!(Cli::try_parse_from(["gleaner"]).is_err());
    }
}
