//! Gleaner CLI - Harvest research metadata and load it into one entity store.

use clap::Parser;
use gleaner_cli::commands;
use gleaner_cli::{Cli, Command, Formatter, GleanerConfig};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> gleaner_cli::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing (log to stderr, stdout carries the report)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GleanerConfig::load(&cli.config)?;

    // Determine output format
    let format = cli.format.map(Into::into).unwrap_or(config.output.format);
    let color_enabled = !cli.no_color && config.output.color;
    let formatter = Formatter::new(format, color_enabled);

    match cli.command {
        Command::Harvest(args) => {
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, stopping after the current unit");
                    on_interrupt.cancel();
                }
            });
            commands::execute_harvest(args, &config, &formatter, &cancel).await?;
        }
        Command::Load(args) => {
            commands::execute_load(args, &config, &formatter)?;
        }
        Command::Checkpoint(args) => {
            commands::execute_checkpoint(args, &config, &formatter)?;
        }
    }

    Ok(())
}
