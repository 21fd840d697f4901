//! Load command implementation.

use crate::checkpoints::{open_store, Checkpoints};
use crate::cli::LoadArgs;
use crate::config::GleanerConfig;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use gleaner_loader::{DirectoryDocuments, Loader};
use gleaner_resolver::EntityResolver;
use std::fs::File;
use std::io::{BufWriter, Write};
use tracing::info;

/// Execute the load command.
pub fn execute_load(args: LoadArgs, config: &GleanerConfig, formatter: &Formatter) -> Result<()> {
    let mut store = open_store(&config.store.path)?;
    let resolver = EntityResolver::new(config.resolver.clone(), &store)?;
    let mut monitor = resolver.new_monitor();

    let mut loader_config = config.loader.clone();
    if args.enrich {
        loader_config.skip_failed_documents = true;
    }
    let pattern = loader_config.pattern.clone();
    let loader = Loader::from_config(resolver, loader_config)?;

    let dir = args.dir.unwrap_or_else(|| config.raw.dir.join(&args.source));
    if !dir.is_dir() {
        return Err(CliError::InvalidInput(format!("No raw directory at {}", dir.display())));
    }
    let documents = DirectoryDocuments::with_pattern(dir, pattern);
    let mut checkpoints = Checkpoints::open(config)?;

    let report = loader.load(&mut store, &mut checkpoints, &args.source, &documents, &mut monitor)?;
    info!("{}", monitor.summary());

    if let Some(path) = &args.conflict_log {
        let mut writer = BufWriter::new(File::create(path)?);
        monitor.write_conflict_log(&mut writer)?;
        writer.flush()?;
        info!("Conflict log written to {}", path.display());
    }

    println!("{}", formatter.format_load(&report, &monitor)?);

    if !report.is_success() {
        return Err(CliError::Incomplete(report.summary()));
    }
    Ok(())
}
