//! Harvest command implementation.

use crate::checkpoints::Checkpoints;
use crate::cli::HarvestArgs;
use crate::config::GleanerConfig;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use gleaner_harvest::{build_connector, Clock, ExtractionDriver, HttpTransport, JsonDirSink, JsonTransport, SystemClock};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Execute the harvest command.
pub async fn execute_harvest(
    args: HarvestArgs,
    config: &GleanerConfig,
    formatter: &Formatter,
    cancel: &CancellationToken,
) -> Result<()> {
    let source = config.source(&args.source, args.query.as_deref())?;
    info!("Harvesting {}/{} ({})", source.id, source.query_id, source.protocol.name());

    let transport: Arc<dyn JsonTransport> = Arc::new(HttpTransport::new(source.timeout())?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let connector = build_connector(source, transport, clock.clone())?;
    let checkpoints = Checkpoints::open(config)?;
    let sink = Box::new(JsonDirSink::new(&config.raw.dir));

    let mut driver = ExtractionDriver::new(connector, checkpoints, sink, clock, source.query_id.clone())
        .with_max_units(args.max_units.or(source.max_units));
    let report = driver.run(cancel).await?;

    println!("{}", formatter.format_run(&report)?);

    if !report.is_success() {
        return Err(CliError::Incomplete(report.summary()));
    }
    Ok(())
}
