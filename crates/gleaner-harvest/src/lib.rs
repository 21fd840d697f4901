//! Gleaner Harvest
//!
//! Resumable extraction from paginated research-information APIs.
//!
//! ## Overview
//!
//! A [`SourceConnector`] knows one pagination protocol and turns a cursor into
//! an [`ExtractionUnit`](gleaner_domain::ExtractionUnit). The
//! [`ExtractionDriver`] loops over units, hands each one to a [`RawSink`] and
//! only then advances the durable checkpoint, so a crash or a failed unit
//! never loses or skips data.
//!
//! ## Protocols
//!
//! - **Offset**: `offset`/`limit` paging against a known total
//! - **Cursor**: opaque next-page tokens
//! - **Bulk job**: submit, poll, download, delete
//! - **Windowed**: fixed date windows that reset once they run past the horizon
//!
//! ## Usage
//!
//! ```no_run
//! use gleaner_harvest::{build_connector, ExtractionDriver, HttpTransport, JsonDirSink, SourceConfig, SystemClock};
//! use gleaner_store::FileCheckpointStore;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(source: SourceConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(HttpTransport::new(source.timeout())?);
//! let connector = build_connector(&source, transport, Arc::new(SystemClock))?;
//! let mut driver = ExtractionDriver::new(
//!     connector,
//!     FileCheckpointStore::new("checkpoints"),
//!     Box::new(JsonDirSink::new("raw")),
//!     Arc::new(SystemClock),
//!     source.query_id.clone(),
//! );
//! let report = driver.run(&CancellationToken::new()).await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod config;
pub mod connector;
pub mod connectors;
pub mod driver;
pub mod error;
pub mod fetcher;
pub mod mtime;
pub mod retry;
pub mod sink;
pub mod transport;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{build_connector, ProtocolConfig, SourceConfig};
pub use connector::SourceConnector;
pub use driver::{ExtractionDriver, RunId, RunOutcome, RunReport};
pub use error::HarvestError;
pub use fetcher::PageFetcher;
pub use mtime::MtimeScan;
pub use retry::RetryPolicy;
pub use sink::{JsonDirSink, RawSink};
pub use transport::{HttpTransport, JsonTransport, ScriptedTransport};
pub use window::{WindowMove, WindowPlan, WindowStep};
