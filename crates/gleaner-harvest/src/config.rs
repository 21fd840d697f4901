//! Source configuration and connector construction

use crate::clock::Clock;
use crate::connector::SourceConnector;
use crate::connectors::{
    BulkJobConfig, BulkJobConnector, CursorConfig, CursorConnector, HttpBulkJobApi, OffsetConfig, OffsetConnector,
    WindowedConfig, WindowedConnector,
};
use crate::error::HarvestError;
use crate::fetcher::PageFetcher;
use crate::retry::RetryPolicy;
use crate::transport::JsonTransport;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// One configured source
///
/// ```toml
/// [[sources]]
/// id = "openalex-works"
/// protocol = "cursor"
/// url = "https://api.openalex.org/works"
/// next_pointer = "/meta/next_cursor"
/// items_pointer = "/results"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source identifier, the first half of the checkpoint key
    pub id: String,

    /// Query identifier, the second half of the checkpoint key
    #[serde(default = "default_query_id")]
    pub query_id: String,

    /// Retry policy for every provider call
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Minimum gap between provider calls, in milliseconds
    #[serde(default)]
    pub request_interval_ms: u64,

    /// Per-request timeout, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Stop a run after this many units
    #[serde(default)]
    pub max_units: Option<usize>,

    /// Pagination protocol and its settings
    #[serde(flatten)]
    pub protocol: ProtocolConfig,
}

/// Pagination protocol of a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum ProtocolConfig {
    /// Offset and limit paging
    Offset(OffsetConfig),
    /// Opaque cursor tokens
    Cursor(CursorConfig),
    /// Asynchronous bulk export jobs
    BulkJob(BulkJobConfig),
    /// Date windows with offset paging inside each window
    Windowed(WindowedConfig),
}

impl ProtocolConfig {
    /// Get the protocol name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolConfig::Offset(_) => "offset",
            ProtocolConfig::Cursor(_) => "cursor",
            ProtocolConfig::BulkJob(_) => "bulk_job",
            ProtocolConfig::Windowed(_) => "windowed",
        }
    }
}

fn default_query_id() -> String {
    "default".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl SourceConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("source id must not be empty".to_string());
        }
        if self.query_id.trim().is_empty() {
            return Err(format!("source '{}': query_id must not be empty", self.id));
        }
        if self.timeout_secs == 0 {
            return Err(format!("source '{}': timeout_secs must be positive", self.id));
        }
        if self.max_units == Some(0) {
            return Err(format!("source '{}': max_units must be positive", self.id));
        }
        self.retry
            .validate()
            .map_err(|e| format!("source '{}': {}", self.id, e))?;

        let protocol = match &self.protocol {
            ProtocolConfig::Offset(c) => c.validate(),
            ProtocolConfig::Cursor(c) => c.validate(),
            ProtocolConfig::BulkJob(c) => c.validate(),
            ProtocolConfig::Windowed(c) => c.validate(),
        };
        protocol.map_err(|e| format!("source '{}': {}", self.id, e))
    }

    /// Minimum gap between provider calls
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Build the connector a source config describes
pub fn build_connector(
    config: &SourceConfig,
    transport: Arc<dyn JsonTransport>,
    clock: Arc<dyn Clock>,
) -> Result<Box<dyn SourceConnector>, HarvestError> {
    config.validate().map_err(HarvestError::Config)?;

    let fetcher = PageFetcher::new(transport, clock.clone(), config.retry.clone())
        .with_request_interval(config.request_interval());

    let connector: Box<dyn SourceConnector> = match &config.protocol {
        ProtocolConfig::Offset(c) => Box::new(OffsetConnector::new(config.id.clone(), c.clone(), fetcher)?),
        ProtocolConfig::Cursor(c) => Box::new(CursorConnector::new(config.id.clone(), c.clone(), fetcher)?),
        ProtocolConfig::Windowed(c) => Box::new(WindowedConnector::new(config.id.clone(), c.clone(), fetcher)?),
        ProtocolConfig::BulkJob(c) => {
            let poll_interval = Duration::from_secs(c.poll_interval_secs);
            let max_wait = Duration::from_secs(c.max_wait_secs);
            let initial_since = c.initial_since;
            let api = HttpBulkJobApi::new(c.clone(), fetcher);
            Box::new(
                BulkJobConnector::new(config.id.clone(), Box::new(api), clock, poll_interval, max_wait)
                    .with_initial_since(initial_since),
            )
        }
    };
    Ok(connector)
}
