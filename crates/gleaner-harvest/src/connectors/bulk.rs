//! Asynchronous submitted-job (bulk export) protocol
//!
//! ```text
//! Submitted ──PollStarted──▶ Polling ──Status(Finished)──▶ Ready ──Downloaded──▶ Downloaded ──Cleaned──▶ Deleted
//!     │                      │  ▲                        │                                   └─CleanupFailed─▶ Deleted
//!     │                      └──┘ Status(Pending)        │
//!     └──────── ProviderError / Status(Error) / timeout ─┴──────────────────────────────▶ Failed
//! ```
//!
//! [`JobState::on`] is pure: time comes in as an argument, so the whole
//! machine is testable without a network or real sleeps.

use super::default_id_pointer;
use crate::clock::Clock;
use crate::connector::{expect_kind, SourceConnector};
use crate::error::HarvestError;
use crate::fetcher::{string_at, PageFetcher};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use gleaner_domain::{CursorKind, CursorValue, ExtractionUnit, RawRecord};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Provider-reported job status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Still running
    Pending,
    /// Finished; the archive can be fetched from the URL
    Finished {
        /// Archive location
        download_url: String,
    },
    /// Provider gave up on the job
    Error(String),
}

/// Inputs to the job state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// Start polling a submitted job
    PollStarted,
    /// A status poll returned
    Status(JobStatus),
    /// The archive was fetched and unpacked
    Downloaded {
        /// Records in the archive
        records: usize,
    },
    /// The provider-side job was deleted
    Cleaned,
    /// Deleting the provider-side job failed (non-fatal)
    CleanupFailed(String),
    /// A call failed with an explicit provider error
    ProviderError(String),
}

impl JobEvent {
    fn name(&self) -> &'static str {
        match self {
            JobEvent::PollStarted => "PollStarted",
            JobEvent::Status(JobStatus::Pending) => "Status(Pending)",
            JobEvent::Status(JobStatus::Finished { .. }) => "Status(Finished)",
            JobEvent::Status(JobStatus::Error(_)) => "Status(Error)",
            JobEvent::Downloaded { .. } => "Downloaded",
            JobEvent::Cleaned => "Cleaned",
            JobEvent::CleanupFailed(_) => "CleanupFailed",
            JobEvent::ProviderError(_) => "ProviderError",
        }
    }
}

/// State of one bulk job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Accepted by the provider
    Submitted {
        /// Provider job id
        job_id: String,
        /// Submission instant
        submitted_at: DateTime<Utc>,
        /// Latest instant a pending status is tolerated
        deadline: DateTime<Utc>,
    },
    /// Waiting for the provider to finish
    Polling {
        /// Provider job id
        job_id: String,
        /// Submission instant
        submitted_at: DateTime<Utc>,
        /// Latest instant a pending status is tolerated
        deadline: DateTime<Utc>,
        /// Status polls so far
        polls: u32,
    },
    /// Archive available
    Ready {
        /// Provider job id
        job_id: String,
        /// Submission instant
        submitted_at: DateTime<Utc>,
        /// Archive location
        download_url: String,
    },
    /// Archive fetched and unpacked
    Downloaded {
        /// Provider job id
        job_id: String,
        /// Submission instant
        submitted_at: DateTime<Utc>,
        /// Records in the archive
        records: usize,
    },
    /// Provider-side job removed (or removal attempted)
    Deleted {
        /// Provider job id
        job_id: String,
        /// Submission instant
        submitted_at: DateTime<Utc>,
        /// Records in the archive
        records: usize,
        /// Why cleanup failed, if it did
        cleanup_error: Option<String>,
    },
    /// Terminal failure
    Failed {
        /// Provider job id
        job_id: String,
        /// Failure description
        reason: String,
        /// Whether the maximum wait was exceeded
        timed_out: bool,
    },
}

impl JobState {
    /// A freshly submitted job that may stay pending for `max_wait`
    pub fn submitted(job_id: impl Into<String>, submitted_at: DateTime<Utc>, max_wait: ChronoDuration) -> Self {
        JobState::Submitted {
            job_id: job_id.into(),
            submitted_at,
            deadline: submitted_at.checked_add_signed(max_wait).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// State name
    pub fn name(&self) -> &'static str {
        match self {
            JobState::Submitted { .. } => "Submitted",
            JobState::Polling { .. } => "Polling",
            JobState::Ready { .. } => "Ready",
            JobState::Downloaded { .. } => "Downloaded",
            JobState::Deleted { .. } => "Deleted",
            JobState::Failed { .. } => "Failed",
        }
    }

    /// Provider job id
    pub fn job_id(&self) -> &str {
        match self {
            JobState::Submitted { job_id, .. }
            | JobState::Polling { job_id, .. }
            | JobState::Ready { job_id, .. }
            | JobState::Downloaded { job_id, .. }
            | JobState::Deleted { job_id, .. }
            | JobState::Failed { job_id, .. } => job_id,
        }
    }

    /// Whether no further event is accepted
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Deleted { .. } | JobState::Failed { .. })
    }

    /// Apply an event at instant `now`
    ///
    /// A pending status observed after the deadline fails the job. Any
    /// event a state does not accept is an [`HarvestError::InvalidTransition`].
    pub fn on(self, event: JobEvent, now: DateTime<Utc>) -> Result<JobState, HarvestError> {
        let invalid = HarvestError::InvalidTransition {
            state: self.name(),
            event: event.name(),
        };

        let next = match (self, event) {
            (JobState::Submitted { job_id, submitted_at, deadline }, JobEvent::PollStarted) => JobState::Polling {
                job_id,
                submitted_at,
                deadline,
                polls: 0,
            },
            (
                JobState::Polling {
                    job_id,
                    submitted_at,
                    deadline,
                    polls,
                },
                JobEvent::Status(status),
            ) => match status {
                JobStatus::Finished { download_url } => JobState::Ready {
                    job_id,
                    submitted_at,
                    download_url,
                },
                JobStatus::Error(reason) => JobState::Failed {
                    job_id,
                    reason,
                    timed_out: false,
                },
                JobStatus::Pending if now > deadline => JobState::Failed {
                    reason: format!("not finished after {}s", (now - submitted_at).num_seconds()),
                    job_id,
                    timed_out: true,
                },
                JobStatus::Pending => JobState::Polling {
                    job_id,
                    submitted_at,
                    deadline,
                    polls: polls + 1,
                },
            },
            (
                JobState::Ready {
                    job_id, submitted_at, ..
                },
                JobEvent::Downloaded { records },
            ) => JobState::Downloaded {
                job_id,
                submitted_at,
                records,
            },
            (
                JobState::Downloaded {
                    job_id,
                    submitted_at,
                    records,
                },
                JobEvent::Cleaned,
            ) => JobState::Deleted {
                job_id,
                submitted_at,
                records,
                cleanup_error: None,
            },
            (
                JobState::Downloaded {
                    job_id,
                    submitted_at,
                    records,
                },
                JobEvent::CleanupFailed(error),
            ) => JobState::Deleted {
                job_id,
                submitted_at,
                records,
                cleanup_error: Some(error),
            },
            (
                JobState::Submitted { job_id, .. } | JobState::Polling { job_id, .. } | JobState::Ready { job_id, .. },
                JobEvent::ProviderError(reason),
            ) => JobState::Failed {
                job_id,
                reason,
                timed_out: false,
            },
            _ => return Err(invalid),
        };
        Ok(next)
    }
}

/// Provider operations a bulk job needs
#[async_trait]
pub trait BulkJobApi: Send + Sync {
    /// Submit a job for records modified since `since` (epoch seconds)
    async fn submit(&self, since: i64) -> Result<String, HarvestError>;

    /// Poll job status
    async fn status(&self, job_id: &str) -> Result<JobStatus, HarvestError>;

    /// Fetch and unpack the archive
    async fn download(&self, download_url: &str) -> Result<Vec<RawRecord>, HarvestError>;

    /// Delete the provider-side job
    async fn delete(&self, job_id: &str) -> Result<(), HarvestError>;
}

/// Bulk job endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkJobConfig {
    /// Jobs collection endpoint; a job lives at `<url>/<job_id>`
    pub url: String,

    /// Body field carrying the "modified since" timestamp
    #[serde(default = "default_since_field")]
    pub since_field: String,

    /// Pointer to the job id in the submit reply
    #[serde(default = "default_id_pointer")]
    pub job_id_pointer: String,

    /// Pointer to the status string in a poll reply
    #[serde(default = "default_status_pointer")]
    pub status_pointer: String,

    /// Pointer to the archive URL in a finished poll reply
    #[serde(default = "default_download_pointer")]
    pub download_pointer: String,

    /// Pointer to the error message in a failed poll reply
    #[serde(default = "default_error_pointer")]
    pub error_pointer: String,

    /// Status values meaning "finished"
    #[serde(default = "default_finished_statuses")]
    pub finished_statuses: Vec<String>,

    /// Status values meaning "failed"
    #[serde(default = "default_failed_statuses")]
    pub failed_statuses: Vec<String>,

    /// Pointer to a record's id inside the archive
    #[serde(default = "default_id_pointer")]
    pub id_pointer: String,

    /// Seconds between status polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Seconds a job may stay pending before it is failed
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,

    /// "Modified since" used when no checkpoint exists
    #[serde(default)]
    pub initial_since: i64,
}

fn default_since_field() -> String {
    "since".to_string()
}

fn default_status_pointer() -> String {
    "/status".to_string()
}

fn default_download_pointer() -> String {
    "/download_url".to_string()
}

fn default_error_pointer() -> String {
    "/error".to_string()
}

fn default_finished_statuses() -> Vec<String> {
    vec!["finished".to_string()]
}

fn default_failed_statuses() -> Vec<String> {
    vec!["failed".to_string(), "error".to_string()]
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_max_wait_secs() -> u64 {
    3600
}

impl BulkJobConfig {
    /// Endpoint with default settings
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            since_field: default_since_field(),
            job_id_pointer: default_id_pointer(),
            status_pointer: default_status_pointer(),
            download_pointer: default_download_pointer(),
            error_pointer: default_error_pointer(),
            finished_statuses: default_finished_statuses(),
            failed_statuses: default_failed_statuses(),
            id_pointer: default_id_pointer(),
            poll_interval_secs: default_poll_interval_secs(),
            max_wait_secs: default_max_wait_secs(),
            initial_since: 0,
        }
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.poll_interval_secs == 0 {
            return Err(HarvestError::Config("poll_interval_secs must be positive".to_string()));
        }
        if self.max_wait_secs < self.poll_interval_secs {
            return Err(HarvestError::Config("max_wait_secs must be at least poll_interval_secs".to_string()));
        }
        if self.finished_statuses.is_empty() {
            return Err(HarvestError::Config("finished_statuses must not be empty".to_string()));
        }
        Ok(())
    }

    fn job_url(&self, job_id: &str) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), job_id)
    }
}

/// Read a poll reply into a status
fn parse_status(body: &Value, config: &BulkJobConfig) -> Result<JobStatus, HarvestError> {
    let status = string_at(body, &config.status_pointer)
        .ok_or_else(|| HarvestError::malformed(format!("no status at '{}'", config.status_pointer)))?
        .to_lowercase();

    if config.finished_statuses.iter().any(|s| s.eq_ignore_ascii_case(&status)) {
        let download_url = string_at(body, &config.download_pointer)
            .ok_or_else(|| HarvestError::malformed(format!("finished job without '{}'", config.download_pointer)))?;
        Ok(JobStatus::Finished { download_url })
    } else if config.failed_statuses.iter().any(|s| s.eq_ignore_ascii_case(&status)) {
        let reason = string_at(body, &config.error_pointer).unwrap_or(status);
        Ok(JobStatus::Error(reason))
    } else {
        Ok(JobStatus::Pending)
    }
}

/// Unpack a bulk archive: a JSON array or newline-delimited JSON
pub fn parse_archive(text: &str, id_pointer: &str) -> Result<Vec<RawRecord>, HarvestError> {
    let trimmed = text.trim_start();
    let items: Vec<Value> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| HarvestError::malformed(format!("archive: {}", e)))?
    } else {
        trimmed
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line).map_err(|e| HarvestError::malformed(format!("archive line {}: {}", n + 1, e)))
            })
            .collect::<Result<_, _>>()?
    };
    Ok(super::to_records(items, id_pointer))
}

/// [`BulkJobApi`] over HTTP, with retries through a [`PageFetcher`]
pub struct HttpBulkJobApi {
    config: BulkJobConfig,
    fetcher: PageFetcher,
}

impl HttpBulkJobApi {
    /// Create the API client
    pub fn new(config: BulkJobConfig, fetcher: PageFetcher) -> Self {
        Self { config, fetcher }
    }
}

#[async_trait]
impl BulkJobApi for HttpBulkJobApi {
    async fn submit(&self, since: i64) -> Result<String, HarvestError> {
        let mut body = serde_json::Map::new();
        body.insert(self.config.since_field.clone(), json!(since));
        self.fetcher
            .post(&self.config.url, &Value::Object(body), |reply| {
                string_at(&reply, &self.config.job_id_pointer)
                    .ok_or_else(|| HarvestError::malformed(format!("no job id at '{}'", self.config.job_id_pointer)))
            })
            .await
    }

    async fn status(&self, job_id: &str) -> Result<JobStatus, HarvestError> {
        self.fetcher
            .get(&self.config.job_url(job_id), &[], |reply| parse_status(&reply, &self.config))
            .await
    }

    async fn download(&self, download_url: &str) -> Result<Vec<RawRecord>, HarvestError> {
        self.fetcher
            .get_text(download_url, |text| parse_archive(&text, &self.config.id_pointer))
            .await
    }

    async fn delete(&self, job_id: &str) -> Result<(), HarvestError> {
        self.fetcher.delete(&self.config.job_url(job_id)).await
    }
}

/// Next action for a non-terminal state
enum Step {
    StartPolling,
    Poll { wait: bool },
    Download(String),
    Cleanup,
}

/// Connector driving one bulk job per unit
///
/// Cursor kind is timestamp: a job asks for records modified since the
/// cursor, and the next cursor is the job's submission time.
pub struct BulkJobConnector {
    source_id: String,
    api: Box<dyn BulkJobApi>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    max_wait: ChronoDuration,
    initial_since: i64,
}

impl BulkJobConnector {
    /// Create a connector
    pub fn new(
        source_id: impl Into<String>,
        api: Box<dyn BulkJobApi>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
        max_wait: Duration,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            api,
            clock,
            poll_interval,
            max_wait: ChronoDuration::from_std(max_wait).unwrap_or(ChronoDuration::MAX),
            initial_since: 0,
        }
    }

    /// "Modified since" used when no checkpoint exists
    pub fn with_initial_since(mut self, since: i64) -> Self {
        self.initial_since = since;
        self
    }
}

#[async_trait]
impl SourceConnector for BulkJobConnector {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn cursor_kind(&self) -> CursorKind {
        CursorKind::Timestamp
    }

    fn initial_cursor(&self) -> CursorValue {
        CursorValue::Timestamp(self.initial_since)
    }

    #[tracing::instrument(level = "debug", skip(self), fields(source = %self.source_id))]
    async fn fetch_page(&self, cursor: &CursorValue) -> Result<ExtractionUnit, HarvestError> {
        expect_kind(CursorKind::Timestamp, cursor)?;
        let since = match cursor {
            CursorValue::Timestamp(ts) => *ts,
            _ => self.initial_since,
        };

        let submitted_at = self.clock.now();
        let job_id = self.api.submit(since).await?;
        info!("Submitted bulk job {} for records since {}", job_id, since);

        let mut state = JobState::submitted(job_id.clone(), submitted_at, self.max_wait).on(JobEvent::PollStarted, submitted_at)?;
        let mut records = Vec::new();

        loop {
            let step = match &state {
                JobState::Submitted { .. } => Step::StartPolling,
                JobState::Polling { polls, .. } => Step::Poll { wait: *polls > 0 },
                JobState::Ready { download_url, .. } => Step::Download(download_url.clone()),
                JobState::Downloaded { .. } => Step::Cleanup,
                JobState::Deleted { .. } => break,
                JobState::Failed { reason, timed_out, .. } => {
                    return Err(if *timed_out {
                        HarvestError::JobTimeout {
                            job_id,
                            waited_secs: (self.clock.now() - submitted_at).num_seconds(),
                        }
                    } else {
                        HarvestError::Provider(format!("bulk job {} failed: {}", job_id, reason))
                    });
                }
            };

            let event = match step {
                Step::StartPolling => JobEvent::PollStarted,
                Step::Poll { wait } => {
                    if wait {
                        self.clock.sleep(self.poll_interval).await;
                    }
                    match self.api.status(&job_id).await {
                        Ok(status) => JobEvent::Status(status),
                        Err(HarvestError::Provider(reason)) => JobEvent::ProviderError(reason),
                        Err(e) => return Err(e),
                    }
                }
                Step::Download(download_url) => match self.api.download(&download_url).await {
                    Ok(downloaded) => {
                        records = downloaded;
                        JobEvent::Downloaded { records: records.len() }
                    }
                    Err(HarvestError::Provider(reason)) => JobEvent::ProviderError(reason),
                    Err(e) => return Err(e),
                },
                Step::Cleanup => match self.api.delete(&job_id).await {
                    Ok(()) => JobEvent::Cleaned,
                    Err(e) => {
                        warn!("Cleanup of bulk job {} failed: {}", job_id, e);
                        JobEvent::CleanupFailed(e.to_string())
                    }
                },
            };

            state = state.on(event, self.clock.now())?;
            debug!("Bulk job {} is {}", job_id, state.name());
        }

        Ok(ExtractionUnit::new(
            records,
            CursorValue::Timestamp(submitted_at.timestamp().max(since)),
            true,
        ))
    }
}
