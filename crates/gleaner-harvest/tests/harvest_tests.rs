//! Integration tests for gleaner-harvest
//!
//! These drive whole runs: connector, raw sink and checkpoint store together,
//! against scripted provider responses and a manual clock.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use gleaner_domain::traits::CheckpointStore;
use gleaner_domain::{Checkpoint, CheckpointKey, CursorKind, CursorValue, RawRecord};
use gleaner_harvest::connectors::{
    BulkJobApi, BulkJobConnector, CursorConfig, CursorConnector, JobStatus, OffsetConfig, OffsetConnector,
    WindowedConfig, WindowedConnector,
};
use gleaner_harvest::{
    Clock, ExtractionDriver, HarvestError, JsonDirSink, ManualClock, PageFetcher, RawSink, RetryPolicy, RunId,
    RunOutcome, ScriptedTransport, WindowStep,
};
use gleaner_store::catalogue::default_catalogue;
use gleaner_store::{FileCheckpointStore, SqliteStore};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 15, 9, 0, 0).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn offset_connector(transport: Arc<ScriptedTransport>, clock: Arc<ManualClock>, retry: RetryPolicy) -> OffsetConnector {
    let fetcher = PageFetcher::new(transport, clock, retry);
    let config = OffsetConfig {
        page_size: 2,
        ..OffsetConfig::new("http://api.example/projects")
    };
    OffsetConnector::new("cordis", config, fetcher).unwrap()
}

fn page(total: u64, ids: &[&str]) -> serde_json::Value {
    let items: Vec<_> = ids.iter().map(|id| json!({"id": id, "title": format!("Project {}", id)})).collect();
    json!({"total": total, "items": items})
}

/// Sink that refuses every write
struct BrokenSink;

impl RawSink for BrokenSink {
    fn write_unit(&mut self, _: &RunId, _: &CheckpointKey, _: &CursorValue, _: &[RawRecord]) -> Result<(), HarvestError> {
        Err(HarvestError::Sink("disk full".to_string()))
    }
}

#[tokio::test]
async fn test_offset_run_completes_and_persists() {
    let checkpoints_dir = TempDir::new().unwrap();
    let raw_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond(page(5, &["a", "b"]))
            .respond(page(5, &["c", "d"]))
            .respond(page(5, &["e"])),
    );

    let mut driver = ExtractionDriver::new(
        Box::new(offset_connector(transport.clone(), clock.clone(), RetryPolicy::none())),
        FileCheckpointStore::new(checkpoints_dir.path()),
        Box::new(JsonDirSink::new(raw_dir.path())),
        clock,
        "projects",
    );
    let report = driver.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(report.is_success());
    assert_eq!(report.units_completed, 3);
    assert_eq!(report.records, 5);
    assert_eq!(report.start_cursor, "0");
    assert_eq!(report.final_cursor, "5");
    assert_eq!(transport.remaining(), 0);

    let store = FileCheckpointStore::new(checkpoints_dir.path());
    let saved = store
        .load(&CheckpointKey::new("cordis", "projects"), CursorKind::Offset)
        .unwrap()
        .unwrap();
    assert_eq!(saved.cursor, CursorValue::Offset(5));

    let files = std::fs::read_dir(raw_dir.path().join("cordis")).unwrap().count();
    assert_eq!(files, 3);
}

#[tokio::test]
async fn test_run_resumes_from_stored_checkpoint() {
    let checkpoints_dir = TempDir::new().unwrap();
    let raw_dir = TempDir::new().unwrap();
    let mut store = FileCheckpointStore::new(checkpoints_dir.path());
    store
        .save(&Checkpoint::new(CheckpointKey::new("cordis", "projects"), CursorValue::Offset(4)))
        .unwrap();

    let clock = Arc::new(ManualClock::new(t0()));
    let transport = Arc::new(ScriptedTransport::new().respond(page(5, &["e"])));
    let mut driver = ExtractionDriver::new(
        Box::new(offset_connector(transport.clone(), clock.clone(), RetryPolicy::none())),
        store,
        Box::new(JsonDirSink::new(raw_dir.path())),
        clock,
        "projects",
    );
    let report = driver.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.start_cursor, "4");
    assert_eq!(report.units_completed, 1);
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].param("offset"), Some("4"));
}

#[tokio::test]
async fn test_exhausted_retries_leave_checkpoint_at_last_unit() {
    let raw_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond(page(5, &["a", "b"]))
            .fail(HarvestError::Transient("HTTP 503".into()))
            .fail(HarvestError::Transient("HTTP 503".into()))
            .fail(HarvestError::Transient("HTTP 503".into())),
    );
    let retry = RetryPolicy {
        max_retries: 2,
        ..RetryPolicy::default()
    };

    let mut driver = ExtractionDriver::new(
        Box::new(offset_connector(transport.clone(), clock.clone(), retry)),
        SqliteStore::new(":memory:", default_catalogue()).unwrap(),
        Box::new(JsonDirSink::new(raw_dir.path())),
        clock.clone(),
        "projects",
    );
    let report = driver.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert!(!report.is_success());
    assert_eq!(report.units_completed, 1);
    assert_eq!(report.units_failed, 1);
    assert!(report.error.as_deref().unwrap().contains("3 attempts"));
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(1), Duration::from_secs(2)]);

    let saved = driver
        .checkpoints()
        .load(&CheckpointKey::new("cordis", "projects"), CursorKind::Offset)
        .unwrap()
        .unwrap();
    assert_eq!(saved.cursor, CursorValue::Offset(2));
}

#[tokio::test]
async fn test_sink_failure_does_not_advance_checkpoint() {
    let checkpoints_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let transport = Arc::new(ScriptedTransport::new().respond(page(5, &["a", "b"])));

    let mut driver = ExtractionDriver::new(
        Box::new(offset_connector(transport, clock.clone(), RetryPolicy::none())),
        FileCheckpointStore::new(checkpoints_dir.path()),
        Box::new(BrokenSink),
        clock,
        "projects",
    );
    let report = driver.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(report.units_completed, 0);
    assert!(report.error.as_deref().unwrap().contains("disk full"));
    let saved = driver
        .checkpoints()
        .load(&CheckpointKey::new("cordis", "projects"), CursorKind::Offset)
        .unwrap();
    assert!(saved.is_none());
}

#[tokio::test]
async fn test_cancelled_before_first_unit() {
    let raw_dir = TempDir::new().unwrap();
    let checkpoints_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let transport = Arc::new(ScriptedTransport::new().respond(page(5, &["a", "b"])));

    let mut driver = ExtractionDriver::new(
        Box::new(offset_connector(transport.clone(), clock.clone(), RetryPolicy::none())),
        FileCheckpointStore::new(checkpoints_dir.path()),
        Box::new(JsonDirSink::new(raw_dir.path())),
        clock,
        "projects",
    );
    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = driver.run(&cancel).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert!(report.is_success());
    assert_eq!(report.units_completed, 0);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_unit_limit_stops_between_units() {
    let raw_dir = TempDir::new().unwrap();
    let checkpoints_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond(page(5, &["a", "b"]))
            .respond(page(5, &["c", "d"])),
    );

    let mut driver = ExtractionDriver::new(
        Box::new(offset_connector(transport.clone(), clock.clone(), RetryPolicy::none())),
        FileCheckpointStore::new(checkpoints_dir.path()),
        Box::new(JsonDirSink::new(raw_dir.path())),
        clock,
        "projects",
    )
    .with_max_units(Some(1));
    let report = driver.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::UnitLimit);
    assert_eq!(report.units_completed, 1);
    assert_eq!(report.final_cursor, "2");
    assert_eq!(transport.remaining(), 1);
}

#[tokio::test]
async fn test_cursor_run_keeps_last_token() {
    let raw_dir = TempDir::new().unwrap();
    let checkpoints_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond(json!({"items": [{"id": "W1"}], "next_cursor": "tok-2"}))
            .respond(json!({"items": [{"id": "W2"}], "next_cursor": null})),
    );
    let fetcher = PageFetcher::new(transport.clone(), clock.clone(), RetryPolicy::none());
    let connector = CursorConnector::new("openalex", CursorConfig::new("http://api.example/works"), fetcher).unwrap();

    let mut driver = ExtractionDriver::new(
        Box::new(connector),
        FileCheckpointStore::new(checkpoints_dir.path()),
        Box::new(JsonDirSink::new(raw_dir.path())),
        clock,
        "works",
    );
    let report = driver.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.units_completed, 2);
    assert_eq!(report.start_cursor, "*");
    assert_eq!(report.final_cursor, "tok-2");
    assert_eq!(transport.requests()[1].param("cursor"), Some("tok-2"));
}

fn windowed_connector(transport: Arc<ScriptedTransport>, clock: Arc<ManualClock>) -> WindowedConnector {
    let fetcher = PageFetcher::new(transport, clock, RetryPolicy::none());
    let config = WindowedConfig {
        paging: OffsetConfig::new("http://api.example/projects"),
        from_param: "from".to_string(),
        to_param: "to".to_string(),
        date_format: "%Y-%m-%d".to_string(),
        start: date(2000, 1, 1),
        range: WindowStep::Years(5),
        lookback: WindowStep::Years(5),
        future_horizon: WindowStep::Years(10),
    };
    WindowedConnector::new("cordis", config, fetcher).unwrap()
}

#[tokio::test]
async fn test_window_past_horizon_resets_and_ends_run() {
    let raw_dir = TempDir::new().unwrap();
    let checkpoints_dir = TempDir::new().unwrap();
    let mut store = FileCheckpointStore::new(checkpoints_dir.path());
    let key = CheckpointKey::new("cordis", "projects");
    store
        .save(&Checkpoint::new(key.clone(), CursorValue::Window(date(2030, 1, 1))))
        .unwrap();

    // Today is 2025-06-15: the 2035 window still starts inside the ten-year
    // horizon, the 2040 one does not.
    let clock = Arc::new(ManualClock::new(t0()));
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond(page(1, &["p-2030"]))
            .respond(page(0, &[])),
    );
    let mut driver = ExtractionDriver::new(
        Box::new(windowed_connector(transport.clone(), clock.clone())),
        store,
        Box::new(JsonDirSink::new(raw_dir.path())),
        clock,
        "projects",
    );
    let report = driver.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(report.reset);
    assert_eq!(report.units_completed, 2);
    assert_eq!(report.records, 1);
    assert_eq!(report.start_cursor, "2030-01-01");
    assert_eq!(report.final_cursor, "2020-01-01");

    let requests = transport.requests();
    assert_eq!(requests[0].param("from"), Some("2030-01-01"));
    assert_eq!(requests[0].param("to"), Some("2034-12-31"));
    assert_eq!(requests[1].param("from"), Some("2035-01-01"));

    let saved = driver.checkpoints().load(&key, CursorKind::DateWindow).unwrap().unwrap();
    assert_eq!(saved.cursor, CursorValue::Window(date(2020, 1, 1)));
}

#[tokio::test]
async fn test_window_within_horizon_keeps_advancing() {
    let raw_dir = TempDir::new().unwrap();
    let checkpoints_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let transport = Arc::new(ScriptedTransport::new().respond(page(0, &[])).respond(page(0, &[])));

    let mut driver = ExtractionDriver::new(
        Box::new(windowed_connector(transport, clock.clone())),
        FileCheckpointStore::new(checkpoints_dir.path()),
        Box::new(JsonDirSink::new(raw_dir.path())),
        clock,
        "projects",
    )
    .with_max_units(Some(2));
    let report = driver.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::UnitLimit);
    assert!(!report.reset);
    assert_eq!(report.final_cursor, "2010-01-01");
}

/// Bulk job API answering from a script of statuses
struct FakeBulkApi {
    statuses: Mutex<VecDeque<JobStatus>>,
    records: Vec<RawRecord>,
    fail_delete: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeBulkApi {
    fn new(statuses: Vec<JobStatus>, fail_delete: bool) -> (Self, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let api = Self {
            statuses: Mutex::new(statuses.into()),
            records: vec![
                RawRecord::new("10.1/a", json!({"DOI": "10.1/a"})),
                RawRecord::new("10.1/b", json!({"DOI": "10.1/b"})),
            ],
            fail_delete,
            calls: calls.clone(),
        };
        (api, calls)
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl BulkJobApi for FakeBulkApi {
    async fn submit(&self, since: i64) -> Result<String, HarvestError> {
        self.log(format!("submit {}", since));
        Ok("job-7".to_string())
    }

    async fn status(&self, job_id: &str) -> Result<JobStatus, HarvestError> {
        self.log(format!("status {}", job_id));
        Ok(self.statuses.lock().unwrap().pop_front().unwrap_or(JobStatus::Pending))
    }

    async fn download(&self, download_url: &str) -> Result<Vec<RawRecord>, HarvestError> {
        self.log(format!("download {}", download_url));
        Ok(self.records.clone())
    }

    async fn delete(&self, job_id: &str) -> Result<(), HarvestError> {
        self.log(format!("delete {}", job_id));
        if self.fail_delete {
            Err(HarvestError::Provider("HTTP 500".to_string()))
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn test_bulk_job_run_survives_cleanup_failure() {
    let raw_dir = TempDir::new().unwrap();
    let checkpoints_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let (api, calls) = FakeBulkApi::new(
        vec![
            JobStatus::Pending,
            JobStatus::Finished {
                download_url: "http://export.example/job-7.ndjson".to_string(),
            },
        ],
        true,
    );
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let connector = BulkJobConnector::new("crossref", Box::new(api), dyn_clock, Duration::from_secs(30), Duration::from_secs(600))
        .with_initial_since(1_700_000_000);

    let mut driver = ExtractionDriver::new(
        Box::new(connector),
        FileCheckpointStore::new(checkpoints_dir.path()),
        Box::new(JsonDirSink::new(raw_dir.path())),
        clock.clone(),
        "works",
    );
    let report = driver.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.units_completed, 1);
    assert_eq!(report.records, 2);
    assert_eq!(report.final_cursor, t0().timestamp().to_string());
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(30)]);
    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            "submit 1700000000",
            "status job-7",
            "status job-7",
            "download http://export.example/job-7.ndjson",
            "delete job-7",
        ]
    );
}

#[tokio::test]
async fn test_bulk_job_timeout_fails_unit() {
    let raw_dir = TempDir::new().unwrap();
    let checkpoints_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let (api, calls) = FakeBulkApi::new(Vec::new(), false);
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let connector = BulkJobConnector::new("crossref", Box::new(api), dyn_clock, Duration::from_secs(25), Duration::from_secs(60));

    let mut driver = ExtractionDriver::new(
        Box::new(connector),
        FileCheckpointStore::new(checkpoints_dir.path()),
        Box::new(JsonDirSink::new(raw_dir.path())),
        clock,
        "works",
    );
    let report = driver.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(report.units_failed, 1);
    assert!(report.error.as_deref().unwrap().contains("job-7 not finished after 75s"));
    assert!(!calls.lock().unwrap().iter().any(|c| c.starts_with("download")));

    let saved = driver
        .checkpoints()
        .load(&CheckpointKey::new("crossref", "works"), CursorKind::Timestamp)
        .unwrap();
    assert!(saved.is_none());
}
