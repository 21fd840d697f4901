//! Raw output persistence

use crate::driver::RunId;
use crate::error::HarvestError;
use gleaner_domain::{CheckpointKey, CursorValue, RawRecord};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Destination for the raw records of each completed unit
///
/// A write must be durable before it returns: the driver advances the
/// checkpoint right after.
pub trait RawSink: Send {
    /// Persist the records of the unit fetched at `cursor`
    fn write_unit(
        &mut self,
        run_id: &RunId,
        key: &CheckpointKey,
        cursor: &CursorValue,
        records: &[RawRecord],
    ) -> Result<(), HarvestError>;
}

#[derive(Serialize)]
struct UnitDocument<'a> {
    source_id: &'a str,
    query_id: &'a str,
    run_id: String,
    cursor: String,
    records: &'a [RawRecord],
}

/// Writes one JSON document per non-empty unit under `<root>/<source_id>/`
///
/// Files are named `<query_id>@<cursor>.json` after the cursor the unit was
/// fetched at, so harvesting a unit again replaces its earlier document.
/// Writes go through a temporary file, so a reader never sees a partial
/// document.
#[derive(Debug, Clone)]
pub struct JsonDirSink {
    root: PathBuf,
}

impl JsonDirSink {
    /// Create a sink rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl RawSink for JsonDirSink {
    fn write_unit(
        &mut self,
        run_id: &RunId,
        key: &CheckpointKey,
        cursor: &CursorValue,
        records: &[RawRecord],
    ) -> Result<(), HarvestError> {
        if records.is_empty() {
            return Ok(());
        }

        let dir = self.root.join(&key.source_id);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!(
            "{}@{}.json",
            file_component(&key.query_id),
            file_component(&cursor.to_scalar())
        ));
        let tmp = path.with_extension("json.tmp");

        let document = UnitDocument {
            source_id: &key.source_id,
            query_id: &key.query_id,
            run_id: run_id.to_string(),
            cursor: cursor.to_scalar(),
            records,
        };
        let body = serde_json::to_vec_pretty(&document).map_err(|e| HarvestError::Sink(e.to_string()))?;
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &path)?;

        debug!("Wrote {} records to {}", records.len(), path.display());
        Ok(())
    }
}

/// Percent-encode everything but `[A-Za-z0-9_.-]`, keeping distinct values distinct
fn file_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'.' | b'-') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_writes_one_document_per_unit() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonDirSink::new(dir.path());
        let run_id = RunId::new();
        let key = CheckpointKey::new("cordis", "projects");
        let records = vec![RawRecord::new("a", json!({"title": "A"}))];

        sink.write_unit(&run_id, &key, &CursorValue::Offset(0), &records).unwrap();
        sink.write_unit(&run_id, &key, &CursorValue::Offset(1), &[]).unwrap();

        let files: Vec<_> = fs::read_dir(dir.path().join("cordis")).unwrap().collect();
        assert_eq!(files.len(), 1);

        let path = files[0].as_ref().unwrap().path();
        assert_eq!(path.file_name().unwrap(), "projects@0.json");
        let doc: serde_json::Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(doc["cursor"], "0");
        assert_eq!(doc["query_id"], "projects");
        assert_eq!(doc["records"][0]["payload"]["title"], "A");
        assert_eq!(doc["run_id"], run_id.to_string());
    }

    #[test]
    fn test_reharvested_unit_replaces_its_document() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonDirSink::new(dir.path());
        let key = CheckpointKey::new("cordis", "projects");
        let window = CursorValue::Window(chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());

        sink.write_unit(&RunId::new(), &key, &window, &[RawRecord::new("a", json!({"v": 1}))])
            .unwrap();
        let second = RunId::new();
        sink.write_unit(&second, &key, &window, &[RawRecord::new("a", json!({"v": 2}))])
            .unwrap();

        let files: Vec<_> = fs::read_dir(dir.path().join("cordis")).unwrap().collect();
        assert_eq!(files.len(), 1);
        let path = files[0].as_ref().unwrap().path();
        assert_eq!(path.file_name().unwrap(), "projects@2020-01-01.json");
        let doc: serde_json::Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(doc["run_id"], second.to_string());
        assert_eq!(doc["records"][0]["payload"]["v"], 2);
    }

    #[test]
    fn test_token_cursors_become_safe_file_names() {
        assert_eq!(file_component("2020-01-01"), "2020-01-01");
        assert_eq!(file_component("a/b"), "a%2Fb");
        assert_eq!(file_component("q@x%y"), "q%40x%25y");
        assert_ne!(file_component("a/b"), file_component("a_b"));
    }
}
