//! Connector implementations, one per pagination protocol

pub mod bulk;
pub mod cursor;
pub mod offset;
pub mod windowed;

pub use bulk::{BulkJobApi, BulkJobConfig, BulkJobConnector, HttpBulkJobApi, JobEvent, JobState, JobStatus};
pub use cursor::{CursorConfig, CursorConnector};
pub use offset::{OffsetConfig, OffsetConnector};
pub use windowed::{WindowedConfig, WindowedConnector};

use gleaner_domain::RawRecord;
use serde_json::Value;
use std::collections::BTreeMap;

/// Turn provider items into raw records, reading the id through a JSON pointer
pub(crate) fn to_records(items: Vec<Value>, id_pointer: &str) -> Vec<RawRecord> {
    items
        .into_iter()
        .map(|item| {
            let id = crate::fetcher::string_at(&item, id_pointer).unwrap_or_default();
            RawRecord::new(id, item)
        })
        .collect()
}

/// Static query parameters followed by the per-call ones
pub(crate) fn query_with(params: &BTreeMap<String, String>, extra: &[(&str, String)]) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .chain(extra.iter().map(|(k, v)| (k.to_string(), v.clone())))
        .collect()
}

pub(crate) fn default_page_size() -> u64 {
    100
}

pub(crate) fn default_items_pointer() -> String {
    "/items".to_string()
}

pub(crate) fn default_id_pointer() -> String {
    "/id".to_string()
}
