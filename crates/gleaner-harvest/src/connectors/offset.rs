//! Offset/limit paging over a result set of known size

use super::{default_id_pointer, default_items_pointer, default_page_size, query_with, to_records};
use crate::connector::{expect_kind, SourceConnector};
use crate::error::HarvestError;
use crate::fetcher::{array_at, u64_at, PageFetcher};
use async_trait::async_trait;
use gleaner_domain::{CursorKind, CursorValue, ExtractionUnit};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Offset/limit endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetConfig {
    /// Search endpoint
    pub url: String,

    /// Records per request
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Name of the offset parameter
    #[serde(default = "default_offset_param")]
    pub offset_param: String,

    /// Name of the limit parameter
    #[serde(default = "default_limit_param")]
    pub limit_param: String,

    /// Pointer to the items array
    #[serde(default = "default_items_pointer")]
    pub items_pointer: String,

    /// Pointer to the total result count
    #[serde(default = "default_total_pointer")]
    pub total_pointer: String,

    /// Pointer to an item's id
    #[serde(default = "default_id_pointer")]
    pub id_pointer: String,

    /// Static query parameters
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

fn default_offset_param() -> String {
    "offset".to_string()
}

fn default_limit_param() -> String {
    "limit".to_string()
}

fn default_total_pointer() -> String {
    "/total".to_string()
}

impl OffsetConfig {
    /// Endpoint with default paging settings
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            page_size: default_page_size(),
            offset_param: default_offset_param(),
            limit_param: default_limit_param(),
            items_pointer: default_items_pointer(),
            total_pointer: default_total_pointer(),
            id_pointer: default_id_pointer(),
            params: BTreeMap::new(),
        }
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.page_size == 0 {
            return Err(HarvestError::Config("page_size must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// One page of an offset-paged result set
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OffsetPage {
    pub items: Vec<Value>,
    pub total: u64,
}

/// Fetch the page at `offset`, adding `extra` query parameters
pub(crate) async fn fetch_offset_page(
    fetcher: &PageFetcher,
    config: &OffsetConfig,
    offset: u64,
    extra: &[(&str, String)],
) -> Result<OffsetPage, HarvestError> {
    let mut per_call = vec![
        (config.offset_param.as_str(), offset.to_string()),
        (config.limit_param.as_str(), config.page_size.to_string()),
    ];
    per_call.extend(extra.iter().cloned());
    let query = query_with(&config.params, &per_call);

    fetcher
        .get(&config.url, &query, |body| {
            Ok(OffsetPage {
                items: array_at(&body, &config.items_pointer)?.clone(),
                total: u64_at(&body, &config.total_pointer)?,
            })
        })
        .await
}

/// Connector for offset/limit endpoints
///
/// Done when `offset + limit >= total`. The next cursor is the offset after
/// the records actually received, capped at the total.
pub struct OffsetConnector {
    source_id: String,
    config: OffsetConfig,
    fetcher: PageFetcher,
}

impl OffsetConnector {
    /// Create a connector
    pub fn new(source_id: impl Into<String>, config: OffsetConfig, fetcher: PageFetcher) -> Result<Self, HarvestError> {
        config.validate()?;
        Ok(Self {
            source_id: source_id.into(),
            config,
            fetcher,
        })
    }
}

#[async_trait]
impl SourceConnector for OffsetConnector {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn cursor_kind(&self) -> CursorKind {
        CursorKind::Offset
    }

    fn initial_cursor(&self) -> CursorValue {
        CursorValue::Offset(0)
    }

    #[tracing::instrument(level = "debug", skip(self), fields(source = %self.source_id))]
    async fn fetch_page(&self, cursor: &CursorValue) -> Result<ExtractionUnit, HarvestError> {
        expect_kind(CursorKind::Offset, cursor)?;
        let offset = match cursor {
            CursorValue::Offset(offset) => *offset,
            _ => 0,
        };

        let page = fetch_offset_page(&self.fetcher, &self.config, offset, &[]).await?;
        let received = page.items.len() as u64;
        let next = offset.saturating_add(received).min(page.total).max(offset);
        let done = offset.saturating_add(self.config.page_size) >= page.total || received == 0;
        debug!("offset {}: {} items of {}, next {}", offset, received, page.total, next);

        Ok(ExtractionUnit::new(
            to_records(page.items, &self.config.id_pointer),
            CursorValue::Offset(next),
            done,
        ))
    }
}
