//! Opaque cursor-token paging for deep result sets

use super::{default_id_pointer, default_items_pointer, default_page_size, query_with, to_records};
use crate::connector::{expect_kind, SourceConnector};
use crate::error::HarvestError;
use crate::fetcher::{array_at, string_at, PageFetcher};
use async_trait::async_trait;
use gleaner_domain::{CursorKind, CursorValue, ExtractionUnit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Cursor-token endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorConfig {
    /// Search endpoint
    pub url: String,

    /// Records per request
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Name of the cursor parameter
    #[serde(default = "default_cursor_param")]
    pub cursor_param: String,

    /// Name of the page size parameter
    #[serde(default = "default_size_param")]
    pub size_param: String,

    /// Token that starts a fresh traversal
    #[serde(default = "default_initial_token")]
    pub initial_token: String,

    /// Pointer to the items array
    #[serde(default = "default_items_pointer")]
    pub items_pointer: String,

    /// Pointer to the next token
    #[serde(default = "default_next_pointer")]
    pub next_pointer: String,

    /// Pointer to an item's id
    #[serde(default = "default_id_pointer")]
    pub id_pointer: String,

    /// Static query parameters
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

fn default_cursor_param() -> String {
    "cursor".to_string()
}

fn default_size_param() -> String {
    "rows".to_string()
}

fn default_initial_token() -> String {
    "*".to_string()
}

fn default_next_pointer() -> String {
    "/next_cursor".to_string()
}

impl CursorConfig {
    /// Endpoint with default settings
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            page_size: default_page_size(),
            cursor_param: default_cursor_param(),
            size_param: default_size_param(),
            initial_token: default_initial_token(),
            items_pointer: default_items_pointer(),
            next_pointer: default_next_pointer(),
            id_pointer: default_id_pointer(),
            params: BTreeMap::new(),
        }
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.page_size == 0 {
            return Err(HarvestError::Config("page_size must be greater than 0".to_string()));
        }
        if self.initial_token.trim().is_empty() {
            return Err(HarvestError::Config("initial_token must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Connector for cursor-token endpoints
///
/// Done when the provider stops returning a next token (or returns an empty
/// page); the last token is kept so the next run resumes from it.
pub struct CursorConnector {
    source_id: String,
    config: CursorConfig,
    fetcher: PageFetcher,
}

impl CursorConnector {
    /// Create a connector
    pub fn new(source_id: impl Into<String>, config: CursorConfig, fetcher: PageFetcher) -> Result<Self, HarvestError> {
        config.validate()?;
        Ok(Self {
            source_id: source_id.into(),
            config,
            fetcher,
        })
    }
}

#[async_trait]
impl SourceConnector for CursorConnector {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn cursor_kind(&self) -> CursorKind {
        CursorKind::CursorToken
    }

    fn initial_cursor(&self) -> CursorValue {
        CursorValue::Token(self.config.initial_token.clone())
    }

    #[tracing::instrument(level = "debug", skip(self), fields(source = %self.source_id))]
    async fn fetch_page(&self, cursor: &CursorValue) -> Result<ExtractionUnit, HarvestError> {
        expect_kind(CursorKind::CursorToken, cursor)?;
        let token = cursor.to_scalar();

        let query = query_with(
            &self.config.params,
            &[
                (self.config.cursor_param.as_str(), token.clone()),
                (self.config.size_param.as_str(), self.config.page_size.to_string()),
            ],
        );
        let (items, next) = self
            .fetcher
            .get(&self.config.url, &query, |body| {
                let items = array_at(&body, &self.config.items_pointer)?.clone();
                Ok((items, string_at(&body, &self.config.next_pointer)))
            })
            .await?;

        debug!("{} items, next token present: {}", items.len(), next.is_some());
        let unit = match next {
            Some(next) if !items.is_empty() => {
                ExtractionUnit::new(to_records(items, &self.config.id_pointer), CursorValue::Token(next), false)
            }
            _ => ExtractionUnit::new(to_records(items, &self.config.id_pointer), CursorValue::Token(token), true),
        };
        Ok(unit)
    }
}
