//! Date-windowed harvesting
//!
//! One unit is one whole window `[start, start + range)`, fetched through
//! offset paging with the window bounds as query parameters. The driver
//! decides where the cursor goes next (see [`crate::window`]).

use super::offset::{fetch_offset_page, OffsetConfig};
use super::to_records;
use crate::connector::{expect_kind, SourceConnector};
use crate::error::HarvestError;
use crate::fetcher::PageFetcher;
use crate::window::{WindowPlan, WindowStep};
use async_trait::async_trait;
use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use gleaner_domain::{CursorKind, CursorValue, ExtractionUnit};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use tracing::debug;

/// Windowed endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowedConfig {
    /// Paging within a window
    #[serde(flatten)]
    pub paging: OffsetConfig,

    /// Name of the window start parameter
    #[serde(default = "default_from_param")]
    pub from_param: String,

    /// Name of the (inclusive) window end parameter
    #[serde(default = "default_to_param")]
    pub to_param: String,

    /// `chrono` format of the window bounds
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// First window start
    pub start: NaiveDate,

    /// Window length
    pub range: WindowStep,

    /// How far back a reset lands
    #[serde(default = "default_lookback")]
    pub lookback: WindowStep,

    /// How far past today windows may start
    #[serde(default = "default_future_horizon")]
    pub future_horizon: WindowStep,
}

fn default_from_param() -> String {
    "from".to_string()
}

fn default_to_param() -> String {
    "to".to_string()
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_lookback() -> WindowStep {
    WindowStep::Years(5)
}

fn default_future_horizon() -> WindowStep {
    WindowStep::Years(10)
}

impl WindowedConfig {
    /// Window progression described by this config
    pub fn plan(&self) -> WindowPlan {
        WindowPlan {
            start: self.start,
            range: self.range,
            lookback: self.lookback,
            future_horizon: self.future_horizon,
        }
    }

    /// Check paging, window progression and the bound format
    pub fn validate(&self) -> Result<(), HarvestError> {
        self.paging.validate()?;
        self.plan().validate()?;
        if StrftimeItems::new(&self.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(HarvestError::Config(format!("invalid date_format '{}'", self.date_format)));
        }
        Ok(())
    }
}

/// Connector for date-windowed endpoints
pub struct WindowedConnector {
    source_id: String,
    config: WindowedConfig,
    plan: WindowPlan,
    fetcher: PageFetcher,
}

impl WindowedConnector {
    /// Create a connector
    pub fn new(source_id: impl Into<String>, config: WindowedConfig, fetcher: PageFetcher) -> Result<Self, HarvestError> {
        config.validate()?;
        let plan = config.plan();
        Ok(Self {
            source_id: source_id.into(),
            config,
            plan,
            fetcher,
        })
    }

    fn format_bound(&self, date: NaiveDate) -> Result<String, HarvestError> {
        let mut out = String::new();
        write!(out, "{}", date.format(&self.config.date_format))
            .map_err(|_| HarvestError::Config(format!("cannot format {} with '{}'", date, self.config.date_format)))?;
        Ok(out)
    }
}

#[async_trait]
impl SourceConnector for WindowedConnector {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn cursor_kind(&self) -> CursorKind {
        CursorKind::DateWindow
    }

    fn initial_cursor(&self) -> CursorValue {
        CursorValue::Window(self.plan.start)
    }

    fn window_plan(&self) -> Option<&WindowPlan> {
        Some(&self.plan)
    }

    #[tracing::instrument(level = "debug", skip(self), fields(source = %self.source_id))]
    async fn fetch_page(&self, cursor: &CursorValue) -> Result<ExtractionUnit, HarvestError> {
        expect_kind(CursorKind::DateWindow, cursor)?;
        let start = match cursor {
            CursorValue::Window(date) => *date,
            _ => self.plan.start,
        };
        let end = self.plan.window_end(start)?;
        let bounds = [
            (self.config.from_param.as_str(), self.format_bound(start)?),
            (self.config.to_param.as_str(), self.format_bound(end)?),
        ];

        let mut items = Vec::new();
        let mut offset = 0u64;
        loop {
            let page = fetch_offset_page(&self.fetcher, &self.config.paging, offset, &bounds).await?;
            let received = page.items.len() as u64;
            items.extend(page.items);
            if received == 0 || offset.saturating_add(self.config.paging.page_size) >= page.total {
                break;
            }
            offset += received;
        }
        debug!("window {}..={}: {} items", start, end, items.len());

        let next = self.plan.range.add_to(start).unwrap_or(start);
        Ok(ExtractionUnit::new(
            to_records(items, &self.config.paging.id_pointer),
            CursorValue::Window(next),
            false,
        ))
    }
}
