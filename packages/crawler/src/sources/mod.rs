//! Source crawlers, one module per upstream.
//!
//! Every crawler implements [`SourceCrawler`]: given a [`CrawlContext`]
//! (request, policy and a transport chosen from the source's descriptor)
//! it returns a [`RawPayload`], either origin-named rows or an explicit
//! "no data for this date" signal. Normalization happens afterwards in
//! [`crate::service`].
//!
//! - Exchange feeds: [`twse`], [`tpex`], [`taifex`], [`faoi`], [`mgts`]
//! - Latest-only dataset: [`tdcc`]
//! - Paginated news: [`cnyes`], [`ptt`], [`ctee`], [`moneyudn`]

pub mod cnyes;
pub mod ctee;
pub mod exchange;
pub mod faoi;
pub mod html;
pub mod listing;
pub mod markdown;
pub mod mgts;
pub mod moneyudn;
pub mod news;
pub mod ptt;
pub mod taifex;
pub mod tdcc;
pub mod tpex;
pub mod twse;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

use crate::config::CrawlerConfig;
use crate::http::{Transport, TransportOptions};
use crate::normalize::RawTable;
use crate::types::{FetchRequest, SourceDescriptor};
use listing::Window;

/// What a crawler hands to the normalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawPayload {
    /// Origin-named rows, possibly zero of them.
    Rows(RawTable),
    /// Upstream explicitly has nothing for this date (holiday, not yet published).
    NoData { reason: String },
}

impl RawPayload {
    pub fn no_data(reason: impl Into<String>) -> Self {
        RawPayload::NoData {
            reason: reason.into(),
        }
    }
}

/// Everything one crawler invocation may use. Owned by that invocation.
pub struct CrawlContext<'a> {
    pub descriptor: &'static SourceDescriptor,
    pub request: &'a FetchRequest,
    pub config: &'a CrawlerConfig,
    pub transport: Box<dyn Transport>,
    /// Base URL after config overrides, without trailing slash.
    pub base_url: String,
    /// Call time in Taipei.
    pub now: DateTime<FixedOffset>,
}

impl CrawlContext<'_> {
    /// Absolute URL for a path on this source's host.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Maximum listing pages for this invocation.
    pub fn scan_depth(&self) -> u32 {
        self.config.scan_depth(self.descriptor.scan_depth.unwrap_or(1))
    }

    pub fn page_delay(&self) -> Duration {
        self.config.page_delay
    }

    /// Pause between successive requests to the same site.
    pub async fn pace(&self) {
        if !self.config.page_delay.is_zero() {
            tokio::time::sleep(self.config.page_delay).await;
        }
    }

    /// Date window a paginated crawl collects.
    pub fn window(&self) -> crate::error::Result<Window> {
        Window::for_request(self.request, self.now)
    }
}

/// Source-specific fetch and structural extraction.
#[async_trait]
pub trait SourceCrawler: Send + Sync {
    /// Client settings for this source; `base_url` is the effective host.
    fn transport_options(&self, _base_url: &str) -> TransportOptions {
        TransportOptions::default()
    }

    async fn crawl(&self, ctx: &CrawlContext<'_>) -> crate::error::Result<RawPayload>;
}
