//! Unified crawler interface: one call per (source, date).
//!
//! [`CrawlerService::fetch`] never returns an error. Unknown sources,
//! transport problems, layout drift and missing dates all come back as a
//! [`FetchOutcome::Failure`] with its [`ErrorKind`](crate::error::ErrorKind).

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::config::{taipei, validate_date, CrawlerConfig};
use crate::error::{CrawlError, Result};
use crate::http::create_transport;
use crate::normalize::normalize;
use crate::registry::{Entry, Registry};
use crate::sources::{CrawlContext, RawPayload};
use crate::types::{FetchOutcome, FetchRequest, Table};

/// Dispatches fetches to registered crawlers and normalizes their output.
pub struct CrawlerService {
    registry: Arc<Registry>,
    config: CrawlerConfig,
    /// Fixed call time; `None` reads the clock on every fetch.
    clock: Option<DateTime<FixedOffset>>,
}

impl CrawlerService {
    pub fn new(registry: Arc<Registry>, config: CrawlerConfig) -> Self {
        Self {
            registry,
            config,
            clock: None,
        }
    }

    /// Service over every built-in source.
    pub fn standard(config: CrawlerConfig) -> Self {
        Self::new(Arc::new(Registry::standard()), config)
    }

    /// Pin the call time, which anchors lookback windows and year-less list dates.
    #[must_use]
    pub fn with_clock(mut self, now: DateTime<FixedOffset>) -> Self {
        self.clock = Some(now);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    /// Current time in Taipei.
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.clock
            .unwrap_or_else(|| Utc::now().with_timezone(&taipei()))
    }

    /// Fetch one source for one date.
    ///
    /// # Arguments
    ///
    /// * `source` - Registered source name, e.g. `"twse"`
    /// * `date` - Trading or publication date; latest-only sources ignore it
    ///
    /// # Returns
    ///
    /// A normalized table, empty with the source's canonical columns when
    /// upstream has no data for the date, or a classified failure. Unknown
    /// sources are a `NotFound` failure rather than an error.
    pub async fn fetch(&self, source: &str, date: NaiveDate) -> FetchOutcome {
        self.fetch_request(&FetchRequest::new(source, date)).await
    }

    /// Fetch with a `YYYY-MM-DD` date string.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDate` for a malformed date; everything else is a
    /// [`FetchOutcome::Failure`].
    pub async fn fetch_str(&self, source: &str, date: &str) -> Result<FetchOutcome> {
        let date = validate_date(date)?;
        Ok(self.fetch(source, date).await)
    }

    /// News published within the last `hours`. Non-news sources treat this
    /// as a plain fetch for today.
    ///
    /// # Arguments
    ///
    /// * `source` - Registered source name
    /// * `hours` - Lookback measured back from the service clock
    ///
    /// # Returns
    ///
    /// Articles published at or after `now - hours`. A lookback reaching past
    /// the representable calendar is a `NotFound` failure.
    pub async fn fetch_recent(&self, source: &str, hours: u32) -> FetchOutcome {
        let request = FetchRequest::new(source, self.now().date_naive()).with_lookback_hours(hours);
        self.fetch_request(&request).await
    }

    pub async fn fetch_request(&self, request: &FetchRequest) -> FetchOutcome {
        let started = Instant::now();

        let outcome = match self.registry.get(&request.source) {
            Some(entry) => FetchOutcome::from(self.run(entry, request).await),
            None => FetchOutcome::Failure(CrawlError::UnknownSource(request.source.clone()).into()),
        };

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match &outcome {
            FetchOutcome::Success(table) => tracing::info!(
                source = %request.source,
                date = %request.date,
                outcome = outcome.label(),
                rows = table.len(),
                elapsed_ms,
                "Fetch finished"
            ),
            FetchOutcome::Failure(failure) => tracing::warn!(
                source = %request.source,
                date = %request.date,
                outcome = outcome.label(),
                kind = %failure.kind,
                error = %failure.message,
                elapsed_ms,
                "Fetch failed"
            ),
        }
        outcome
    }

    async fn run(&self, entry: &Entry, request: &FetchRequest) -> Result<Table> {
        let descriptor = entry.descriptor;

        if descriptor.is_latest_only() {
            tracing::debug!(source = descriptor.name, date = %request.date, "Latest-only source, requested date ignored");
        }
        if request.lookback_hours.is_some() && !descriptor.is_paginated() {
            tracing::debug!(source = descriptor.name, "Lookback window ignored for a non-news source");
        }

        let base_url = self.config.endpoint(descriptor.name, descriptor.base_url);
        let options = entry.crawler.transport_options(&base_url);
        let transport = create_transport(descriptor.transport, &self.config, options)?;

        let ctx = CrawlContext {
            descriptor,
            request,
            config: &self.config,
            transport,
            base_url,
            now: self.now(),
        };

        match entry.crawler.crawl(&ctx).await? {
            RawPayload::NoData { reason } => {
                tracing::debug!(source = descriptor.name, date = %request.date, reason = %reason, "No data for date");
                Ok(Table::new(descriptor.columns.canonical_names()))
            }
            RawPayload::Rows(raw) => normalize(descriptor.name, &raw, descriptor.columns),
        }
    }
}
