//! Aggregation orchestrator: every registered source for one date.
//!
//! Sources run concurrently on a bounded pool, each under its own
//! deadline. A failing, hanging or panicking source only affects its own
//! entry in the [`AggregateEnvelope`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::validate_date;
use crate::error::{CrawlError, ErrorKind, Result};
use crate::service::CrawlerService;
use crate::types::{AggregateEnvelope, FetchOutcome};

pub struct Orchestrator {
    service: Arc<CrawlerService>,
}

impl Orchestrator {
    pub fn new(service: Arc<CrawlerService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &CrawlerService {
        &self.service
    }

    /// Fetch every source for a `YYYY-MM-DD` date. Only a malformed date
    /// is an error; per-source problems land in the envelope.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDate` when `date` is not a valid `YYYY-MM-DD` date.
    pub async fn fetch_all(&self, date: &str) -> Result<AggregateEnvelope> {
        let date = validate_date(date)?;
        Ok(self.fetch_all_on(date).await)
    }

    /// Fetch every registered source for `date`.
    ///
    /// # Arguments
    ///
    /// * `date` - Date passed to every source
    ///
    /// # Returns
    ///
    /// An envelope with one entry per registered source. Sources past the
    /// configured deadline are cancelled and recorded as a `Transport`
    /// failure with message `timeout`; a panicking crawler is `Internal`.
    pub async fn fetch_all_on(&self, date: NaiveDate) -> AggregateEnvelope {
        let started = Instant::now();
        let config = self.service.config();
        let pool = Arc::new(Semaphore::new(config.pool_size.max(1)));
        let deadline = config.source_deadline;
        let names = self.service.registry().names();

        tracing::info!(
            date = %date,
            sources = names.len(),
            pool_size = config.pool_size,
            deadline_secs = deadline.as_secs(),
            "Starting batch"
        );

        let mut tasks = JoinSet::new();
        for name in names {
            let service = Arc::clone(&self.service);
            let pool = Arc::clone(&pool);
            tasks.spawn(async move {
                let Ok(_permit) = pool.acquire_owned().await else {
                    return (name, FetchOutcome::failure(ErrorKind::Internal, "worker pool closed"));
                };

                // inner task so a panic inside a crawler surfaces as a JoinError
                let fetch_service = Arc::clone(&service);
                let mut handle = tokio::spawn(async move { fetch_service.fetch(name, date).await });

                let outcome = match tokio::time::timeout(deadline, &mut handle).await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(join_error)) => {
                        tracing::error!(source = name, error = %join_error, "Crawler task aborted");
                        FetchOutcome::Failure(CrawlError::Aborted(name.to_string()).into())
                    }
                    Err(_) => {
                        handle.abort();
                        tracing::warn!(source = name, deadline_secs = deadline.as_secs(), "Source deadline exceeded");
                        FetchOutcome::Failure(CrawlError::Timeout.into())
                    }
                };
                (name, outcome)
            });
        }

        let mut outcomes = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, outcome)) => {
                    outcomes.insert(name.to_string(), outcome);
                }
                // outer tasks only await; reaching this means the runtime is shutting down
                Err(e) => tracing::error!(error = %e, "Batch task failed"),
            }
        }

        let envelope = AggregateEnvelope::new(date, outcomes);
        let failed = envelope.failed_sources();
        tracing::info!(
            date = %date,
            succeeded = envelope.len() - failed.len(),
            failed = failed.len(),
            failed_sources = ?failed,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Batch finished"
        );
        envelope
    }
}
