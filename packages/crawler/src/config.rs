//! Configuration constants, runtime policy and date validation.
//!
//! Policy values (retry count, backoff, scan depth, pool size, deadlines)
//! live in [`CrawlerConfig`]. Defaults can be overridden by a YAML file and
//! then by `TW_CRAWLER_*` environment variables, in that order.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{FixedOffset, NaiveDate, Utc};
use regex::Regex;
use serde::Deserialize;

use crate::error::{CrawlError, Result};

/// HTTP timeout in seconds for a single request.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Attempts per request before a transient failure becomes fatal.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff between attempts (milliseconds).
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Pause between successive page requests of one crawl (milliseconds).
pub const DEFAULT_PAGE_DELAY_MS: u64 = 500;

/// Number of sources fetched concurrently by the orchestrator.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Deadline for one source inside a batch (seconds).
///
/// News crawls fetch one article page per row with a delay in between,
/// so this is generous compared to a single exchange request.
pub const DEFAULT_SOURCE_DEADLINE_SECS: u64 = 300;

/// Largest lookback accepted on the command line (one year).
pub const MAX_LOOKBACK_HOURS: u32 = 24 * 365;

/// Prefix for environment variables read by [`CrawlerConfig::from_env`].
pub const ENV_PREFIX: &str = "TW_CRAWLER_";

/// User agent sent by the plain transport.
pub const USER_AGENT: &str = concat!("tw-crawler/", env!("CARGO_PKG_VERSION"));

/// Browser user agent used by sites that reject non-browser clients.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Date pattern: YYYY-MM-DD.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

/// Asia/Taipei has no daylight saving time, so a fixed offset is exact.
#[allow(clippy::expect_used)] // +08:00 is within the valid offset range
static TAIPEI: LazyLock<FixedOffset> =
    LazyLock::new(|| FixedOffset::east_opt(8 * 3600).expect("valid offset"));

/// Fixed UTC+8 offset used for every upstream timestamp.
pub fn taipei() -> FixedOffset {
    *TAIPEI
}

/// Current calendar date in Taipei.
pub fn today() -> NaiveDate {
    Utc::now().with_timezone(&taipei()).date_naive()
}

/// Validate and parse an ISO date (YYYY-MM-DD).
///
/// Future dates are accepted: upstream may simply have nothing yet.
///
/// # Examples
/// ```
/// use tw_crawler::config::validate_date;
///
/// assert!(validate_date("2024-10-15").is_ok());
/// assert!(validate_date("2024/10/15").is_err());
/// assert!(validate_date("2024-13-01").is_err()); // Invalid month
/// ```
pub fn validate_date(date_str: &str) -> Result<NaiveDate> {
    if !DATE_PATTERN.is_match(date_str) {
        return Err(CrawlError::InvalidDate(date_str.to_string()));
    }

    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|_| CrawlError::InvalidDate(date_str.to_string()))
}

/// Runtime policy for transports, crawlers and the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlerConfig {
    pub http_timeout: Duration,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub page_delay: Duration,
    /// Overrides every source's own scan depth when set.
    pub max_scan_pages: Option<u32>,
    pub pool_size: usize,
    pub source_deadline: Duration,
    /// Base URL overrides keyed by source name.
    pub endpoints: BTreeMap<String, String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            page_delay: Duration::from_millis(DEFAULT_PAGE_DELAY_MS),
            max_scan_pages: None,
            pool_size: DEFAULT_POOL_SIZE,
            source_deadline: Duration::from_secs(DEFAULT_SOURCE_DEADLINE_SECS),
            endpoints: BTreeMap::new(),
        }
    }
}

/// On-disk configuration. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    http_timeout_secs: Option<u64>,
    max_attempts: Option<u32>,
    retry_backoff_ms: Option<u64>,
    page_delay_ms: Option<u64>,
    max_scan_pages: Option<u32>,
    pool_size: Option<usize>,
    source_deadline_secs: Option<u64>,
    endpoints: BTreeMap<String, String>,
}

/// Parsed `TW_CRAWLER_<name>`; unset is `None`, unparseable is an error.
fn env_value<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    let key = format!("{ENV_PREFIX}{name}");
    match std::env::var(&key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CrawlError::Config(format!("{key} has an invalid value '{value}'"))),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(CrawlError::Config(format!("{key} is not valid unicode"))),
    }
}

impl CrawlerConfig {
    /// Defaults overridden by environment variables.
    pub fn from_env() -> Result<Self> {
        let config = Self::default().apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let config = Self::default().apply_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then the optional YAML file, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = path {
            config = config.apply_file(path)?;
        }
        let config = config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_file(mut self, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: FileConfig = serde_yaml_ng::from_str(&content)?;

        if let Some(secs) = file.http_timeout_secs {
            self.http_timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = file.max_attempts {
            self.max_attempts = attempts;
        }
        if let Some(ms) = file.retry_backoff_ms {
            self.retry_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = file.page_delay_ms {
            self.page_delay = Duration::from_millis(ms);
        }
        if file.max_scan_pages.is_some() {
            self.max_scan_pages = file.max_scan_pages;
        }
        if let Some(size) = file.pool_size {
            self.pool_size = size;
        }
        if let Some(secs) = file.source_deadline_secs {
            self.source_deadline = Duration::from_secs(secs);
        }
        self.endpoints.extend(file.endpoints);
        Ok(self)
    }

    fn apply_env(mut self) -> Result<Self> {
        if let Some(secs) = env_value("HTTP_TIMEOUT_SECS")? {
            self.http_timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = env_value("MAX_ATTEMPTS")? {
            self.max_attempts = attempts;
        }
        if let Some(ms) = env_value("RETRY_BACKOFF_MS")? {
            self.retry_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = env_value("PAGE_DELAY_MS")? {
            self.page_delay = Duration::from_millis(ms);
        }
        if let Some(pages) = env_value("MAX_SCAN_PAGES")? {
            self.max_scan_pages = Some(pages);
        }
        if let Some(size) = env_value("POOL_SIZE")? {
            self.pool_size = size;
        }
        if let Some(secs) = env_value("SOURCE_DEADLINE_SECS")? {
            self.source_deadline = Duration::from_secs(secs);
        }

        // TW_CRAWLER_ENDPOINT_TWSE=http://localhost:8080 -> endpoints["twse"]
        let endpoint_prefix = format!("{ENV_PREFIX}ENDPOINT_");
        for (key, value) in std::env::vars() {
            if let Some(source) = key.strip_prefix(&endpoint_prefix) {
                self.endpoints.insert(source.to_lowercase(), value);
            }
        }
        Ok(self)
    }

    /// Reject values that would stall every fetch.
    pub fn validate(&self) -> Result<()> {
        if self.http_timeout.is_zero() {
            return Err(CrawlError::Config("http_timeout must be positive".into()));
        }
        if self.max_attempts == 0 {
            return Err(CrawlError::Config("max_attempts must be at least 1".into()));
        }
        if self.pool_size == 0 {
            return Err(CrawlError::Config("pool_size must be at least 1".into()));
        }
        if self.max_scan_pages == Some(0) {
            return Err(CrawlError::Config("max_scan_pages must be at least 1".into()));
        }
        if self.source_deadline.is_zero() {
            return Err(CrawlError::Config("source_deadline must be positive".into()));
        }
        Ok(())
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn with_max_scan_pages(mut self, pages: u32) -> Self {
        self.max_scan_pages = Some(pages);
        self
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn with_source_deadline(mut self, deadline: Duration) -> Self {
        self.source_deadline = deadline;
        self
    }

    pub fn with_endpoint(mut self, source: impl Into<String>, base_url: impl Into<String>) -> Self {
        self.endpoints.insert(source.into(), base_url.into());
        self
    }

    /// Base URL for a source, without a trailing slash.
    pub fn endpoint(&self, source: &str, default: &str) -> String {
        self.endpoints
            .get(source)
            .map(String::as_str)
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }

    /// Page-scan limit for a paginated source.
    pub fn scan_depth(&self, source_default: u32) -> u32 {
        self.max_scan_pages.unwrap_or(source_default).max(1)
    }

    /// Backoff before retry number `attempt` (1-based): base, 2x base, 4x base...
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.retry_backoff.saturating_mul(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_validate_date_valid() {
        assert_eq!(
            validate_date("2024-10-15").ok(),
            NaiveDate::from_ymd_opt(2024, 10, 15)
        );
        assert!(validate_date("2000-02-29").is_ok());
    }

    #[test]
    fn test_validate_date_accepts_future() {
        assert!(validate_date("2999-01-01").is_ok());
    }

    #[test]
    fn test_validate_date_invalid_format() {
        assert!(validate_date("").is_err());
        assert!(validate_date("2024/10/15").is_err());
        assert!(validate_date("20241015").is_err());
        assert!(validate_date("2024-1-5").is_err());
    }

    #[test]
    fn test_validate_date_invalid_date() {
        assert!(validate_date("2024-13-01").is_err());
        assert!(validate_date("2023-02-29").is_err());
        assert!(validate_date("2024-00-10").is_err());
    }

    #[test]
    fn test_defaults() {
        let config = CrawlerConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_backoff, Duration::from_millis(500));
        assert_eq!(config.pool_size, 5);
        assert_eq!(config.max_scan_pages, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_doubles() {
        let config = CrawlerConfig::default();
        assert_eq!(config.backoff_for(1), Duration::from_millis(500));
        assert_eq!(config.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(config.backoff_for(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_endpoint_override_strips_trailing_slash() {
        let config = CrawlerConfig::default().with_endpoint("twse", "http://127.0.0.1:9000/");
        assert_eq!(
            config.endpoint("twse", "https://www.twse.com.tw"),
            "http://127.0.0.1:9000"
        );
        assert_eq!(
            config.endpoint("tpex", "https://www.tpex.org.tw"),
            "https://www.tpex.org.tw"
        );
    }

    #[test]
    fn test_scan_depth_override() {
        let config = CrawlerConfig::default();
        assert_eq!(config.scan_depth(20), 20);
        let config = config.with_max_scan_pages(2);
        assert_eq!(config.scan_depth(20), 2);
    }

    #[test]
    fn test_validate_rejects_zero_pool() {
        let config = CrawlerConfig::default().with_pool_size(0);
        assert!(matches!(config.validate(), Err(CrawlError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_http_timeout() {
        let config = CrawlerConfig::default().with_http_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(CrawlError::Config(_))));
    }

    #[test]
    fn test_env_value_rejects_unparseable() {
        // unique names so parallel tests never see each other's variables
        std::env::set_var("TW_CRAWLER_TEST_BAD_NUMBER", "five");
        std::env::set_var("TW_CRAWLER_TEST_GOOD_NUMBER", " 7 ");

        let err = env_value::<u32>("TEST_BAD_NUMBER").unwrap_err();
        assert!(err.to_string().contains("TW_CRAWLER_TEST_BAD_NUMBER"), "{err}");
        assert!(matches!(err, CrawlError::Config(_)));
        assert_eq!(env_value::<u32>("TEST_GOOD_NUMBER").unwrap(), Some(7));
        assert_eq!(env_value::<u32>("TEST_UNSET_NUMBER").unwrap(), None);

        std::env::remove_var("TW_CRAWLER_TEST_BAD_NUMBER");
        std::env::remove_var("TW_CRAWLER_TEST_GOOD_NUMBER");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "max_attempts: 5\npool_size: 2\npage_delay_ms: 0\nendpoints:\n  twse: http://localhost:1234"
        )
        .unwrap();

        let config = CrawlerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.page_delay, Duration::ZERO);
        assert_eq!(
            config.endpoint("twse", "https://www.twse.com.tw"),
            "http://localhost:1234"
        );
        // untouched values keep their defaults
        assert_eq!(config.retry_backoff, Duration::from_millis(500));
    }

    #[test]
    fn test_from_file_rejects_unknown_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_retries: 5").unwrap();
        assert!(matches!(
            CrawlerConfig::from_file(file.path()),
            Err(CrawlError::ConfigParse(_))
        ));
    }
}
