//! Error types for the crawler.
//!
//! `CrawlError` carries detailed context for library consumers; every
//! variant collapses to one of the coarse [`ErrorKind`]s that appear in a
//! [`FetchOutcome`](crate::types::FetchOutcome).

use serde::Serialize;
use thiserror::Error;

/// Coarse classification of a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network failure, timeout, unresolved challenge, or bad upstream status.
    Transport,
    /// Upstream layout changed or a required field is missing.
    Schema,
    /// Date unreachable by pagination, or unknown source name.
    NotFound,
    /// Crawler task panicked, or a local configuration/IO problem.
    Internal,
}

impl ErrorKind {
    /// Stable lowercase name used in logs and serialized envelopes.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Schema => "schema",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the crawler library.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Invalid date format.
    #[error("Invalid date format: '{0}'. Expected YYYY-MM-DD (e.g., 2024-10-15)")]
    InvalidDate(String),

    /// Source name not present in the registry.
    #[error("Unknown source '{0}'")]
    UnknownSource(String),

    /// HTTP request failed without a retryable cause.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-retryable status.
    #[error("Upstream returned status {status} for {url}")]
    Status { url: String, status: u16 },

    /// Transient failures persisted through every attempt.
    #[error("Request to {url} failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        message: String,
    },

    /// Automated-traffic challenge still served after every attempt.
    #[error("Challenge at {url} not cleared after {attempts} attempts")]
    ChallengeUnresolved { url: String, attempts: u32 },

    /// Upstream API reported a failure inside a 200 response.
    #[error("Upstream API error from {source_name}: {message}")]
    UpstreamApi {
        source_name: String,
        message: String,
    },

    /// Per-source deadline elapsed.
    #[error("timeout")]
    Timeout,

    /// Payload is not valid JSON or does not match the expected shape.
    #[error("Malformed JSON in {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Payload is not valid delimited text.
    #[error("Malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    /// Expected structure not found in the payload.
    #[error("Unexpected layout in {context}: {detail}")]
    Layout { context: String, detail: String },

    /// Required canonical columns absent from the raw data.
    #[error("Missing required column(s) {} in {source_name}", .columns.join(", "))]
    MissingColumns {
        source_name: String,
        columns: Vec<String>,
    },

    /// A cell in a typed column could not be coerced.
    #[error("Unparseable value '{value}' in column {column} of {source_name}")]
    Unparseable {
        source_name: String,
        column: String,
        value: String,
    },

    /// Pagination walked the maximum number of pages without a match.
    #[error("{date} not reached within {pages} pages of {source_name}")]
    ScanDepthExceeded {
        source_name: String,
        date: String,
        pages: u32,
    },

    /// Lookback reaches before the earliest representable instant.
    #[error("Lookback of {0} hours is out of range")]
    LookbackOutOfRange(u32),

    /// Listing ran out of pages without a match.
    #[error("Listing of {source_name} ended after {pages} pages before reaching {date}")]
    ListingExhausted {
        source_name: String,
        date: String,
        pages: u32,
    },

    /// Crawler task ended abnormally.
    #[error("Crawler for {0} terminated abnormally")]
    Aborted(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed.
    #[error("Configuration file parse error: {0}")]
    ConfigParse(#[from] serde_yaml_ng::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrawlError {
    /// Build a layout error with context.
    pub fn layout(context: impl Into<String>, detail: impl Into<String>) -> Self {
        CrawlError::Layout {
            context: context.into(),
            detail: detail.into(),
        }
    }

    /// Build a JSON error with context.
    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        CrawlError::Json {
            context: context.into(),
            source,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CrawlError::Http(_)
            | CrawlError::Status { .. }
            | CrawlError::RetriesExhausted { .. }
            | CrawlError::ChallengeUnresolved { .. }
            | CrawlError::UpstreamApi { .. }
            | CrawlError::Timeout => ErrorKind::Transport,
            CrawlError::Json { .. }
            | CrawlError::Csv(_)
            | CrawlError::Layout { .. }
            | CrawlError::MissingColumns { .. }
            | CrawlError::Unparseable { .. } => ErrorKind::Schema,
            CrawlError::UnknownSource(_)
            | CrawlError::ScanDepthExceeded { .. }
            | CrawlError::ListingExhausted { .. }
            | CrawlError::LookbackOutOfRange(_) => ErrorKind::NotFound,
            CrawlError::InvalidDate(_)
            | CrawlError::Aborted(_)
            | CrawlError::Config(_)
            | CrawlError::ConfigParse(_)
            | CrawlError::Io(_) => ErrorKind::Internal,
        }
    }
}

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, CrawlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CrawlError::InvalidDate("2024/10/15".to_string());
        assert!(err.to_string().contains("2024/10/15"));
        assert!(err.to_string().contains("YYYY-MM-DD"));
    }

    #[test]
    fn test_timeout_message() {
        assert_eq!(CrawlError::Timeout.to_string(), "timeout");
        assert_eq!(CrawlError::Timeout.kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_missing_columns_display() {
        let err = CrawlError::MissingColumns {
            source_name: "twse".to_string(),
            columns: vec!["symbol".to_string(), "close".to_string()],
        };
        assert_eq!(err.to_string(), "Missing required column(s) symbol, close in twse");
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            CrawlError::UnknownSource("nope".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CrawlError::ScanDepthExceeded {
                source_name: "ptt".into(),
                date: "2024-01-01".into(),
                pages: 3,
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CrawlError::ChallengeUnresolved {
                url: "https://example.test".into(),
                attempts: 3,
            }
            .kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            CrawlError::layout("twse", "no quote table").kind(),
            ErrorKind::Schema
        );
    }

    #[test]
    fn test_kind_as_str() {
        assert_eq!(ErrorKind::NotFound.as_str(), "not_found");
        assert_eq!(ErrorKind::Transport.to_string(), "transport");
    }
}
