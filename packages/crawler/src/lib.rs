//! Taiwan market and news crawler.
//!
//! Fetches daily data from exchange, clearing and regulator feeds and
//! recent articles from financial news sites, and normalizes everything
//! into typed tables keyed by canonical column names.
//!
//! # Example
//!
//! ```
//! use tw_crawler::{config, Registry};
//!
//! assert!(config::validate_date("2024-10-15").is_ok());
//! assert!(Registry::standard().has_source("twse"));
//! ```
//!
//! # Architecture
//!
//! The crawler is organized into several modules:
//!
//! - [`config`]: Runtime policy, constants and date validation
//! - [`types`]: Core data types (Table, FetchOutcome, AggregateEnvelope, etc.)
//! - [`error`]: Error types, coarse error kinds and Result alias
//! - [`http`]: Plain and challenge-capable HTTP transports
//! - [`normalize`]: Raw rows to canonical, typed tables
//! - [`sources`]: One crawler per upstream source
//! - [`registry`]: Source name to crawler mapping
//! - [`service`]: Unified single-source fetch
//! - [`orchestrator`]: Concurrent all-source fetch with failure isolation
//! - [`cli`]: Command-line interface

pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod normalize;
pub mod orchestrator;
pub mod registry;
pub mod service;
pub mod sources;
pub mod types;

// Re-export the main entry points
pub use orchestrator::Orchestrator;
pub use registry::Registry;
pub use service::CrawlerService;

// Re-export commonly used items
pub use config::{today, validate_date, CrawlerConfig};
pub use error::{CrawlError, ErrorKind, Result};
pub use types::{AggregateEnvelope, FetchFailure, FetchOutcome, FetchRequest, Table, Value};
