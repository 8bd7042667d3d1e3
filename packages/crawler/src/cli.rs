//! Command-line interface for the crawler.
//!
//! Results are printed to stdout as JSON so they can be piped; progress
//! and summaries go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::config::{today, validate_date, CrawlerConfig, MAX_LOOKBACK_HOURS};
use crate::error::{CrawlError, Result};
use crate::orchestrator::Orchestrator;
use crate::registry::Registry;
use crate::service::CrawlerService;
use crate::types::FetchOutcome;

/// Taiwan market and news crawler.
#[derive(Parser)]
#[command(name = "tw-crawler")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// YAML configuration file (environment variables still override it)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the available sources.
    Sources,

    /// Fetch one source for one date.
    Fetch {
        /// Source name (see `sources`)
        source: String,

        /// Date in YYYY-MM-DD format (default: today in Taipei)
        #[arg(short, long)]
        date: Option<String>,

        /// News only: collect articles from the last N hours instead of a date
        #[arg(
            long,
            conflicts_with = "date",
            value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_LOOKBACK_HOURS))
        )]
        hours: Option<u32>,

        /// Write the JSON result to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fetch every source for one date.
    FetchAll {
        /// Date in YYYY-MM-DD format (default: today in Taipei)
        #[arg(short, long)]
        date: Option<String>,

        /// Write the JSON envelope to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = CrawlerConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Sources => {
            sources_command();
            Ok(())
        }
        Commands::Fetch {
            source,
            date,
            hours,
            output,
        } => block_on(fetch_command(config, &source, date.as_deref(), hours, output.as_deref())),
        Commands::FetchAll { date, output } => block_on(fetch_all_command(config, date.as_deref(), output.as_deref())),
    }
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(future)
}

fn sources_command() {
    let registry = Registry::standard();
    println!("{}", style("Available sources").bold());
    for descriptor in registry.descriptors() {
        println!(
            "  {:<10} {:<12} {:<18} {}",
            style(descriptor.name).cyan(),
            descriptor.date_mode,
            descriptor.transport,
            descriptor.description
        );
    }
}

/// Resolve the effective date, defaulting to today in Taipei.
fn effective_date(date: Option<&str>) -> Result<chrono::NaiveDate> {
    match date {
        Some(date) => validate_date(date),
        None => Ok(today()),
    }
}

async fn fetch_command(
    config: CrawlerConfig,
    source: &str,
    date: Option<&str>,
    hours: Option<u32>,
    output: Option<&Path>,
) -> Result<()> {
    let service = CrawlerService::standard(config);
    if !service.registry().has_source(source) {
        return Err(CrawlError::UnknownSource(source.to_string()));
    }
    let date = effective_date(date)?;

    let pb = spinner();
    let outcome = match hours {
        Some(hours) => {
            pb.set_message(format!("Fetching {source} (last {hours}h)..."));
            service.fetch_recent(source, hours).await
        }
        None => {
            pb.set_message(format!("Fetching {source} for {date}..."));
            service.fetch(source, date).await
        }
    };
    pb.finish_and_clear();

    match &outcome {
        FetchOutcome::Success(table) => eprintln!(
            "{} {} {} rows",
            style("Fetched").green().bold(),
            style(source).cyan(),
            table.len()
        ),
        FetchOutcome::Failure(failure) => eprintln!(
            "{} {} [{}] {}",
            style("Failed").red().bold(),
            style(source).cyan(),
            failure.kind,
            failure.message
        ),
    }

    emit(&outcome, output)
}

async fn fetch_all_command(config: CrawlerConfig, date: Option<&str>, output: Option<&Path>) -> Result<()> {
    let date = effective_date(date)?;
    let orchestrator = Orchestrator::new(Arc::new(CrawlerService::standard(config)));

    let pb = spinner();
    pb.set_message(format!(
        "Fetching {} sources for {date}...",
        orchestrator.service().registry().len()
    ));
    let envelope = orchestrator.fetch_all_on(date).await;
    pb.finish_and_clear();

    for (name, outcome) in envelope.outcomes() {
        match outcome {
            FetchOutcome::Success(table) => {
                eprintln!("  {:<10} {} ({} rows)", style(name).cyan(), style("ok").green(), table.len());
            }
            FetchOutcome::Failure(failure) => eprintln!(
                "  {:<10} {} [{}] {}",
                style(name).cyan(),
                style("failed").red(),
                failure.kind,
                failure.message
            ),
        }
    }
    let failed = envelope.failed_sources().len();
    if failed > 0 {
        eprintln!("{}", style(format!("{failed} of {} sources failed", envelope.len())).yellow().bold());
    }

    emit(&envelope, output)
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Pretty-print as JSON to stdout or to a file.
fn emit<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| CrawlError::json("output", e))?;
    match output {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))?;
            eprintln!("{} {}", style("Saved to:").green().bold(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AggregateEnvelope, Table};
    use std::collections::BTreeMap;

    #[test]
    fn test_cli_parse_fetch() {
        let cli = Cli::parse_from(["tw-crawler", "fetch", "twse"]);

        let Commands::Fetch {
            source,
            date,
            hours,
            output,
        } = cli.command
        else {
            panic!("expected fetch");
        };
        assert_eq!(source, "twse");
        assert!(date.is_none());
        assert!(hours.is_none());
        assert!(output.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_parse_fetch_with_date_and_config() {
        let cli = Cli::parse_from([
            "tw-crawler",
            "fetch",
            "taifex",
            "--date",
            "2024-10-15",
            "--config",
            "crawler.yaml",
        ]);

        let Commands::Fetch { source, date, .. } = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(source, "taifex");
        assert_eq!(date, Some("2024-10-15".to_string()));
        assert_eq!(cli.config, Some(PathBuf::from("crawler.yaml")));
    }

    #[test]
    fn test_cli_hours_conflicts_with_date() {
        let result = Cli::try_parse_from(["tw-crawler", "fetch", "ptt", "--hours", "6", "--date", "2024-10-15"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_hours_is_bounded() {
        let cli = Cli::parse_from(["tw-crawler", "fetch", "ptt", "--hours", "6"]);
        let Commands::Fetch { hours, .. } = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(hours, Some(6));

        let max = MAX_LOOKBACK_HOURS.to_string();
        assert!(Cli::try_parse_from(["tw-crawler", "fetch", "ptt", "--hours", max.as_str()]).is_ok());
        let beyond = (MAX_LOOKBACK_HOURS + 1).to_string();
        assert!(Cli::try_parse_from(["tw-crawler", "fetch", "ptt", "--hours", beyond.as_str()]).is_err());
        assert!(Cli::try_parse_from(["tw-crawler", "fetch", "ptt", "--hours", "4294967295"]).is_err());
        assert!(Cli::try_parse_from(["tw-crawler", "fetch", "ptt", "--hours", "0"]).is_err());
    }

    #[test]
    fn test_cli_parse_fetch_all() {
        let cli = Cli::parse_from(["tw-crawler", "fetch-all", "-d", "2024-10-15"]);
        let Commands::FetchAll { date, output } = cli.command else {
            panic!("expected fetch-all");
        };
        assert_eq!(date, Some("2024-10-15".to_string()));
        assert!(output.is_none());
    }

    #[test]
    fn test_effective_date() {
        assert_eq!(effective_date(Some("2024-10-15")).unwrap().to_string(), "2024-10-15");
        assert_eq!(effective_date(None).unwrap(), today());
        assert!(effective_date(Some("15/10/2024")).is_err());
    }

    #[test]
    fn test_emit_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let date = validate_date("2024-10-19").unwrap();
        let mut outcomes = BTreeMap::new();
        outcomes.insert(
            "twse".to_string(),
            FetchOutcome::Success(Table::new(vec!["symbol".to_string()])),
        );

        emit(&AggregateEnvelope::new(date, outcomes), Some(&path)).unwrap();

        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["date"], "2024-10-19");
        assert_eq!(written["data"]["twse"], serde_json::json!([]));
    }
}
