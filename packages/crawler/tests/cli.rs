//! Command-line behaviour that needs no network.

use assert_cmd::Command;
use predicates::prelude::*;

fn crawler() -> Command {
    let mut cmd = Command::cargo_bin("tw-crawler").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_sources_lists_every_source() {
    crawler()
        .arg("sources")
        .assert()
        .success()
        .stdout(predicate::str::contains("twse"))
        .stdout(predicate::str::contains("tdcc"))
        .stdout(predicate::str::contains("latest-only"))
        .stdout(predicate::str::contains("moneyudn"));
}

#[test]
fn test_unknown_source_fails() {
    crawler()
        .args(["fetch", "nasdaq", "--date", "2024-10-15"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown source 'nasdaq'"));
}

#[test]
fn test_malformed_date_fails() {
    crawler()
        .args(["fetch", "twse", "--date", "2024/10/15"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid date format"));
}

#[test]
fn test_invalid_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("crawler.yaml");
    std::fs::write(&config, "pool_size: 0\n").unwrap();

    crawler()
        .args(["--config", config.to_str().unwrap(), "sources"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_lookback_beyond_one_year_is_rejected() {
    crawler()
        .args(["fetch", "ptt", "--hours", "4294967295"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--hours"));
}

#[test]
fn test_unparseable_environment_value_fails() {
    crawler()
        .env("TW_CRAWLER_POOL_SIZE", "many")
        .arg("sources")
        .assert()
        .failure()
        .stderr(predicate::str::contains("TW_CRAWLER_POOL_SIZE"));
}
