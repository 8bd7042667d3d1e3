//! Core data types shared by crawlers, the normalizer and the orchestrator.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::{CrawlError, ErrorKind};
use crate::normalize::ColumnMap;

/// How a source interprets the requested date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DateMode {
    /// One publication per calendar date.
    ByDate,
    /// Always the most recent period; the requested date is ignored.
    LatestOnly,
}

impl fmt::Display for DateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateMode::ByDate => f.pad("by-date"),
            DateMode::LatestOnly => f.pad("latest-only"),
        }
    }
}

/// HTTP client capability a source needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportClass {
    Plain,
    ChallengeCapable,
}

impl fmt::Display for TransportClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportClass::Plain => f.pad("plain"),
            TransportClass::ChallengeCapable => f.pad("challenge-capable"),
        }
    }
}

/// Identity and static metadata of a registered source.
#[derive(Debug)]
pub struct SourceDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub date_mode: DateMode,
    pub transport: TransportClass,
    pub columns: &'static ColumnMap,
    /// Upstream base URL, overridable per source in the config.
    pub base_url: &'static str,
    /// Maximum listing pages walked to locate a date (paginated sources only).
    pub scan_depth: Option<u32>,
}

impl SourceDescriptor {
    pub fn is_latest_only(&self) -> bool {
        self.date_mode == DateMode::LatestOnly
    }

    pub fn is_paginated(&self) -> bool {
        self.scan_depth.is_some()
    }
}

/// One fetch: a source and a date, optionally a lookback window for news.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub source: String,
    pub date: NaiveDate,
    /// Hours before now to collect; news sources only.
    pub lookback_hours: Option<u32>,
}

impl FetchRequest {
    pub fn new(source: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            source: source.into(),
            date,
            lookback_hours: None,
        }
    }

    pub fn with_lookback_hours(mut self, hours: u32) -> Self {
        self.lookback_hours = Some(hours);
        self
    }

    /// Date in the exchange query format `YYYYMMDD`.
    pub fn compact_date(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }

    /// Date in the slash format `YYYY/MM/DD`.
    pub fn slash_date(&self) -> String {
        self.date.format("%Y/%m/%d").to_string()
    }
}

/// A typed cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Date(NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }
}

/// Normalized result: named columns and rows of equal width.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Empty table with the given column set.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row. Its width must match the column count.
    pub(crate) fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len(), "row width mismatch");
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at `row` in column `name`.
    pub fn value(&self, row: usize, name: &str) -> Option<&Value> {
        let idx = self.column_index(name)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// All cells of one column, top to bottom.
    pub fn column<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Value> + 'a {
        let idx = self.column_index(name);
        self.rows
            .iter()
            .filter_map(move |row| idx.and_then(|i| row.get(i)))
    }
}

struct RowObject<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl Serialize for RowObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Serialized as an array of row objects, keys in column order.
impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&RowObject {
                columns: &self.columns,
                values: row,
            })?;
        }
        seq.end()
    }
}

/// Why a fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<CrawlError> for FetchFailure {
    fn from(err: CrawlError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result of one fetch. Never partially populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(Table),
    Failure(FetchFailure),
}

impl FetchOutcome {
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        FetchOutcome::Failure(FetchFailure {
            kind,
            message: message.into(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }

    pub fn table(&self) -> Option<&Table> {
        match self {
            FetchOutcome::Success(table) => Some(table),
            FetchOutcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&FetchFailure> {
        match self {
            FetchOutcome::Success(_) => None,
            FetchOutcome::Failure(failure) => Some(failure),
        }
    }

    /// Label used in log events.
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Success(_) => "success",
            FetchOutcome::Failure(f) => f.kind.as_str(),
        }
    }
}

impl From<crate::error::Result<Table>> for FetchOutcome {
    fn from(result: crate::error::Result<Table>) -> Self {
        match result {
            Ok(table) => FetchOutcome::Success(table),
            Err(err) => FetchOutcome::Failure(err.into()),
        }
    }
}

/// Success serializes as the row array, failure as `{"error": {...}}`.
impl Serialize for FetchOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FetchOutcome::Success(table) => table.serialize(serializer),
            FetchOutcome::Failure(failure) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", failure)?;
                map.end()
            }
        }
    }
}

/// Outcomes of one batch, ordered by source name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateEnvelope {
    date: NaiveDate,
    #[serde(rename = "data")]
    outcomes: BTreeMap<String, FetchOutcome>,
}

impl AggregateEnvelope {
    pub(crate) fn new(date: NaiveDate, outcomes: BTreeMap<String, FetchOutcome>) -> Self {
        Self { date, outcomes }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn outcomes(&self) -> &BTreeMap<String, FetchOutcome> {
        &self.outcomes
    }

    pub fn get(&self, source: &str) -> Option<&FetchOutcome> {
        self.outcomes.get(source)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Names of sources whose fetch failed.
    pub fn failed_sources(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_success())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
