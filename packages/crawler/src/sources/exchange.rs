//! Report envelope shared by the TWSE and TPEx JSON endpoints.
//!
//! Both exchanges answer with `stat`, and either top-level
//! `fields`/`data` or a `tables` array of `{title, fields, data}`.
//! A `stat` other than "OK" is the exchange's way of saying there is no
//! report for that date.

use serde::Deserialize;
use serde_json::Value as Json;

use crate::error::{CrawlError, Result};
use crate::http::decode_json;
use crate::normalize::{normalize_header, RawTable};
use crate::sources::RawPayload;

#[derive(Debug, Deserialize)]
pub struct ExchangeReport {
    #[serde(default)]
    pub stat: Option<String>,
    #[serde(default)]
    pub fields: Option<Vec<Json>>,
    #[serde(default)]
    pub data: Option<Vec<Json>>,
    #[serde(default)]
    pub tables: Vec<ExchangeTable>,
}

#[derive(Debug, Deserialize)]
pub struct ExchangeTable {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub fields: Vec<Json>,
    #[serde(default)]
    pub data: Vec<Json>,
}

impl ExchangeTable {
    /// True when every anchor appears among the normalized field names.
    pub fn has_fields(&self, anchors: &[&str]) -> bool {
        let fields: Vec<String> = self
            .fields
            .iter()
            .filter_map(Json::as_str)
            .map(normalize_header)
            .collect();
        anchors
            .iter()
            .all(|anchor| fields.contains(&normalize_header(anchor)))
    }

    pub fn to_raw(&self) -> RawTable {
        RawTable::from_json_rows(&self.fields, &self.data)
    }
}

impl ExchangeReport {
    pub fn parse(source: &str, body: &str) -> Result<Self> {
        decode_json(source, body)
    }

    /// False when the exchange reports no data for the date.
    pub fn has_data(&self) -> bool {
        self.stat
            .as_deref()
            .map_or(true, |stat| stat.trim().eq_ignore_ascii_case("ok"))
    }

    pub fn stat_message(&self) -> String {
        self.stat.clone().unwrap_or_default()
    }

    /// First table whose fields contain all `anchors`.
    pub fn find_table(&self, anchors: &[&str]) -> Option<&ExchangeTable> {
        self.tables.iter().find(|t| t.has_fields(anchors))
    }

    /// Rows of the table identified by `anchors`.
    ///
    /// No matching table is a layout change, unless every table is empty,
    /// which some endpoints serve for closed days instead of a `stat`.
    pub fn table_payload(&self, source: &str, anchors: &[&str]) -> Result<RawPayload> {
        if !self.has_data() {
            return Ok(RawPayload::no_data(self.stat_message()));
        }
        if let Some(table) = self.find_table(anchors) {
            return Ok(RawPayload::Rows(table.to_raw()));
        }
        if self.tables.iter().all(|t| t.data.is_empty()) {
            return Ok(RawPayload::no_data("no tables in report"));
        }
        Err(CrawlError::layout(
            source,
            format!("no table with fields {}", anchors.join(", ")),
        ))
    }

    /// Rows of the top-level `fields`/`data` pair.
    pub fn top_level_payload(&self, source: &str) -> Result<RawPayload> {
        if !self.has_data() {
            return Ok(RawPayload::no_data(self.stat_message()));
        }
        match (&self.fields, &self.data) {
            (Some(fields), Some(data)) => Ok(RawPayload::Rows(RawTable::from_json_rows(fields, data))),
            (None, None) => Ok(RawPayload::no_data("empty report")),
            _ => Err(CrawlError::layout(source, "report has fields without data or data without fields")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_non_ok_stat_is_no_data() {
        let report = ExchangeReport::parse("twse", r#"{"stat":"很抱歉，沒有符合條件的資料!"}"#).unwrap();
        assert!(!report.has_data());
        assert_eq!(
            report.table_payload("twse", &["證券代號"]).unwrap(),
            RawPayload::no_data("很抱歉，沒有符合條件的資料!")
        );
    }

    #[test]
    fn test_find_table_by_fields() {
        let body = r#"{"stat":"OK","tables":[
            {"title":"大盤統計","fields":["指數","收盤指數"],"data":[["發行量加權股價指數","23,000.00"]]},
            {"title":"每日收盤行情","fields":["證券代號","證券名稱","收盤價"],"data":[["2330","台積電","1,025.00"]]}
        ]}"#;
        let report = ExchangeReport::parse("twse", body).unwrap();
        let RawPayload::Rows(raw) = report.table_payload("twse", &["證券代號", "收盤價"]).unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(raw.headers, vec!["證券代號", "證券名稱", "收盤價"]);
        assert_eq!(raw.len(), 1);
    }

    #[test]
    fn test_missing_table_is_layout_error() {
        let body = r#"{"stat":"OK","tables":[{"fields":["指數"],"data":[["x"]]}]}"#;
        let report = ExchangeReport::parse("twse", body).unwrap();
        let err = report.table_payload("twse", &["證券代號"]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Schema);
    }

    #[test]
    fn test_top_level_rows() {
        let body = r#"{"stat":"OK","fields":["證券代號","證券名稱"],"data":[["2330","台積電"]]}"#;
        let report = ExchangeReport::parse("faoi", body).unwrap();
        let payload = report.top_level_payload("faoi").unwrap();
        assert!(matches!(payload, RawPayload::Rows(ref raw) if raw.len() == 1));
    }
}
