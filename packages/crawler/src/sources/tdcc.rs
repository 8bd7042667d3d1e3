//! TDCC shareholding distribution by holding level.
//!
//! The open-data endpoint only serves the latest weekly snapshot, so the
//! requested date is ignored and the date column carries the snapshot date.

use async_trait::async_trait;
use serde_json::{Map, Value as Json};

use super::{CrawlContext, RawPayload, SourceCrawler};
use crate::error::{CrawlError, Result};
use crate::http::{decode_json, HttpRequest};
use crate::normalize::{ColumnKind, ColumnMap, ColumnSpec, RawTable};
use crate::types::{DateMode, SourceDescriptor, TransportClass};

pub const BASE_URL: &str = "https://openapi.tdcc.com.tw";

pub(crate) static COLUMNS: ColumnMap = ColumnMap::new(&[
    ColumnSpec::required("date", &["資料日期"], ColumnKind::Date),
    ColumnSpec::required("symbol", &["證券代號"], ColumnKind::Text),
    ColumnSpec::required("holding_level", &["持股分級"], ColumnKind::Integer),
    ColumnSpec::required("holders", &["人數"], ColumnKind::Integer),
    ColumnSpec::required("shares", &["股數"], ColumnKind::Integer),
    ColumnSpec::required("percentage", &["占集保庫存數比例%"], ColumnKind::Decimal),
]);

pub static DESCRIPTOR: SourceDescriptor = SourceDescriptor {
    name: "tdcc",
    description: "TDCC shareholding distribution (latest weekly snapshot)",
    date_mode: DateMode::LatestOnly,
    transport: TransportClass::Plain,
    columns: &COLUMNS,
    base_url: BASE_URL,
    scan_depth: None,
};

pub struct TdccCrawler;

#[async_trait]
impl SourceCrawler for TdccCrawler {
    async fn crawl(&self, ctx: &CrawlContext<'_>) -> Result<RawPayload> {
        let body = ctx.transport.get_text(&ctx.url("/v1/opendata/1-5")).await?;
        parse_dataset(&body)
    }
}

pub fn parse_dataset(body: &str) -> Result<RawPayload> {
    let records: Vec<Json> = decode_json("tdcc", body)?;
    if records.is_empty() {
        return Ok(RawPayload::no_data("dataset is empty"));
    }

    let objects = records
        .into_iter()
        .map(|record| match record {
            Json::Object(object) => Ok(object),
            other => Err(CrawlError::layout("tdcc", format!("expected object records, got {other}"))),
        })
        .collect::<Result<Vec<Map<String, Json>>>>()?;

    Ok(RawPayload::Rows(RawTable::from_objects(&objects)))
}
