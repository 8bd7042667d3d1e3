//! TPEx (OTC market) daily quotes.
//!
//! The endpoint sits behind automated-traffic protection and is queried
//! with a form POST carrying a slash-formatted date.

use async_trait::async_trait;

use super::exchange::ExchangeReport;
use super::{CrawlContext, RawPayload, SourceCrawler};
use crate::error::Result;
use crate::http::{HttpRequest, TransportOptions};
use crate::normalize::{ColumnKind, ColumnMap, ColumnSpec};
use crate::types::{DateMode, SourceDescriptor, TransportClass};

pub const BASE_URL: &str = "https://www.tpex.org.tw";

const QUOTE_TABLE_ANCHORS: &[&str] = &["代號", "收盤"];

// Header names arrive with stray spaces and <br> tags; matching is done
// on normalized names, so the aliases below are the clean spellings.
pub(crate) static COLUMNS: ColumnMap = ColumnMap::new(&[
    ColumnSpec::required("date", &["Date"], ColumnKind::Date),
    ColumnSpec::required("symbol", &["代號"], ColumnKind::Text),
    ColumnSpec::required("name", &["名稱"], ColumnKind::Text),
    ColumnSpec::required("close", &["收盤"], ColumnKind::Decimal),
    ColumnSpec::required("change", &["漲跌"], ColumnKind::Decimal),
    ColumnSpec::required("open", &["開盤"], ColumnKind::Decimal),
    ColumnSpec::required("high", &["最高"], ColumnKind::Decimal),
    ColumnSpec::required("low", &["最低"], ColumnKind::Decimal),
    ColumnSpec::required("volume", &["成交股數"], ColumnKind::Integer),
    ColumnSpec::required("trade_value", &["成交金額(元)", "成交金額"], ColumnKind::Integer),
    ColumnSpec::required("transactions", &["成交筆數"], ColumnKind::Integer),
    ColumnSpec::optional("last_bid_price", &["最後買價"], ColumnKind::Decimal),
    ColumnSpec::optional("last_bid_volume", &["最後買量(千股)", "最後買量(張數)"], ColumnKind::Decimal),
    ColumnSpec::optional("last_ask_price", &["最後賣價"], ColumnKind::Decimal),
    ColumnSpec::optional("last_ask_volume", &["最後賣量(千股)", "最後賣量(張數)"], ColumnKind::Decimal),
    ColumnSpec::optional("issued_shares", &["發行股數"], ColumnKind::Integer),
    ColumnSpec::optional("next_limit_up", &["次日漲停價"], ColumnKind::Decimal),
    ColumnSpec::optional("next_limit_down", &["次日跌停價"], ColumnKind::Decimal),
]);

pub static DESCRIPTOR: SourceDescriptor = SourceDescriptor {
    name: "tpex",
    description: "TPEx OTC stocks daily quotes",
    date_mode: DateMode::ByDate,
    transport: TransportClass::ChallengeCapable,
    columns: &COLUMNS,
    base_url: BASE_URL,
    scan_depth: None,
};

pub struct TpexCrawler;

#[async_trait]
impl SourceCrawler for TpexCrawler {
    fn transport_options(&self, base_url: &str) -> TransportOptions {
        TransportOptions::browser()
            .accept_language("zh-TW,zh;q=0.9,en;q=0.8")
            .warmup(format!("{base_url}/"))
    }

    async fn crawl(&self, ctx: &CrawlContext<'_>) -> Result<RawPayload> {
        let date = ctx.request.slash_date();
        let request = HttpRequest::post_form(
            ctx.url("/www/zh-tw/afterTrading/otc"),
            &[("date", date.as_str()), ("type", "AL"), ("response", "json")],
        );
        let body = ctx.transport.send(&request).await?.body;
        parse_report(&body, &ctx.request.date.to_string())
    }
}

pub fn parse_report(body: &str, date: &str) -> Result<RawPayload> {
    let report = ExchangeReport::parse("tpex", body)?;
    match report.table_payload("tpex", QUOTE_TABLE_ANCHORS)? {
        RawPayload::Rows(mut raw) => {
            raw.add_constant_column("Date", date);
            Ok(RawPayload::Rows(raw))
        }
        no_data => Ok(no_data),
    }
}
