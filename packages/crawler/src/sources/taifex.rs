//! TAIFEX daily futures quotes, downloaded as CSV.

use async_trait::async_trait;
use csv::{ReaderBuilder, Trim};

use super::{CrawlContext, RawPayload, SourceCrawler};
use crate::error::{CrawlError, Result};
use crate::http::{HttpRequest, TransportOptions};
use crate::normalize::{ColumnKind, ColumnMap, ColumnSpec, RawTable};
use crate::types::{DateMode, SourceDescriptor, TransportClass};

pub const BASE_URL: &str = "https://www.taifex.com.tw";

/// The download is Big5 unless the response says otherwise.
const CSV_CHARSET: &str = "big5";

/// Phrases of the HTML page served instead of CSV when nothing traded.
const NO_DATA_MARKERS: &[&str] = &["查無資料", "無交易資料", "No data"];

pub(crate) static COLUMNS: ColumnMap = ColumnMap::new(&[
    ColumnSpec::required("date", &["交易日期"], ColumnKind::Date),
    ColumnSpec::required("contract", &["契約"], ColumnKind::Text),
    ColumnSpec::required("contract_month", &["到期月份(週別)"], ColumnKind::Text),
    ColumnSpec::required("open", &["開盤價"], ColumnKind::Decimal),
    ColumnSpec::required("high", &["最高價"], ColumnKind::Decimal),
    ColumnSpec::required("low", &["最低價"], ColumnKind::Decimal),
    ColumnSpec::required("last", &["收盤價"], ColumnKind::Decimal),
    ColumnSpec::required("change", &["漲跌價"], ColumnKind::Decimal),
    ColumnSpec::required("change_percent", &["漲跌%"], ColumnKind::Percent),
    ColumnSpec::required("volume", &["成交量"], ColumnKind::Integer),
    ColumnSpec::required("settlement_price", &["結算價"], ColumnKind::Decimal),
    ColumnSpec::required("open_interest", &["未沖銷契約數"], ColumnKind::Integer),
    ColumnSpec::required("best_bid", &["最後最佳買價"], ColumnKind::Decimal),
    ColumnSpec::required("best_ask", &["最後最佳賣價"], ColumnKind::Decimal),
    ColumnSpec::optional("historical_high", &["歷史最高價"], ColumnKind::Decimal),
    ColumnSpec::optional("historical_low", &["歷史最低價"], ColumnKind::Decimal),
    ColumnSpec::optional("trading_halt", &["是否因訊息面暫停交易"], ColumnKind::Flag),
    ColumnSpec::optional("trading_session", &["交易時段"], ColumnKind::Text),
    ColumnSpec::optional("spread_order_volume", &["價差對單式委託成交量"], ColumnKind::Integer),
]);

pub static DESCRIPTOR: SourceDescriptor = SourceDescriptor {
    name: "taifex",
    description: "TAIFEX futures daily trading data",
    date_mode: DateMode::ByDate,
    transport: TransportClass::ChallengeCapable,
    columns: &COLUMNS,
    base_url: BASE_URL,
    scan_depth: None,
};

pub struct TaifexCrawler;

#[async_trait]
impl SourceCrawler for TaifexCrawler {
    fn transport_options(&self, base_url: &str) -> TransportOptions {
        TransportOptions::browser()
            .accept_language("zh-TW,zh;q=0.9,en;q=0.8")
            .warmup(format!("{base_url}/cht/3/futDailyMarketView"))
    }

    async fn crawl(&self, ctx: &CrawlContext<'_>) -> Result<RawPayload> {
        let date = ctx.request.slash_date();
        let request = HttpRequest::post_form(
            ctx.url("/cht/3/futDataDown"),
            &[
                ("down_type", "1"),
                ("commodity_id", "all"),
                ("queryStartDate", date.as_str()),
                ("queryEndDate", date.as_str()),
            ],
        )
        .fallback_charset(CSV_CHARSET);
        let body = ctx.transport.send(&request).await?.body;
        parse_csv(&body)
    }
}

/// Parse the download. An HTML answer is either the no-data page or drift.
pub fn parse_csv(body: &str) -> Result<RawPayload> {
    let trimmed = body.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        return Ok(RawPayload::no_data("empty download"));
    }
    if trimmed.starts_with('<') {
        if NO_DATA_MARKERS.iter().any(|m| trimmed.contains(m)) {
            return Ok(RawPayload::no_data("no trading data for date"));
        }
        return Err(CrawlError::layout("taifex", "expected CSV, got HTML"));
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(trimmed.as_bytes());

    let headers = reader.headers()?.iter().map(String::from).collect();
    let mut raw = RawTable::new(headers);
    for record in reader.records() {
        let record = record?;
        raw.push(record.iter().map(String::from).collect());
    }
    Ok(RawPayload::Rows(raw))
}
