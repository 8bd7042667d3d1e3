//! Margin trading and short selling balances by security (TWSE `MI_MARGN`).
//!
//! The per-security table repeats header names (買進, 賣出, 前日餘額 and
//! others appear once for margin and once for shorts), so columns are
//! taken by position after the layout has been checked.

use async_trait::async_trait;

use super::exchange::ExchangeReport;
use super::{CrawlContext, RawPayload, SourceCrawler};
use crate::error::{CrawlError, Result};
use crate::http::HttpRequest;
use crate::normalize::{normalize_header, ColumnKind, ColumnMap, ColumnSpec};
use crate::types::{DateMode, SourceDescriptor, TransportClass};

pub const BASE_URL: &str = "https://www.twse.com.tw";

const SECURITY_TABLE_ANCHORS: &[&str] = &["代號", "名稱"];

/// Positional fields in the per-security table.
const EXPECTED_FIELDS: usize = 16;

pub(crate) static COLUMNS: ColumnMap = ColumnMap::new(&[
    ColumnSpec::required("date", &["Date"], ColumnKind::Date),
    ColumnSpec::positional("symbol", 0, ColumnKind::Text),
    ColumnSpec::positional("name", 1, ColumnKind::Text),
    ColumnSpec::positional("margin_purchase", 2, ColumnKind::Integer),
    ColumnSpec::positional("margin_sales", 3, ColumnKind::Integer),
    ColumnSpec::positional("cash_redemption", 4, ColumnKind::Integer),
    ColumnSpec::positional("margin_balance_previous", 5, ColumnKind::Integer),
    ColumnSpec::positional("margin_balance_today", 6, ColumnKind::Integer),
    ColumnSpec::positional("margin_quota_next_day", 7, ColumnKind::Integer),
    ColumnSpec::positional("short_covering", 8, ColumnKind::Integer),
    ColumnSpec::positional("short_sale", 9, ColumnKind::Integer),
    ColumnSpec::positional("stock_redemption", 10, ColumnKind::Integer),
    ColumnSpec::positional("short_balance_previous", 11, ColumnKind::Integer),
    ColumnSpec::positional("short_balance_today", 12, ColumnKind::Integer),
    ColumnSpec::positional("short_quota_next_day", 13, ColumnKind::Integer),
    ColumnSpec::positional("offsetting", 14, ColumnKind::Integer),
    ColumnSpec::positional("note", 15, ColumnKind::Text),
]);

pub static DESCRIPTOR: SourceDescriptor = SourceDescriptor {
    name: "mgts",
    description: "TWSE margin trading and short selling by security",
    date_mode: DateMode::ByDate,
    transport: TransportClass::Plain,
    columns: &COLUMNS,
    base_url: BASE_URL,
    scan_depth: None,
};

pub struct MgtsCrawler;

#[async_trait]
impl SourceCrawler for MgtsCrawler {
    async fn crawl(&self, ctx: &CrawlContext<'_>) -> Result<RawPayload> {
        let date = ctx.request.compact_date();
        let request = HttpRequest::get(ctx.url("/rwd/zh/marginTrading/MI_MARGN")).query(&[
            ("date", date.as_str()),
            ("selectType", "ALL"),
            ("response", "json"),
        ]);
        let body = ctx.transport.send(&request).await?.body;
        parse_report(&body, &ctx.request.date.to_string())
    }
}

pub fn parse_report(body: &str, date: &str) -> Result<RawPayload> {
    let report = ExchangeReport::parse("mgts", body)?;
    match report.table_payload("mgts", SECURITY_TABLE_ANCHORS)? {
        RawPayload::Rows(mut raw) => {
            let first = raw.headers.first().map(|h| normalize_header(h)).unwrap_or_default();
            if raw.headers.len() < EXPECTED_FIELDS || first != "代號" {
                return Err(CrawlError::layout(
                    "mgts",
                    format!(
                        "expected {EXPECTED_FIELDS} fields starting with 代號, got {}",
                        raw.headers.len()
                    ),
                ));
            }
            // appended after the positional fields so positions stay put
            raw.add_constant_column("Date", date);
            Ok(RawPayload::Rows(raw))
        }
        no_data => Ok(no_data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::types::Value;
    use pretty_assertions::assert_eq;

    const REPORT: &str = r#"{"stat":"OK","date":"20241015","tables":[
        {"title":"信用交易統計","fields":["項目","買進","賣出","現金(券)償還","前日餘額","今日餘額"],
         "data":[["融資(交易單位)","300,000","280,000","5,000","7,000,000","7,015,000"]]},
        {"title":"融資融券彙總","fields":["代號","名稱","買進","賣出","現金償還","前日餘額","今日餘額","次一營業日限額","買進","賣出","現券償還","前日餘額","今日餘額","次一營業日限額","資券互抵","註記"],
         "data":[
            ["0050","元大台灣50","1,200","800","0","10,000","10,400","500,000","50","100","0","2,000","2,050","500,000","10",""],
            ["2330","台積電","3,000","2,500","10","20,000","20,490","900,000","200","150","0","1,000","950","900,000","30","X"]
         ]}
    ]}"#;

    #[test]
    fn test_positional_columns() {
        let RawPayload::Rows(raw) = parse_report(REPORT, "2024-10-15").unwrap() else {
            panic!("expected rows");
        };
        let table = normalize("mgts", &raw, &COLUMNS).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.value(1, "margin_purchase"), Some(&Value::Integer(3_000)));
        assert_eq!(table.value(1, "short_covering"), Some(&Value::Integer(200)));
        assert_eq!(table.value(1, "short_balance_today"), Some(&Value::Integer(950)));
        assert_eq!(table.value(1, "note"), Some(&Value::Text("X".into())));
        assert_eq!(table.value(0, "note"), Some(&Value::Null));
        assert_eq!(
            table.value(0, "date").and_then(Value::as_date).map(|d| d.to_string()),
            Some("2024-10-15".to_string())
        );
    }

    #[test]
    fn test_short_table_is_layout_error() {
        let body = r#"{"stat":"OK","tables":[{"fields":["代號","名稱","買進"],"data":[["2330","台積電","1"]]}]}"#;
        assert!(matches!(parse_report(body, "2024-10-15"), Err(CrawlError::Layout { .. })));
    }

    #[test]
    fn test_holiday() {
        let payload = parse_report(r#"{"stat":"很抱歉，沒有符合條件的資料!"}"#, "2024-10-10").unwrap();
        assert!(matches!(payload, RawPayload::NoData { .. }));
    }
}
