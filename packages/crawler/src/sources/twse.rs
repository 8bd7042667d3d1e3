//! TWSE daily quotes of listed securities (`MI_INDEX`).

use async_trait::async_trait;

use super::exchange::ExchangeReport;
use super::{CrawlContext, RawPayload, SourceCrawler};
use crate::error::{CrawlError, Result};
use crate::http::HttpRequest;
use crate::normalize::{ColumnKind, ColumnMap, ColumnSpec, RawTable};
use crate::types::{DateMode, SourceDescriptor, TransportClass};

pub const BASE_URL: &str = "https://www.twse.com.tw";

/// Fields identifying the per-security quote table among the report's tables.
const QUOTE_TABLE_ANCHORS: &[&str] = &["證券代號", "收盤價"];

const DIRECTION_FIELD: &str = "漲跌(+/-)";
const CHANGE_FIELD: &str = "漲跌價差";

pub(crate) static COLUMNS: ColumnMap = ColumnMap::new(&[
    ColumnSpec::required("date", &["Date"], ColumnKind::Date),
    ColumnSpec::required("symbol", &["證券代號"], ColumnKind::Text),
    ColumnSpec::required("name", &["證券名稱"], ColumnKind::Text),
    ColumnSpec::required("volume", &["成交股數"], ColumnKind::Integer),
    ColumnSpec::required("transactions", &["成交筆數"], ColumnKind::Integer),
    ColumnSpec::required("trade_value", &["成交金額"], ColumnKind::Integer),
    ColumnSpec::required("open", &["開盤價"], ColumnKind::Decimal),
    ColumnSpec::required("high", &["最高價"], ColumnKind::Decimal),
    ColumnSpec::required("low", &["最低價"], ColumnKind::Decimal),
    ColumnSpec::required("close", &["收盤價"], ColumnKind::Decimal),
    ColumnSpec::required("change", &[CHANGE_FIELD], ColumnKind::Decimal),
    ColumnSpec::optional("last_bid_price", &["最後揭示買價"], ColumnKind::Decimal),
    ColumnSpec::optional("last_bid_volume", &["最後揭示買量"], ColumnKind::Integer),
    ColumnSpec::optional("last_ask_price", &["最後揭示賣價"], ColumnKind::Decimal),
    ColumnSpec::optional("last_ask_volume", &["最後揭示賣量"], ColumnKind::Integer),
    ColumnSpec::optional("pe_ratio", &["本益比"], ColumnKind::Decimal),
]);

pub static DESCRIPTOR: SourceDescriptor = SourceDescriptor {
    name: "twse",
    description: "TWSE listed stocks daily quotes",
    date_mode: DateMode::ByDate,
    transport: TransportClass::Plain,
    columns: &COLUMNS,
    base_url: BASE_URL,
    scan_depth: None,
};

pub struct TwseCrawler;

#[async_trait]
impl SourceCrawler for TwseCrawler {
    async fn crawl(&self, ctx: &CrawlContext<'_>) -> Result<RawPayload> {
        let date = ctx.request.compact_date();
        let request = HttpRequest::get(ctx.url("/rwd/zh/afterTrading/MI_INDEX")).query(&[
            ("date", date.as_str()),
            ("type", "ALL"),
            ("response", "json"),
        ]);
        let body = ctx.transport.send(&request).await?.body;
        parse_report(&body, &ctx.request.date.to_string())
    }
}

/// Extract the quote table and fold the direction marker into `漲跌價差`.
pub fn parse_report(body: &str, date: &str) -> Result<RawPayload> {
    let report = ExchangeReport::parse("twse", body)?;
    match report.table_payload("twse", QUOTE_TABLE_ANCHORS)? {
        RawPayload::Rows(mut raw) => {
            fold_change_sign(&mut raw)?;
            raw.add_constant_column("Date", date);
            Ok(RawPayload::Rows(raw))
        }
        no_data => Ok(no_data),
    }
}

/// Sign carried by the direction cell, which holds markup such as
/// `<p style= color:red>+</p>`. `X` (not comparable) and blank mean no change.
fn direction(cell: &str) -> i8 {
    let text: String = cell
        .split(['<', '>'])
        .enumerate()
        .filter(|(i, _)| i % 2 == 0)
        .map(|(_, part)| part)
        .collect();
    match text.trim() {
        "+" => 1,
        "-" => -1,
        _ => 0,
    }
}

/// `漲跌價差` is unsigned upstream; apply the direction column to it.
fn fold_change_sign(raw: &mut RawTable) -> Result<()> {
    let (Some(dir_idx), Some(change_idx)) = (raw.header_index(DIRECTION_FIELD), raw.header_index(CHANGE_FIELD)) else {
        return Err(CrawlError::layout(
            "twse",
            format!("quote table lacks {DIRECTION_FIELD} or {CHANGE_FIELD}"),
        ));
    };

    for row in &mut raw.rows {
        let sign = row.get(dir_idx).map(|c| direction(c)).unwrap_or(0);
        if let Some(change) = row.get_mut(change_idx) {
            let magnitude = change.trim().trim_start_matches(['+', '-']).to_string();
            *change = match sign {
                1 => magnitude,
                -1 => format!("-{magnitude}"),
                _ => "0".to_string(),
            };
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::types::Value;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    const REPORT: &str = r#"{"stat":"OK","date":"20241015","tables":[
        {"title":"價格指數","fields":["指數","收盤指數"],"data":[["發行量加權股價指數","23,000.00"]]},
        {"title":"每日收盤行情(全部)","fields":["證券代號","證券名稱","成交股數","成交筆數","成交金額","開盤價","最高價","最低價","收盤價","漲跌(+/-)","漲跌價差","最後揭示買價","最後揭示買量","最後揭示賣價","最後揭示賣量","本益比"],
         "data":[
            ["2330","台積電","31,253,811","52,016","32,110,428,357","1,035.00","1,040.00","1,020.00","1,025.00","<p style= color:green>-</p>","10.00","1,025.00","1,079","1,030.00","250","28.37"],
            ["2317","鴻海","40,000,000","30,000","8,400,000,000","210.00","212.00","208.50","211.50","<p style= color:red>+</p>","3.50","211.00","100","211.50","200","16.20"],
            ["9999","停牌股","0","0","0","--","--","--","--","<p> </p>","0.00","--","0","--","0","0.00"]
         ]}
    ]}"#;

    fn rows() -> RawTable {
        match parse_report(REPORT, "2024-10-15").unwrap() {
            RawPayload::Rows(raw) => raw,
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_direction_markup() {
        assert_eq!(direction("<p style= color:red>+</p>"), 1);
        assert_eq!(direction("<p style= color:green>-</p>"), -1);
        assert_eq!(direction("<p> </p>"), 0);
        assert_eq!(direction("<p>X</p>"), 0);
        assert_eq!(direction("+"), 1);
    }

    #[test]
    fn test_change_is_signed() {
        let table = normalize("twse", &rows(), &COLUMNS).unwrap();
        assert_eq!(table.value(0, "change"), Some(&Value::Decimal(Decimal::new(-10, 0))));
        assert_eq!(table.value(1, "change"), Some(&Value::Decimal(Decimal::new(35, 1))));
        assert_eq!(table.value(2, "change"), Some(&Value::Decimal(Decimal::ZERO)));
    }

    #[test]
    fn test_normalized_columns() {
        let table = normalize("twse", &rows(), &COLUMNS).unwrap();
        assert_eq!(table.columns(), COLUMNS.canonical_names().as_slice());
        assert_eq!(table.len(), 3);
        assert_eq!(table.value(0, "symbol"), Some(&Value::Text("2330".into())));
        assert_eq!(table.value(0, "volume"), Some(&Value::Integer(31_253_811)));
        assert_eq!(table.value(2, "close"), Some(&Value::Null));
        assert_eq!(
            table.value(0, "date").and_then(Value::as_date).map(|d| d.to_string()),
            Some("2024-10-15".to_string())
        );
    }

    #[test]
    fn test_holiday_is_no_data() {
        let payload = parse_report(r#"{"stat":"很抱歉，沒有符合條件的資料!"}"#, "2024-01-01").unwrap();
        assert!(matches!(payload, RawPayload::NoData { .. }));
    }

    #[test]
    fn test_missing_direction_is_layout_error() {
        let body = r#"{"stat":"OK","tables":[{"fields":["證券代號","收盤價"],"data":[["2330","1"]]}]}"#;
        assert!(matches!(parse_report(body, "2024-10-15"), Err(CrawlError::Layout { .. })));
    }
}
