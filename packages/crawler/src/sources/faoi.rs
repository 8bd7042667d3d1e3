//! Daily buy/sell of the three major institutional investors (TWSE `T86`).

use async_trait::async_trait;

use super::exchange::ExchangeReport;
use super::{CrawlContext, RawPayload, SourceCrawler};
use crate::error::Result;
use crate::http::HttpRequest;
use crate::normalize::{ColumnKind, ColumnMap, ColumnSpec};
use crate::types::{DateMode, SourceDescriptor, TransportClass};

pub const BASE_URL: &str = "https://www.twse.com.tw";

// Older reports use the shorter 外資 spellings, before foreign dealers
// were split out.
pub(crate) static COLUMNS: ColumnMap = ColumnMap::new(&[
    ColumnSpec::required("date", &["Date"], ColumnKind::Date),
    ColumnSpec::required("symbol", &["證券代號"], ColumnKind::Text),
    ColumnSpec::required("name", &["證券名稱"], ColumnKind::Text),
    ColumnSpec::required(
        "foreign_investors_buy",
        &["外陸資買進股數(不含外資自營商)", "外資買進股數"],
        ColumnKind::Integer,
    ),
    ColumnSpec::required(
        "foreign_investors_sell",
        &["外陸資賣出股數(不含外資自營商)", "外資賣出股數"],
        ColumnKind::Integer,
    ),
    ColumnSpec::required(
        "foreign_investors_net",
        &["外陸資買賣超股數(不含外資自營商)", "外資買賣超股數"],
        ColumnKind::Integer,
    ),
    ColumnSpec::optional("foreign_dealers_buy", &["外資自營商買進股數"], ColumnKind::Integer),
    ColumnSpec::optional("foreign_dealers_sell", &["外資自營商賣出股數"], ColumnKind::Integer),
    ColumnSpec::optional("foreign_dealers_net", &["外資自營商買賣超股數"], ColumnKind::Integer),
    ColumnSpec::required("investment_trust_buy", &["投信買進股數"], ColumnKind::Integer),
    ColumnSpec::required("investment_trust_sell", &["投信賣出股數"], ColumnKind::Integer),
    ColumnSpec::required("investment_trust_net", &["投信買賣超股數"], ColumnKind::Integer),
    ColumnSpec::required("dealers_net", &["自營商買賣超股數"], ColumnKind::Integer),
    ColumnSpec::optional("dealers_proprietary_buy", &["自營商買進股數(自行買賣)"], ColumnKind::Integer),
    ColumnSpec::optional("dealers_proprietary_sell", &["自營商賣出股數(自行買賣)"], ColumnKind::Integer),
    ColumnSpec::optional("dealers_proprietary_net", &["自營商買賣超股數(自行買賣)"], ColumnKind::Integer),
    ColumnSpec::optional("dealers_hedge_buy", &["自營商買進股數(避險)"], ColumnKind::Integer),
    ColumnSpec::optional("dealers_hedge_sell", &["自營商賣出股數(避險)"], ColumnKind::Integer),
    ColumnSpec::optional("dealers_hedge_net", &["自營商買賣超股數(避險)"], ColumnKind::Integer),
    ColumnSpec::required("total_net", &["三大法人買賣超股數"], ColumnKind::Integer),
]);

pub static DESCRIPTOR: SourceDescriptor = SourceDescriptor {
    name: "faoi",
    description: "TWSE institutional investors daily trading by security",
    date_mode: DateMode::ByDate,
    transport: TransportClass::Plain,
    columns: &COLUMNS,
    base_url: BASE_URL,
    scan_depth: None,
};

pub struct FaoiCrawler;

#[async_trait]
impl SourceCrawler for FaoiCrawler {
    async fn crawl(&self, ctx: &CrawlContext<'_>) -> Result<RawPayload> {
        let date = ctx.request.compact_date();
        let request = HttpRequest::get(ctx.url("/rwd/zh/fund/T86")).query(&[
            ("date", date.as_str()),
            ("selectType", "ALL"),
            ("response", "json"),
        ]);
        let body = ctx.transport.send(&request).await?.body;
        parse_report(&body, &ctx.request.date.to_string())
    }
}

pub fn parse_report(body: &str, date: &str) -> Result<RawPayload> {
    let report = ExchangeReport::parse("faoi", body)?;
    match report.top_level_payload("faoi")? {
        RawPayload::Rows(mut raw) => {
            raw.add_constant_column("Date", date);
            Ok(RawPayload::Rows(raw))
        }
        no_data => Ok(no_data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrawlError;
    use crate::normalize::normalize;
    use crate::types::Value;
    use pretty_assertions::assert_eq;

    const REPORT: &str = r#"{"stat":"OK","date":"20241015","title":"113年10月15日 三大法人買賣超日報",
        "fields":["證券代號","證券名稱","外陸資買進股數(不含外資自營商)","外陸資賣出股數(不含外資自營商)","外陸資買賣超股數(不含外資自營商)","外資自營商買進股數","外資自營商賣出股數","外資自營商買賣超股數","投信買進股數","投信賣出股數","投信買賣超股數","自營商買賣超股數","自營商買進股數(自行買賣)","自營商賣出股數(自行買賣)","自營商買賣超股數(自行買賣)","自營商買進股數(避險)","自營商賣出股數(避險)","自營商買賣超股數(避險)","三大法人買賣超股數"],
        "data":[["2330  ","台積電","20,000,000","25,000,000","-5,000,000","0","0","0","1,000,000","200,000","800,000","-120,000","10,000","30,000","-20,000","50,000","150,000","-100,000","-4,320,000"]]}"#;

    #[test]
    fn test_current_layout() {
        let RawPayload::Rows(raw) = parse_report(REPORT, "2024-10-15").unwrap() else {
            panic!("expected rows");
        };
        let table = normalize("faoi", &raw, &COLUMNS).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.value(0, "symbol"), Some(&Value::Text("2330".into())));
        assert_eq!(table.value(0, "foreign_investors_net"), Some(&Value::Integer(-5_000_000)));
        assert_eq!(table.value(0, "dealers_hedge_net"), Some(&Value::Integer(-100_000)));
        assert_eq!(table.value(0, "total_net"), Some(&Value::Integer(-4_320_000)));
    }

    #[test]
    fn test_older_layout_leaves_split_columns_null() {
        let body = r#"{"stat":"OK","fields":["證券代號","證券名稱","外資買進股數","外資賣出股數","外資買賣超股數","投信買進股數","投信賣出股數","投信買賣超股數","自營商買賣超股數","三大法人買賣超股數"],
            "data":[["2317","鴻海","1,000","500","500","0","0","0","10","510"]]}"#;
        let RawPayload::Rows(raw) = parse_report(body, "2014-05-02").unwrap() else {
            panic!("expected rows");
        };
        let table = normalize("faoi", &raw, &COLUMNS).unwrap();

        assert_eq!(table.value(0, "foreign_investors_buy"), Some(&Value::Integer(1_000)));
        assert_eq!(table.value(0, "foreign_dealers_net"), Some(&Value::Null));
        assert_eq!(table.value(0, "dealers_proprietary_buy"), Some(&Value::Null));
    }

    #[test]
    fn test_renamed_required_field_is_schema_error() {
        let body = r#"{"stat":"OK","fields":["證券代號","證券名稱","三大法人"],"data":[["2330","台積電","1"]]}"#;
        let RawPayload::Rows(raw) = parse_report(body, "2024-10-15").unwrap() else {
            panic!("expected rows");
        };
        assert!(matches!(
            normalize("faoi", &raw, &COLUMNS),
            Err(CrawlError::MissingColumns { .. })
        ));
    }

    #[test]
    fn test_holiday() {
        let payload = parse_report(r#"{"stat":"很抱歉，沒有符合條件的資料!"}"#, "2024-10-10").unwrap();
        assert!(matches!(payload, RawPayload::NoData { .. }));
    }
}
