//! Normalization pipeline: raw origin-named rows to a typed [`Table`].
//!
//! Structural extraction (step 1) happens in each crawler and yields a
//! [`RawTable`]. [`normalize`] then renames through the source's
//! [`ColumnMap`] (step 2) and cleans and coerces every cell (step 3).
//!
//! A row is junk when it is entirely blank, or when the source declares
//! required numeric columns and every one of them is unparseable (repeated
//! header rows, subtotal captions). Junk rows are dropped. Any other
//! unparseable cell is a schema failure.

mod coerce;
mod columns;
mod raw;

pub use coerce::{clean, coerce, is_null_token, parse_date};
pub use columns::{ColumnKind, ColumnMap, ColumnSpec, Origin};
pub use raw::{cell_text, normalize_header, RawTable};

use crate::error::{CrawlError, Result};
use crate::types::{Table, Value};

/// Resolve each spec to a raw column index.
fn resolve_columns(source: &str, raw: &RawTable, map: &ColumnMap) -> Result<Vec<Option<usize>>> {
    let normalized: Vec<String> = raw.headers.iter().map(|h| normalize_header(h)).collect();

    let mut indices = Vec::with_capacity(map.len());
    let mut missing = Vec::new();

    for spec in map.specs() {
        let index = match spec.origin {
            Origin::Names(aliases) => aliases.iter().find_map(|alias| {
                let wanted = normalize_header(alias);
                normalized.iter().position(|h| *h == wanted)
            }),
            Origin::Position(i) => (i < raw.headers.len()).then_some(i),
        };
        if index.is_none() && spec.required {
            missing.push(spec.name.to_string());
        }
        indices.push(index);
    }

    if !missing.is_empty() {
        return Err(CrawlError::MissingColumns {
            source_name: source.to_string(),
            columns: missing,
        });
    }
    Ok(indices)
}

/// Rename, clean and coerce `raw` into the canonical table of `source`.
pub fn normalize(source: &str, raw: &RawTable, map: &ColumnMap) -> Result<Table> {
    let indices = resolve_columns(source, raw, map)?;
    let specs = map.specs();
    let guarded = specs.iter().filter(|s| s.required && s.kind.is_numeric()).count();

    let mut table = Table::new(map.canonical_names());
    let mut dropped = 0usize;

    for raw_row in &raw.rows {
        if raw_row.iter().all(|cell| clean(cell).is_empty()) {
            dropped += 1;
            continue;
        }

        let mut row = Vec::with_capacity(specs.len());
        let mut failures: Vec<(&str, &str)> = Vec::new();
        let mut guarded_failures = 0usize;

        for (spec, index) in specs.iter().zip(&indices) {
            let cell = index
                .and_then(|i| raw_row.get(i))
                .map(String::as_str)
                .unwrap_or("");
            match coerce(spec.kind, cell) {
                Some(value) => row.push(value),
                None => {
                    if spec.required && spec.kind.is_numeric() {
                        guarded_failures += 1;
                    }
                    failures.push((spec.name, cell));
                    row.push(Value::Null);
                }
            }
        }

        if failures.is_empty() {
            table.push_row(row);
            continue;
        }

        if guarded > 0 && guarded_failures == guarded {
            tracing::debug!(source, first_cell = ?raw_row.first(), "Dropping junk row");
            dropped += 1;
            continue;
        }

        let (column, value) = failures[0];
        return Err(CrawlError::Unparseable {
            source_name: source.to_string(),
            column: column.to_string(),
            value: value.to_string(),
        });
    }

    if dropped > 0 {
        tracing::debug!(source, dropped, kept = table.len(), "Filtered junk rows");
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    static QUOTES: ColumnMap = ColumnMap::new(&[
        ColumnSpec::required("date", &["Date"], ColumnKind::Date),
        ColumnSpec::required("symbol", &["代號"], ColumnKind::Text),
        ColumnSpec::required("close", &["收盤"], ColumnKind::Decimal),
        ColumnSpec::required("volume", &["成交股數"], ColumnKind::Integer),
        ColumnSpec::optional("issued_shares", &["發行股數"], ColumnKind::Integer),
    ]);

    fn raw(rows: &[&[&str]]) -> RawTable {
        let mut raw = RawTable::with_headers(&["代號", "收盤 ", "成交股數  ", "多餘", "Date"]);
        for row in rows {
            raw.push(row.iter().map(|c| (*c).to_string()).collect());
        }
        raw
    }

    #[test]
    fn test_column_set_matches_map() {
        let table = normalize("quotes", &raw(&[&["2330", "1,025.00", "31,253,811", "x", "2024-10-15"]]), &QUOTES)
            .unwrap();

        assert_eq!(
            table.columns(),
            &["date", "symbol", "close", "volume", "issued_shares"]
        );
        assert_eq!(
            table.rows()[0],
            vec![
                Value::Date(NaiveDate::from_ymd_opt(2024, 10, 15).unwrap()),
                Value::Text("2330".into()),
                Value::Decimal(Decimal::new(1025, 0)),
                Value::Integer(31_253_811),
                Value::Null,
            ]
        );
    }

    #[test]
    fn test_missing_required_column_is_schema_error() {
        let raw = RawTable::with_headers(&["代號", "收盤"]);
        let err = normalize("quotes", &raw, &QUOTES).unwrap_err();
        match err {
            CrawlError::MissingColumns { columns, .. } => {
                assert_eq!(columns, vec!["date", "volume"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_junk_rows_dropped() {
        let table = normalize(
            "quotes",
            &raw(&[
                &["2330", "1,025.00", "100", "", "2024-10-15"],
                &["代號", "收盤", "成交股數", "", "2024-10-15"],
                &["", "", "", "", ""],
                &["2317", "--", "0", "", "2024-10-15"],
            ]),
            &QUOTES,
        )
        .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.value(1, "close"), Some(&Value::Null));
    }

    #[test]
    fn test_single_unparseable_cell_is_schema_error() {
        let err = normalize(
            "quotes",
            &raw(&[&["2330", "1,025.00", "lots", "", "2024-10-15"]]),
            &QUOTES,
        )
        .unwrap_err();
        assert!(matches!(err, CrawlError::Unparseable { ref column, .. } if column == "volume"));
    }

    #[test]
    fn test_empty_raw_table_gives_empty_table_with_columns() {
        let table = normalize("quotes", &raw(&[]), &QUOTES).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.columns().len(), QUOTES.len());
    }

    #[test]
    fn test_positional_origin() {
        static POSITIONAL: ColumnMap = ColumnMap::new(&[
            ColumnSpec::positional("buy", 1, ColumnKind::Integer),
            ColumnSpec::positional("sell", 2, ColumnKind::Integer),
        ]);
        let mut raw = RawTable::with_headers(&["代號", "買進", "買進"]);
        raw.push(vec!["2330".into(), "1,000".into(), "2,000".into()]);

        let table = normalize("positional", &raw, &POSITIONAL).unwrap();
        assert_eq!(table.rows()[0], vec![Value::Integer(1000), Value::Integer(2000)]);
    }
}
