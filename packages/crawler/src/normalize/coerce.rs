//! Cell cleanup and type coercion.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::columns::ColumnKind;
use crate::types::Value;

/// Placeholders upstream uses for "no value".
const NULL_TOKENS: &[&str] = &[
    "", "-", "--", "---", "----", "除權", "除息", "除權息", "N/A", "n/a",
];

/// Extra placeholders accepted in yes/no columns.
const FLAG_NULL_TOKENS: &[&str] = &["*"];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d", "%Y.%m.%d"];

/// Minguo (ROC) calendar date: year offset from 1911.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static ROC_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2,3})/(\d{1,2})/(\d{1,2})$").expect("valid regex"));

const ROC_EPOCH_OFFSET: i32 = 1911;

/// Trim whitespace of every width plus the byte-order mark.
pub fn clean(raw: &str) -> &str {
    raw.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}')
}

/// True for placeholders that mean "no value".
pub fn is_null_token(cleaned: &str) -> bool {
    NULL_TOKENS.contains(&cleaned)
}

fn strip_number(cleaned: &str) -> String {
    cleaned
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect::<String>()
        .trim_start_matches('+')
        .to_string()
}

fn parse_decimal(cleaned: &str) -> Option<Decimal> {
    Decimal::from_str(&strip_number(cleaned))
        .ok()
        .map(|d| d.normalize())
}

fn parse_integer(cleaned: &str) -> Option<i64> {
    let number = strip_number(cleaned);
    if let Ok(n) = number.parse::<i64>() {
        return Some(n);
    }
    // "1234.0" is still an integer
    let decimal = Decimal::from_str(&number).ok()?;
    if decimal.fract().is_zero() {
        decimal.to_i64()
    } else {
        None
    }
}

/// Parse any accepted date spelling.
pub fn parse_date(cleaned: &str) -> Option<NaiveDate> {
    // before the Gregorian formats, which would read "113" as year 113
    if let Some(caps) = ROC_DATE.captures(cleaned) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year + ROC_EPOCH_OFFSET, month, day);
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(cleaned, format).ok())
}

/// Coerce one raw cell. `None` means the cell is unparseable for `kind`.
pub fn coerce(kind: ColumnKind, raw: &str) -> Option<Value> {
    let cleaned = clean(raw);
    if is_null_token(cleaned) {
        return Some(Value::Null);
    }

    match kind {
        ColumnKind::Text => Some(Value::Text(cleaned.to_string())),
        ColumnKind::Integer => parse_integer(cleaned).map(Value::Integer),
        ColumnKind::Decimal => parse_decimal(cleaned).map(Value::Decimal),
        ColumnKind::Percent => {
            let number = cleaned.trim_end_matches('%');
            parse_decimal(number).map(|d| Value::Decimal((d / Decimal::ONE_HUNDRED).normalize()))
        }
        ColumnKind::Date => parse_date(cleaned).map(Value::Date),
        ColumnKind::Flag => match cleaned {
            "是" | "Y" | "y" | "1" => Some(Value::Integer(1)),
            "否" | "N" | "n" | "0" => Some(Value::Integer(0)),
            token if FLAG_NULL_TOKENS.contains(&token) => Some(Value::Null),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dec(s: &str) -> Value {
        Value::Decimal(Decimal::from_str(s).unwrap())
    }

    #[test]
    fn test_thousands_separators() {
        assert_eq!(
            coerce(ColumnKind::Integer, "31,253,811"),
            Some(Value::Integer(31_253_811))
        );
        assert_eq!(coerce(ColumnKind::Decimal, "1,025.00"), Some(dec("1025")));
    }

    #[test]
    fn test_placeholders_are_null() {
        for token in ["--", "----", " - ", "除息", "", "\u{a0}"] {
            assert_eq!(coerce(ColumnKind::Decimal, token), Some(Value::Null), "{token:?}");
        }
        assert_eq!(coerce(ColumnKind::Text, "  "), Some(Value::Null));
    }

    #[test]
    fn test_signed_numbers() {
        assert_eq!(coerce(ColumnKind::Decimal, "+5.50"), Some(dec("5.5")));
        assert_eq!(coerce(ColumnKind::Decimal, "-0.35"), Some(dec("-0.35")));
        assert_eq!(coerce(ColumnKind::Integer, "-1,200"), Some(Value::Integer(-1200)));
    }

    #[test]
    fn test_integer_accepts_integral_decimal() {
        assert_eq!(coerce(ColumnKind::Integer, "1234.0"), Some(Value::Integer(1234)));
        assert_eq!(coerce(ColumnKind::Integer, "12.5"), None);
    }

    #[test]
    fn test_unparseable() {
        assert_eq!(coerce(ColumnKind::Integer, "合計"), None);
        assert_eq!(coerce(ColumnKind::Decimal, "abc"), None);
        assert_eq!(coerce(ColumnKind::Date, "someday"), None);
    }

    #[test]
    fn test_percent() {
        assert_eq!(coerce(ColumnKind::Percent, "1.25%"), Some(dec("0.0125")));
        assert_eq!(coerce(ColumnKind::Percent, "-0.5"), Some(dec("-0.005")));
    }

    #[test]
    fn test_dates() {
        let expected = Some(Value::Date(NaiveDate::from_ymd_opt(2024, 10, 15).unwrap()));
        assert_eq!(coerce(ColumnKind::Date, "2024-10-15"), expected);
        assert_eq!(coerce(ColumnKind::Date, "2024/10/15"), expected);
        assert_eq!(coerce(ColumnKind::Date, "20241015"), expected);
        assert_eq!(coerce(ColumnKind::Date, "113/10/15"), expected);
    }

    #[test]
    fn test_flags() {
        assert_eq!(coerce(ColumnKind::Flag, "是"), Some(Value::Integer(1)));
        assert_eq!(coerce(ColumnKind::Flag, "否"), Some(Value::Integer(0)));
        assert_eq!(coerce(ColumnKind::Flag, "*"), Some(Value::Null));
        assert_eq!(coerce(ColumnKind::Flag, "maybe"), None);
    }

    #[test]
    fn test_text_is_trimmed() {
        assert_eq!(
            coerce(ColumnKind::Text, "\u{feff} 台積電 "),
            Some(Value::Text("台積電".into()))
        );
    }
}
