//! Origin-named rows produced by structural extraction.

use serde_json::{Map, Value as Json};
use unicode_normalization::UnicodeNormalization;

/// Rows of untyped cells under the upstream's own header names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn with_headers(headers: &[&str]) -> Self {
        Self::new(headers.iter().map(|h| (*h).to_string()).collect())
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Build from a `fields` header list and positional `data` rows.
    pub fn from_json_rows(fields: &[Json], data: &[Json]) -> Self {
        let headers = fields.iter().map(cell_text).collect();
        let rows = data
            .iter()
            .map(|row| match row {
                Json::Array(cells) => cells.iter().map(cell_text).collect(),
                other => vec![cell_text(other)],
            })
            .collect();
        Self { headers, rows }
    }

    /// Build from an array of JSON objects; headers in first-seen key order.
    pub fn from_objects(objects: &[Map<String, Json>]) -> Self {
        let mut headers: Vec<String> = Vec::new();
        for object in objects {
            for key in object.keys() {
                if !headers.iter().any(|h| h == key) {
                    headers.push(key.clone());
                }
            }
        }
        let rows = objects
            .iter()
            .map(|object| {
                headers
                    .iter()
                    .map(|h| object.get(h).map(cell_text).unwrap_or_default())
                    .collect()
            })
            .collect();
        Self { headers, rows }
    }

    /// Append a constant column, e.g. the request date.
    pub fn add_constant_column(&mut self, header: &str, value: &str) {
        self.headers.push(header.to_string());
        for row in &mut self.rows {
            row.push(value.to_string());
        }
    }

    /// Index of the first header matching `name` after header normalization.
    pub fn header_index(&self, name: &str) -> Option<usize> {
        let wanted = normalize_header(name);
        self.headers
            .iter()
            .position(|h| normalize_header(h) == wanted)
    }
}

/// Render a JSON cell as text. `null` becomes the empty string.
pub fn cell_text(value: &Json) -> String {
    match value {
        Json::Null => String::new(),
        Json::String(s) => s.clone(),
        Json::Bool(b) => b.to_string(),
        Json::Number(n) => n.to_string(),
        Json::Array(items) => items
            .iter()
            .map(cell_text)
            .collect::<Vec<_>>()
            .join(","),
        Json::Object(_) => value.to_string(),
    }
}

/// Canonical form of an upstream header name.
///
/// NFKC folds full-width punctuation, `<br>` line breaks and every kind of
/// whitespace (including the byte-order mark) are removed.
pub fn normalize_header(header: &str) -> String {
    let folded: String = header.nfkc().collect();
    folded
        .replace("<br>", "")
        .replace("<BR>", "")
        .replace("<br/>", "")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{feff}')
        .collect()
}
