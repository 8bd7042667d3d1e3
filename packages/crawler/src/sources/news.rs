//! Article rows shared by the news crawlers.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

use super::listing::Window;
use super::RawPayload;
use crate::config::taipei;
use crate::normalize::RawTable;

/// Raw header names every news crawler emits.
pub const HEADERS: &[&str] = &["Date", "Time", "Author", "Head", "SubHead", "HashTag", "url", "Content"];

/// One collected, date-verified article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub published: DateTime<FixedOffset>,
    pub author: String,
    pub head: String,
    pub sub_head: String,
    pub hashtag: String,
    pub url: String,
    pub content: String,
}

impl Article {
    fn cells(&self) -> Vec<String> {
        vec![
            self.published.format("%Y-%m-%d").to_string(),
            self.published.format("%H:%M:%S").to_string(),
            self.author.clone(),
            self.head.clone(),
            self.sub_head.clone(),
            self.hashtag.clone(),
            self.url.clone(),
            self.content.clone(),
        ]
    }
}

/// Rows in collection order.
pub fn articles_to_raw(articles: &[Article]) -> RawTable {
    let mut raw = RawTable::with_headers(HEADERS);
    for article in articles {
        raw.push(article.cells());
    }
    raw
}

/// Keep the articles whose own timestamp falls in `window` and turn them
/// into rows. List-page dates may be coarse or wrong; this is the check
/// that counts.
pub fn verified_rows(source: &str, window: &Window, articles: Vec<Article>) -> RawPayload {
    let collected = articles.len();
    let kept: Vec<Article> = articles
        .into_iter()
        .filter(|article| window.accepts(&article.published))
        .collect();
    if kept.len() < collected {
        tracing::debug!(
            source,
            dropped = collected - kept.len(),
            kept = kept.len(),
            "Dropped articles outside the window"
        );
    }
    RawPayload::Rows(articles_to_raw(&kept))
}

/// Comma-joined non-empty tags.
pub fn join_tags<I, S>(tags: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Unix seconds as Taipei time.
pub fn from_unix(seconds: i64) -> Option<DateTime<FixedOffset>> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .map(|at| at.with_timezone(&taipei()))
}

/// Parse an upstream timestamp. RFC 3339 keeps its offset (converted to
/// Taipei); offset-less forms are read as Taipei local time.
pub fn parse_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&taipei()));
    }
    const LOCAL_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
        "%Y/%m/%d %H:%M",
        "%Y.%m.%d %H:%M:%S",
        "%Y.%m.%d %H:%M",
        "%a %b %d %H:%M:%S %Y",
    ];
    LOCAL_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(text, format)
            .ok()
            .and_then(|naive| taipei().from_local_datetime(&naive).single())
    })
}
