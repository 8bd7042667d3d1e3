//! Commercial Times (CTEE) Taiwan-market news.
//!
//! The first listing page is the category's HTML page; older pages come
//! from the category JSON API starting at API page 2. Article pages carry
//! the body, tags and the exact publish time.

use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use scraper::{Html, Selector};
use serde::Deserialize;

use super::html::{absolutize, css, first_attr, first_text, text_of};
use super::listing::{scan, Listed, Listing, Stamp};
use super::news::{join_tags, parse_timestamp, verified_rows, Article};
use super::{CrawlContext, RawPayload, SourceCrawler};
use crate::error::Result;
use crate::http::{decode_json, TransportOptions};
use crate::normalize::{parse_date, ColumnKind, ColumnMap, ColumnSpec};
use crate::types::{DateMode, SourceDescriptor, TransportClass};

pub const BASE_URL: &str = "https://www.ctee.com.tw";

const LIST_PATH: &str = "/stock/twmarket";

/// Paragraphs holding this phrase are share/clipboard widgets.
const CLIPBOARD_MARKER: &str = "剪貼簿";

static CARD: LazyLock<Selector> = LazyLock::new(|| css("div.newslist__card"));
static CARD_LINK: LazyLock<Selector> = LazyLock::new(|| css("h3.news-title a"));
static CARD_TIME: LazyLock<Selector> = LazyLock::new(|| css("time.news-time"));
static SUB_TITLE: LazyLock<Selector> = LazyLock::new(|| css(".sub-title"));
static TAG_ITEM: LazyLock<Selector> = LazyLock::new(|| css("li.taglist__item"));
static KEYWORDS_META: LazyLock<Selector> = LazyLock::new(|| css(r#"meta[name="keywords"]"#));
static PUBLISHED_META: LazyLock<Selector> = LazyLock::new(|| {
    css(r#"meta[name="article:published_time"], meta[property="article:published_time"]"#)
});
static PUBLISH_TIME: LazyLock<Selector> = LazyLock::new(|| css("li.publish-time"));
static PUBLISH_AUTHOR: LazyLock<Selector> = LazyLock::new(|| css("li.publish-author"));
static AUTHOR_META: LazyLock<Selector> = LazyLock::new(|| css(r#"meta[name="author"]"#));
static BODY_PARAGRAPH: LazyLock<Selector> = LazyLock::new(|| css("div.article-wrap article p"));

pub(crate) static COLUMNS: ColumnMap = ColumnMap::new(&[
    ColumnSpec::required("date", &["Date"], ColumnKind::Date),
    ColumnSpec::required("time", &["Time"], ColumnKind::Text),
    ColumnSpec::required("author", &["Author"], ColumnKind::Text),
    ColumnSpec::required("head", &["Head"], ColumnKind::Text),
    ColumnSpec::required("sub_head", &["SubHead"], ColumnKind::Text),
    ColumnSpec::required("hashtag", &["HashTag"], ColumnKind::Text),
    ColumnSpec::required("url", &["url"], ColumnKind::Text),
    ColumnSpec::required("content", &["Content"], ColumnKind::Text),
]);

pub static DESCRIPTOR: SourceDescriptor = SourceDescriptor {
    name: "ctee",
    description: "Commercial Times Taiwan market news",
    date_mode: DateMode::ByDate,
    transport: TransportClass::ChallengeCapable,
    columns: &COLUMNS,
    base_url: BASE_URL,
    scan_depth: Some(20),
};

/// A listed article awaiting its page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    pub title: String,
    pub author: String,
    /// Listing-time timestamp, used when the article page has none.
    pub listed_at: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    publish_datetime: Option<String>,
    #[serde(default)]
    publish_date: Option<String>,
    #[serde(default)]
    hyper_link: Option<String>,
}

/// Fields read from an article page.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ArticlePage {
    pub sub_head: String,
    pub tags: Vec<String>,
    pub published: Option<DateTime<FixedOffset>>,
    pub author: String,
    pub content: String,
}

pub struct CteeCrawler;

#[async_trait]
impl SourceCrawler for CteeCrawler {
    fn transport_options(&self, base_url: &str) -> TransportOptions {
        TransportOptions::browser()
            .accept_language("zh-TW,zh;q=0.9,en-US;q=0.8,en;q=0.7")
            .warmup(format!("{base_url}/"))
    }

    async fn crawl(&self, ctx: &CrawlContext<'_>) -> Result<RawPayload> {
        let window = ctx.window()?;
        let mut listing = CteeListing {
            ctx,
            seen: HashSet::new(),
        };
        let candidates = scan("ctee", &mut listing, &window, ctx.scan_depth(), ctx.page_delay()).await?;

        let mut articles = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            ctx.pace().await;
            let html = match ctx.transport.get_text(&candidate.url).await {
                Ok(html) => html,
                Err(e) => {
                    tracing::warn!(url = %candidate.url, error = %e, "Failed to fetch article, skipping");
                    continue;
                }
            };
            let page = parse_article(&html);
            let Some(published) = page.published.or(candidate.listed_at) else {
                tracing::warn!(url = %candidate.url, "Article without a publish time, skipping");
                continue;
            };
            articles.push(Article {
                published,
                author: if page.author.is_empty() {
                    candidate.author
                } else {
                    page.author
                },
                head: candidate.title,
                sub_head: page.sub_head,
                hashtag: join_tags(&page.tags),
                url: candidate.url,
                content: page.content,
            });
        }

        Ok(verified_rows("ctee", &window, articles))
    }
}

struct CteeListing<'c, 'a> {
    ctx: &'c CrawlContext<'a>,
    seen: HashSet<String>,
}

#[async_trait]
impl<'c, 'a> Listing for CteeListing<'c, 'a> {
    type Item = Candidate;

    async fn page(&mut self, index: u32) -> Result<Option<Vec<Listed<Candidate>>>> {
        let entries = if index == 0 {
            let html = self.ctx.transport.get_text(&self.ctx.url(LIST_PATH)).await?;
            parse_list_html(&html, &self.ctx.base_url)
        } else {
            let url = self.ctx.url(&format!("/api/category/twmarket/{}", index + 1));
            let body = self.ctx.transport.get_text(&url).await?;
            match parse_list_api(&body, &self.ctx.base_url)? {
                Some(entries) => entries,
                None => return Ok(None),
            }
        };

        let fresh = entries
            .into_iter()
            .filter(|listed| self.seen.insert(listed.item.url.clone()))
            .collect();
        Ok(Some(fresh))
    }
}

/// Date shown on a list card, e.g. `2024.10.15` or `2024.10.15 14:30`.
fn card_stamp(text: &str) -> Stamp {
    if let Some(at) = parse_timestamp(text) {
        return Stamp::Instant(at);
    }
    text.split_whitespace()
        .next()
        .and_then(parse_date)
        .map_or(Stamp::Unknown, Stamp::Day)
}

/// Cards of the category HTML page.
pub fn parse_list_html(html: &str, base_url: &str) -> Vec<Listed<Candidate>> {
    let document = Html::parse_document(html);
    let mut entries = Vec::new();

    for card in document.select(&CARD) {
        let Some(link) = card.select(&CARD_LINK).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href").filter(|h| h.contains("/news/")) else {
            continue;
        };
        let stamp = first_text(card, &CARD_TIME).map_or(Stamp::Unknown, |t| card_stamp(&t));
        let listed_at = match stamp {
            Stamp::Instant(at) => Some(at),
            _ => None,
        };
        entries.push(Listed::new(
            stamp,
            Candidate {
                url: absolutize(base_url, href),
                title: text_of(link),
                author: String::new(),
                listed_at,
            },
        ));
    }
    entries
}

/// Items of a category API page; `None` once the API runs dry.
pub fn parse_list_api(body: &str, base_url: &str) -> Result<Option<Vec<Listed<Candidate>>>> {
    let items: Vec<ApiItem> = decode_json("ctee", body)?;
    if items.is_empty() {
        return Ok(None);
    }

    let entries = items
        .into_iter()
        .filter_map(|item| {
            let href = item.hyper_link.filter(|h| !h.trim().is_empty())?;
            let listed_at = item.publish_datetime.as_deref().and_then(parse_timestamp);
            let stamp = match (listed_at, item.publish_date.as_deref().and_then(parse_date)) {
                (Some(at), _) => Stamp::Instant(at),
                (None, Some(day)) => Stamp::Day(day),
                (None, None) => Stamp::Unknown,
            };
            Some(Listed::new(
                stamp,
                Candidate {
                    url: absolutize(base_url, href.trim()),
                    title: item.title.unwrap_or_default(),
                    author: item.author.unwrap_or_default(),
                    listed_at,
                },
            ))
        })
        .collect();
    Ok(Some(entries))
}

/// Sub-title, tags, publish time, author and body of an article page.
pub fn parse_article(html: &str) -> ArticlePage {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let mut tags: Vec<String> = document
        .select(&TAG_ITEM)
        .map(text_of)
        .filter(|t| !t.is_empty())
        .collect();
    if tags.is_empty() {
        tags = first_attr(root, &KEYWORDS_META, "content")
            .map(|keywords| {
                keywords
                    .split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect()
            })
            .unwrap_or_default();
    }

    let published = first_attr(root, &PUBLISHED_META, "content")
        .and_then(|text| parse_timestamp(&text))
        .or_else(|| first_text(root, &PUBLISH_TIME).and_then(|text| parse_timestamp(&text)));

    let author = first_text(root, &PUBLISH_AUTHOR)
        .or_else(|| first_attr(root, &AUTHOR_META, "content"))
        .unwrap_or_default();

    let content = document
        .select(&BODY_PARAGRAPH)
        .map(text_of)
        .filter(|p| !p.is_empty() && !p.contains(CLIPBOARD_MARKER))
        .collect::<Vec<_>>()
        .join("\n\n");

    ArticlePage {
        sub_head: first_text(root, &SUB_TITLE).unwrap_or_default(),
        tags,
        published,
        author,
        content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    const LIST: &str = r#"<html><body>
<div class="newslist__card"><h3 class="news-title"><a href="/news/20241015700123-430202">台股收紅</a></h3><time class="news-time">2024.10.15</time></div>
<div class="newslist__card"><h3 class="news-title"><a href="/video/123">影音</a></h3><time class="news-time">2024.10.15</time></div>
<div class="newslist__card"><h3 class="news-title"><a href="https://www.ctee.com.tw/news/20241014700001-430202">昨日盤勢</a></h3><time class="news-time">2024.10.14 18:05</time></div>
</body></html>"#;

    #[test]
    fn test_parse_list_html() {
        let entries = parse_list_html(LIST, "https://www.ctee.com.tw");
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].stamp,
            Stamp::Day(NaiveDate::from_ymd_opt(2024, 10, 15).unwrap())
        );
        assert_eq!(entries[0].item.url, "https://www.ctee.com.tw/news/20241015700123-430202");
        assert!(matches!(entries[1].stamp, Stamp::Instant(_)));
        assert!(entries[1].item.listed_at.is_some());
    }

    #[test]
    fn test_parse_list_api() {
        let body = r#"[
            {"title":"外資賣超","author":"記者甲","publishDatetime":"2024-10-14T16:20:00+08:00","publishDate":"2024.10.14","hyperLink":"/news/20241014700321-430202"},
            {"title":"沒有連結","publishDate":"2024.10.14","hyperLink":""},
            {"title":"只有日期","publishDate":"2024.10.13","hyperLink":"https://www.ctee.com.tw/news/2"}
        ]"#;
        let entries = parse_list_api(body, "https://www.ctee.com.tw").unwrap().unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].item.author, "記者甲");
        assert_eq!(entries[0].item.url, "https://www.ctee.com.tw/news/20241014700321-430202");
        assert_eq!(
            entries[1].stamp,
            Stamp::Day(NaiveDate::from_ymd_opt(2024, 10, 13).unwrap())
        );
        assert!(parse_list_api("[]", "https://www.ctee.com.tw").unwrap().is_none());
    }

    #[test]
    fn test_parse_article() {
        let html = r#"<html><head>
<meta name="keywords" content="台股, 加權指數">
<meta property="article:published_time" content="2024-10-15T13:45:00+08:00">
</head><body>
<h2 class="sub-title">電子股領漲</h2>
<ul><li class="publish-author">記者乙</li><li class="publish-time">2024.10.15 13:45</li></ul>
<div class="article-wrap"><article>
<p>台股今日上漲。</p><p> </p><p>加入剪貼簿</p><p>成交量放大。</p>
</article></div></body></html>"#;
        let page = parse_article(html);

        assert_eq!(page.sub_head, "電子股領漲");
        assert_eq!(page.tags, vec!["台股", "加權指數"]);
        assert_eq!(page.author, "記者乙");
        assert_eq!(
            page.published.map(|at| at.to_rfc3339()),
            Some("2024-10-15T13:45:00+08:00".to_string())
        );
        assert_eq!(page.content, "台股今日上漲。\n\n成交量放大。");
    }

    #[test]
    fn test_article_prefers_tag_list() {
        let html = r#"<ul><li class="taglist__item">台積電</li><li class="taglist__item">法說</li></ul>
<meta name="keywords" content="ignored">"#;
        assert_eq!(parse_article(html).tags, vec!["台積電", "法說"]);
    }
}
