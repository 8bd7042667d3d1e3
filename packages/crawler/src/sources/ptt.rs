//! PTT Stock board posts.
//!
//! The board index is walked backwards through its "上頁" links. List
//! entries only show a year-less `M/DD`, so every candidate post is
//! opened to read its full timestamp and body.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate};
use scraper::{ElementRef, Html, Selector};

use super::html::{absolutize, css, first_text, has_class, text_of};
use super::listing::{scan, Listed, Listing, Stamp};
use super::markdown::{element_to_markdown, MarkdownOptions};
use super::news::{parse_timestamp, verified_rows, Article};
use super::{CrawlContext, RawPayload, SourceCrawler};
use crate::error::Result;
use crate::http::TransportOptions;
use crate::normalize::{ColumnKind, ColumnMap, ColumnSpec};
use crate::types::{DateMode, SourceDescriptor, TransportClass};

pub const BASE_URL: &str = "https://www.ptt.cc";

const INDEX_PATH: &str = "/bbs/stock/index.html";

/// Signature markers, tried in order; the body is cut at the last one found.
const SIGNATURE_MARKERS: &[&str] = &["※ 發信站", "\n--"];

/// Line separating the body from the signature block.
const SIGNATURE_SEPARATOR: &str = "--";

/// Post bodies are laid out as preformatted text around the header and push blocks.
const BODY_OPTIONS: MarkdownOptions<'static> = MarkdownOptions {
    images: false,
    skip_classes: &["article-metaline", "article-metaline-right", "push"],
    preformatted: true,
};

static ENTRY: LazyLock<Selector> = LazyLock::new(|| css("div.r-ent, div.r-list-sep"));
static TITLE_LINK: LazyLock<Selector> = LazyLock::new(|| css("div.title a"));
static AUTHOR: LazyLock<Selector> = LazyLock::new(|| css("div.meta div.author"));
static LIST_DATE: LazyLock<Selector> = LazyLock::new(|| css("div.meta div.date"));
static PAGING_LINK: LazyLock<Selector> = LazyLock::new(|| css("div.btn-group-paging a"));
static META_VALUE: LazyLock<Selector> = LazyLock::new(|| css("div.article-metaline span.article-meta-value"));
static MAIN_CONTENT: LazyLock<Selector> = LazyLock::new(|| css("#main-content"));

pub(crate) static COLUMNS: ColumnMap = ColumnMap::new(&[
    ColumnSpec::required("date", &["Date"], ColumnKind::Date),
    ColumnSpec::required("time", &["Time"], ColumnKind::Text),
    ColumnSpec::required("author", &["Author"], ColumnKind::Text),
    ColumnSpec::required("head", &["Head"], ColumnKind::Text),
    ColumnSpec::required("url", &["url"], ColumnKind::Text),
    ColumnSpec::required("content", &["Content"], ColumnKind::Text),
]);

pub static DESCRIPTOR: SourceDescriptor = SourceDescriptor {
    name: "ptt",
    description: "PTT Stock board posts",
    date_mode: DateMode::ByDate,
    transport: TransportClass::Plain,
    columns: &COLUMNS,
    base_url: BASE_URL,
    scan_depth: Some(30),
};

/// A post as listed on an index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    pub title: String,
    pub author: String,
}

#[derive(Debug)]
pub struct IndexPage {
    pub entries: Vec<Listed<Candidate>>,
    /// Link to the next older index page.
    pub previous: Option<String>,
}

#[derive(Debug)]
pub struct PostDetail {
    pub published: Option<DateTime<FixedOffset>>,
    pub content: String,
}

pub struct PttCrawler;

#[async_trait]
impl SourceCrawler for PttCrawler {
    fn transport_options(&self, base_url: &str) -> TransportOptions {
        TransportOptions::browser().cookie("over18=1", base_url)
    }

    async fn crawl(&self, ctx: &CrawlContext<'_>) -> Result<RawPayload> {
        let window = ctx.window()?;
        let mut listing = PttListing {
            ctx,
            today: ctx.now.date_naive(),
            next: Some(ctx.url(INDEX_PATH)),
        };
        let candidates = scan("ptt", &mut listing, &window, ctx.scan_depth(), ctx.page_delay()).await?;

        let mut articles = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            ctx.pace().await;
            let html = match ctx.transport.get_text(&candidate.url).await {
                Ok(html) => html,
                Err(e) => {
                    tracing::warn!(url = %candidate.url, error = %e, "Failed to fetch post, skipping");
                    continue;
                }
            };
            let detail = parse_post(&html);
            let Some(published) = detail.published else {
                tracing::warn!(url = %candidate.url, "Post without a readable timestamp, skipping");
                continue;
            };
            articles.push(Article {
                published,
                author: candidate.author,
                head: candidate.title,
                sub_head: String::new(),
                hashtag: String::new(),
                url: candidate.url,
                content: detail.content,
            });
        }

        Ok(verified_rows("ptt", &window, articles))
    }
}

struct PttListing<'c, 'a> {
    ctx: &'c CrawlContext<'a>,
    today: NaiveDate,
    next: Option<String>,
}

#[async_trait]
impl<'c, 'a> Listing for PttListing<'c, 'a> {
    type Item = Candidate;

    async fn page(&mut self, _index: u32) -> Result<Option<Vec<Listed<Candidate>>>> {
        let Some(url) = self.next.take() else {
            return Ok(None);
        };
        let html = self.ctx.transport.get_text(&url).await?;
        let page = parse_index(&html, &url, self.today);
        self.next = page.previous;
        Ok(Some(page.entries))
    }
}

/// Complete a list `M/DD` with the latest year that does not put it after `today`.
pub fn infer_list_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let (month, day) = text.trim().split_once('/')?;
    let month: u32 = month.trim().parse().ok()?;
    let day: u32 = day.trim().parse().ok()?;
    match NaiveDate::from_ymd_opt(today.year(), month, day) {
        Some(date) if date <= today => Some(date),
        _ => NaiveDate::from_ymd_opt(today.year() - 1, month, day),
    }
}

/// Entries above the pinned-post separator, plus the "上頁" link.
pub fn parse_index(html: &str, page_url: &str, today: NaiveDate) -> IndexPage {
    let document = Html::parse_document(html);
    let mut entries = Vec::new();

    for element in document.select(&ENTRY) {
        if has_class(element, "r-list-sep") {
            break;
        }
        // deleted posts keep their row but lose the link
        let Some(link) = element.select(&TITLE_LINK).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };

        let stamp = first_text(element, &LIST_DATE)
            .and_then(|text| infer_list_date(&text, today))
            .map_or(Stamp::Unknown, Stamp::Day);
        entries.push(Listed::new(
            stamp,
            Candidate {
                url: absolutize(page_url, href),
                title: text_of(link),
                author: first_text(element, &AUTHOR).unwrap_or_default(),
            },
        ));
    }

    let previous = document
        .select(&PAGING_LINK)
        .find(|a| text_of(*a).contains("上頁"))
        .and_then(|a| a.value().attr("href"))
        .filter(|href| !href.trim().is_empty())
        .map(|href| absolutize(page_url, href));

    IndexPage { entries, previous }
}

/// Full timestamp and body of a post page.
pub fn parse_post(html: &str) -> PostDetail {
    let document = Html::parse_document(html);

    let published = document
        .select(&META_VALUE)
        .nth(2)
        .map(text_of)
        .and_then(|text| parse_timestamp(&text));

    let content = document
        .select(&MAIN_CONTENT)
        .next()
        .map(post_body)
        .unwrap_or_default();

    PostDetail { published, content }
}

fn post_body(main: ElementRef<'_>) -> String {
    let text = element_to_markdown(main, BODY_OPTIONS);
    let body = SIGNATURE_MARKERS
        .iter()
        .find_map(|marker| text.rfind(marker).map(|at| &text[..at]))
        .unwrap_or(&text)
        .trim_end();
    let body = match body.strip_suffix(SIGNATURE_SEPARATOR) {
        Some(rest) if rest.is_empty() || rest.ends_with('\n') => rest,
        _ => body,
    };
    body.trim().to_string()
}
