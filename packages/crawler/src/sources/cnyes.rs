//! Anue (cnyes) Taiwan-stock news from the public JSON news list.
//!
//! The list API carries full article bodies (entity-encoded HTML), so no
//! article pages are fetched.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as Json;

use super::listing::{scan, Listed, Listing, Stamp};
use super::markdown::{html_to_markdown, MarkdownOptions};
use super::news::{from_unix, join_tags, verified_rows, Article};
use super::{CrawlContext, RawPayload, SourceCrawler};
use crate::error::{CrawlError, Result};
use crate::http::{decode_json, HttpRequest};
use crate::normalize::{cell_text, ColumnKind, ColumnMap, ColumnSpec};
use crate::types::{DateMode, SourceDescriptor, TransportClass};

pub const BASE_URL: &str = "https://api.cnyes.com";

const ARTICLE_URL: &str = "https://news.cnyes.com/news/id";

pub(crate) static COLUMNS: ColumnMap = ColumnMap::new(&[
    ColumnSpec::required("date", &["Date"], ColumnKind::Date),
    ColumnSpec::required("time", &["Time"], ColumnKind::Text),
    ColumnSpec::required("author", &["Author"], ColumnKind::Text),
    ColumnSpec::required("head", &["Head"], ColumnKind::Text),
    ColumnSpec::required("hashtag", &["HashTag"], ColumnKind::Text),
    ColumnSpec::required("url", &["url"], ColumnKind::Text),
    ColumnSpec::required("content", &["Content"], ColumnKind::Text),
]);

pub static DESCRIPTOR: SourceDescriptor = SourceDescriptor {
    name: "cnyes",
    description: "Anue (cnyes) Taiwan stock news",
    date_mode: DateMode::ByDate,
    transport: TransportClass::Plain,
    columns: &COLUMNS,
    base_url: BASE_URL,
    scan_depth: Some(20),
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsListResponse {
    status_code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    items: Option<NewsPage>,
}

#[derive(Debug, Deserialize)]
struct NewsPage {
    #[serde(default)]
    last_page: Option<u32>,
    #[serde(default)]
    data: Vec<NewsItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsItem {
    news_id: Option<Json>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    publish_at: Option<i64>,
    #[serde(default)]
    keyword: Option<Vec<Json>>,
    #[serde(default)]
    content: Option<String>,
}

/// One decoded list page.
#[derive(Debug)]
pub struct NewsListPage {
    pub last_page: Option<u32>,
    pub articles: Vec<Listed<Article>>,
}

pub struct CnyesCrawler;

#[async_trait]
impl SourceCrawler for CnyesCrawler {
    async fn crawl(&self, ctx: &CrawlContext<'_>) -> Result<RawPayload> {
        let window = ctx.window()?;
        let mut listing = CnyesListing { ctx, last_page: None };
        let articles = scan("cnyes", &mut listing, &window, ctx.scan_depth(), ctx.page_delay()).await?;
        Ok(verified_rows("cnyes", &window, articles))
    }
}

struct CnyesListing<'c, 'a> {
    ctx: &'c CrawlContext<'a>,
    last_page: Option<u32>,
}

#[async_trait]
impl<'c, 'a> Listing for CnyesListing<'c, 'a> {
    type Item = Article;

    async fn page(&mut self, index: u32) -> Result<Option<Vec<Listed<Article>>>> {
        let page = index + 1;
        if self.last_page.is_some_and(|last| page > last) {
            return Ok(None);
        }

        let request = HttpRequest::get(self.ctx.url("/media/api/v1/newslist/category/tw_stock"))
            .query(&[("page", page.to_string().as_str())]);
        let body = self.ctx.transport.send(&request).await?.body;
        let decoded = parse_page(&body)?;

        if decoded.last_page.is_some() {
            self.last_page = decoded.last_page;
        }
        if decoded.articles.is_empty() {
            return Ok(None);
        }
        Ok(Some(decoded.articles))
    }
}

/// Decode one list page. Items without a publish time are skipped.
pub fn parse_page(body: &str) -> Result<NewsListPage> {
    let response: NewsListResponse = decode_json("cnyes", body)?;
    if response.status_code != Some(200) {
        return Err(CrawlError::UpstreamApi {
            source_name: "cnyes".to_string(),
            message: format!(
                "statusCode {} {}",
                response.status_code.map_or_else(|| "missing".to_string(), |c| c.to_string()),
                response.message.unwrap_or_default()
            ),
        });
    }

    let Some(items) = response.items else {
        return Ok(NewsListPage {
            last_page: None,
            articles: Vec::new(),
        });
    };

    let mut articles = Vec::with_capacity(items.data.len());
    for item in items.data {
        let news_id = item.news_id.as_ref().map(cell_text).unwrap_or_default();
        let Some(published) = item.publish_at.and_then(from_unix) else {
            tracing::warn!(news_id = %news_id, "News item without publishAt, skipping");
            continue;
        };

        let content = item
            .content
            .as_deref()
            .map(|encoded| {
                let decoded = html_escape::decode_html_entities(encoded);
                html_to_markdown(&decoded, MarkdownOptions::default())
            })
            .unwrap_or_default();

        let article = Article {
            published,
            author: item.author.unwrap_or_default(),
            head: item.title.unwrap_or_default(),
            sub_head: String::new(),
            hashtag: join_tags(item.keyword.unwrap_or_default().iter().map(cell_text)),
            url: format!("{ARTICLE_URL}/{news_id}"),
            content,
        };
        articles.push(Listed::new(Stamp::Instant(published), article));
    }

    Ok(NewsListPage {
        last_page: items.last_page,
        articles,
    })
}
