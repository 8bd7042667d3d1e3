//! Economic Daily News (money.udn.com) Taiwan-stock news.
//!
//! Listing pages embed their article list as JSON-LD (`ItemList` of
//! `NewsArticle`), which carries exact publish times.

use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use reqwest::header::REFERER;
use scraper::{Html, Selector};
use serde_json::Value as Json;

use super::html::{absolutize, css, first_text, strip_query};
use super::listing::{scan, Listed, Listing, Stamp};
use super::markdown::{element_to_markdown, MarkdownOptions};
use super::news::{join_tags, parse_timestamp, verified_rows, Article};
use super::{CrawlContext, RawPayload, SourceCrawler};
use crate::error::{CrawlError, Result};
use crate::http::TransportOptions;
use crate::normalize::{ColumnKind, ColumnMap, ColumnSpec};
use crate::types::{DateMode, SourceDescriptor, TransportClass};

pub const BASE_URL: &str = "https://money.udn.com";

const LIST_PATH: &str = "/rank/newest/1001/5591";

const BODY_OPTIONS: MarkdownOptions<'static> = MarkdownOptions {
    images: true,
    skip_classes: &["edn-ads--inlineAds"],
    preformatted: false,
};

static LD_JSON: LazyLock<Selector> = LazyLock::new(|| css(r#"script[type="application/ld+json"]"#));
static HERO_FIGURE: LazyLock<Selector> = LazyLock::new(|| css("figure.article-image"));
static IMG: LazyLock<Selector> = LazyLock::new(|| css("img"));
static FIGCAPTION: LazyLock<Selector> = LazyLock::new(|| css("figcaption"));
static BODY: LazyLock<Selector> = LazyLock::new(|| css("#article_body"));
static BODY_FALLBACK: LazyLock<Selector> = LazyLock::new(|| css("section.article-body__editor"));

pub(crate) static COLUMNS: ColumnMap = ColumnMap::new(&[
    ColumnSpec::required("date", &["Date"], ColumnKind::Date),
    ColumnSpec::required("time", &["Time"], ColumnKind::Text),
    ColumnSpec::required("author", &["Author"], ColumnKind::Text),
    ColumnSpec::required("head", &["Head"], ColumnKind::Text),
    ColumnSpec::required("url", &["url"], ColumnKind::Text),
    ColumnSpec::required("content", &["Content"], ColumnKind::Text),
]);

pub static DESCRIPTOR: SourceDescriptor = SourceDescriptor {
    name: "moneyudn",
    description: "Economic Daily News Taiwan stock news",
    date_mode: DateMode::ByDate,
    transport: TransportClass::Plain,
    columns: &COLUMNS,
    base_url: BASE_URL,
    scan_depth: Some(10),
};

/// A listed article with its JSON-LD metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    pub title: String,
    pub author: String,
    pub published: DateTime<FixedOffset>,
}

pub struct MoneyUdnCrawler;

#[async_trait]
impl SourceCrawler for MoneyUdnCrawler {
    fn transport_options(&self, base_url: &str) -> TransportOptions {
        TransportOptions::browser()
            .accept_language("zh-TW,zh;q=0.9,en-US;q=0.8,en;q=0.7")
            .header(REFERER, format!("{base_url}/"))
    }

    async fn crawl(&self, ctx: &CrawlContext<'_>) -> Result<RawPayload> {
        let window = ctx.window()?;
        let mut listing = MoneyUdnListing {
            ctx,
            seen: HashSet::new(),
        };
        let candidates = scan("moneyudn", &mut listing, &window, ctx.scan_depth(), ctx.page_delay()).await?;

        let mut articles = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            ctx.pace().await;
            let content = match ctx.transport.get_text(&candidate.url).await {
                Ok(html) => parse_article(&html),
                Err(e) => {
                    tracing::warn!(url = %candidate.url, error = %e, "Failed to fetch article, skipping");
                    continue;
                }
            };
            articles.push(Article {
                published: candidate.published,
                author: candidate.author,
                head: candidate.title,
                sub_head: String::new(),
                hashtag: String::new(),
                url: candidate.url,
                content,
            });
        }

        Ok(verified_rows("moneyudn", &window, articles))
    }
}

struct MoneyUdnListing<'c, 'a> {
    ctx: &'c CrawlContext<'a>,
    seen: HashSet<String>,
}

#[async_trait]
impl<'c, 'a> Listing for MoneyUdnListing<'c, 'a> {
    type Item = Candidate;

    async fn page(&mut self, index: u32) -> Result<Option<Vec<Listed<Candidate>>>> {
        let url = self.ctx.url(&format!("{LIST_PATH}/{}", index + 1));
        let html = self.ctx.transport.get_text(&url).await?;

        let Some(entries) = parse_list(&html, &self.ctx.base_url) else {
            if index == 0 {
                return Err(CrawlError::layout("moneyudn", "no JSON-LD ItemList on the first listing page"));
            }
            return Ok(None);
        };
        if entries.is_empty() {
            return Ok(None);
        }

        let fresh = entries
            .into_iter()
            .filter(|listed| self.seen.insert(listed.item.url.clone()))
            .collect();
        Ok(Some(fresh))
    }
}

/// Author field as a plain string, object with `name`, or array of either.
fn author_name(author: Option<&Json>) -> String {
    match author {
        Some(Json::String(name)) => name.trim().to_string(),
        Some(Json::Object(object)) => object
            .get("name")
            .and_then(Json::as_str)
            .unwrap_or_default()
            .trim()
            .to_string(),
        Some(Json::Array(items)) => join_tags(items.iter().map(|item| author_name(Some(item)))),
        _ => String::new(),
    }
}

/// `NewsArticle` entries of the first JSON-LD `ItemList` on the page.
/// `None` when the page has no `ItemList` at all.
pub fn parse_list(html: &str, base_url: &str) -> Option<Vec<Listed<Candidate>>> {
    let document = Html::parse_document(html);

    for script in document.select(&LD_JSON) {
        let text: String = script.text().collect();
        let Ok(data) = serde_json::from_str::<Json>(&text) else {
            continue;
        };
        let graph = match data.get("@graph") {
            Some(Json::Array(items)) => items.clone(),
            _ => vec![data],
        };
        let Some(list) = graph.iter().find(|node| node.get("@type").and_then(Json::as_str) == Some("ItemList")) else {
            continue;
        };

        let elements = list
            .get("itemListElement")
            .and_then(Json::as_array)
            .cloned()
            .unwrap_or_default();
        let entries = elements
            .iter()
            .filter_map(|element| list_entry(element.get("item").unwrap_or(element), base_url))
            .collect();
        return Some(entries);
    }
    None
}

fn list_entry(article: &Json, base_url: &str) -> Option<Listed<Candidate>> {
    if article.get("@type").and_then(Json::as_str) != Some("NewsArticle") {
        return None;
    }
    let href = article.get("url").and_then(Json::as_str).filter(|u| !u.trim().is_empty())?;
    let published = article.get("datePublished").and_then(Json::as_str).and_then(parse_timestamp);
    let Some(published) = published else {
        tracing::debug!(url = href, "Listing entry without a usable datePublished");
        return None;
    };
    let title = ["name", "headline"]
        .iter()
        .filter_map(|key| article.get(*key).and_then(Json::as_str))
        .map(str::trim)
        .find(|t| !t.is_empty())
        .unwrap_or_default()
        .to_string();

    Some(Listed::new(
        Stamp::Instant(published),
        Candidate {
            url: strip_query(&absolutize(base_url, href.trim())),
            title,
            author: author_name(article.get("author")),
            published,
        },
    ))
}

/// Article body as markdown, led by the hero image when there is one.
pub fn parse_article(html: &str) -> String {
    let document = Html::parse_document(html);

    let hero = document.select(&HERO_FIGURE).next().and_then(|figure| {
        let img = figure.select(&IMG).next()?;
        let src = img
            .value()
            .attr("src")
            .or_else(|| img.value().attr("data-src"))
            .map(str::trim)
            .filter(|s| !s.is_empty())?;
        let caption = first_text(figure, &FIGCAPTION).unwrap_or_default();
        Some(format!("![{caption}]({src})"))
    });

    let body = document
        .select(&BODY)
        .next()
        .or_else(|| document.select(&BODY_FALLBACK).next())
        .map(|section| element_to_markdown(section, BODY_OPTIONS))
        .unwrap_or_default();

    match hero {
        Some(hero) if body.is_empty() => hero,
        Some(hero) => format!("{hero}\n\n{body}"),
        None => body,
    }
}
