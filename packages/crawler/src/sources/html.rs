//! HTML helpers shared by the news crawlers.

use scraper::{ElementRef, Selector};
use url::Url;

/// Compile a selector literal.
#[allow(clippy::expect_used)] // Only called with string literals from static selectors
pub fn css(selector: &'static str) -> Selector {
    Selector::parse(selector).expect("valid selector")
}

/// Whitespace-collapsed text content of an element.
pub fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first element matching `selector` under `scope`.
pub fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
}

/// Attribute of the first element matching `selector` under `scope`.
pub fn first_attr(scope: ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    scope
        .select(selector)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(String::from)
}

/// True when `element` carries `class`.
pub fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

/// Resolve `href` against `base`. Unresolvable links come back unchanged.
pub fn absolutize(base: &str, href: &str) -> String {
    match Url::parse(base).and_then(|b| b.join(href)) {
        Ok(url) => url.to_string(),
        Err(_) => href.to_string(),
    }
}

/// URL without its query string and fragment.
pub fn strip_query(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or(url)
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_text_of_collapses_whitespace() {
        let doc = Html::parse_fragment("<div>  台股\n  <b>收紅</b>  </div>");
        let div = doc.select(&css("div")).next().unwrap();
        assert_eq!(text_of(div), "台股 收紅");
    }

    #[test]
    fn test_absolutize() {
        assert_eq!(
            absolutize("https://www.ptt.cc/bbs/Stock/index.html", "/bbs/Stock/index39.html"),
            "https://www.ptt.cc/bbs/Stock/index39.html"
        );
        assert_eq!(
            absolutize("https://www.ctee.com.tw", "https://www.ctee.com.tw/news/1.html"),
            "https://www.ctee.com.tw/news/1.html"
        );
    }

    #[test]
    fn test_strip_query() {
        assert_eq!(
            strip_query("https://money.udn.com/money/story/5607/8291?from=edn_newest#top"),
            "https://money.udn.com/money/story/5607/8291"
        );
    }
}
