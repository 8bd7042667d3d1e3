//! Transport adapters: HTTP clients matched to a source's anti-automation posture.
//!
//! Both variants share one retry loop. Transient failures (connection
//! errors, timeouts, 5xx) are retried with exponential backoff up to
//! `max_attempts`; any other 4xx is returned immediately. The
//! challenge-capable variant additionally recognizes interstitial
//! "checking your browser" pages, re-warms its session on the site's
//! origin (collecting clearance cookies) and replays the original request.
//! It does not execute JavaScript; a challenge that needs a real browser
//! ends as [`CrawlError::ChallengeUnresolved`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::{CrawlerConfig, BROWSER_USER_AGENT, USER_AGENT};
use crate::error::{CrawlError, Result};
use crate::types::TransportClass;

/// Body fragments served by common challenge interstitials.
const CHALLENGE_MARKERS: &[&str] = &[
    "Just a moment...",
    "cf-chl",
    "_cf_chl_opt",
    "challenge-platform",
    "Attention Required!",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    PostForm,
}

/// One logical request, replayable across attempts.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub headers: Vec<(HeaderName, String)>,
    /// Charset used when the response does not declare one.
    pub fallback_charset: &'static str,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            form: Vec::new(),
            headers: Vec::new(),
            fallback_charset: "utf-8",
        }
    }

    pub fn post_form(url: impl Into<String>, form: &[(&str, &str)]) -> Self {
        Self {
            method: Method::PostForm,
            form: pairs(form),
            ..Self::get(url)
        }
    }

    pub fn query(mut self, query: &[(&str, &str)]) -> Self {
        self.query.extend(pairs(query));
        self
    }

    pub fn header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn fallback_charset(mut self, charset: &'static str) -> Self {
        self.fallback_charset = charset;
        self
    }
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// Decoded response body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// HTTP client strategy selected from a source's descriptor.
#[async_trait]
pub trait Transport: Send + Sync {
    fn class(&self) -> TransportClass;

    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;

    async fn get_text(&self, url: &str) -> Result<String> {
        Ok(self.send(&HttpRequest::get(url)).await?.body)
    }
}

/// Per-source client settings.
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    /// Send a desktop browser user agent instead of the crate's own.
    pub browser: bool,
    pub accept_language: Option<&'static str>,
    pub headers: Vec<(HeaderName, String)>,
    /// Cookies pre-seeded for `cookie_url`, e.g. `over18=1`.
    pub cookies: Vec<&'static str>,
    pub cookie_url: Option<String>,
    /// Page requested to obtain session cookies before the first real request.
    pub warmup_url: Option<String>,
}

impl TransportOptions {
    pub fn browser() -> Self {
        Self {
            browser: true,
            ..Self::default()
        }
    }

    pub fn accept_language(mut self, value: &'static str) -> Self {
        self.accept_language = Some(value);
        self
    }

    pub fn header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn cookie(mut self, cookie: &'static str, url: impl Into<String>) -> Self {
        self.cookies.push(cookie);
        self.cookie_url = Some(url.into());
        self
    }

    pub fn warmup(mut self, url: impl Into<String>) -> Self {
        self.warmup_url = Some(url.into());
        self
    }
}

fn build_client(config: &CrawlerConfig, options: &TransportOptions, browser: bool) -> Result<Client> {
    let jar = Arc::new(Jar::default());
    if let Some(cookie_url) = &options.cookie_url {
        let url = Url::parse(cookie_url)
            .map_err(|e| CrawlError::Config(format!("invalid cookie url '{cookie_url}': {e}")))?;
        for cookie in &options.cookies {
            jar.add_cookie_str(cookie, &url);
        }
    }

    let mut headers = HeaderMap::new();
    if browser {
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            HeaderName::from_static("upgrade-insecure-requests"),
            HeaderValue::from_static("1"),
        );
    }
    if let Some(language) = options.accept_language {
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(language));
    }
    for (name, value) in &options.headers {
        let value = HeaderValue::from_str(value)
            .map_err(|e| CrawlError::Config(format!("invalid value for header {name}: {e}")))?;
        headers.insert(name.clone(), value);
    }

    let client = Client::builder()
        .timeout(config.http_timeout)
        .user_agent(if browser { BROWSER_USER_AGENT } else { USER_AGENT })
        .default_headers(headers)
        .cookie_provider(jar)
        .gzip(true)
        .brotli(true)
        .build()?;
    Ok(client)
}

/// Create the transport a source's descriptor asks for.
///
/// Each call builds a fresh client, so cookies never leak between fetches.
pub fn create_transport(
    class: TransportClass,
    config: &CrawlerConfig,
    options: TransportOptions,
) -> Result<Box<dyn Transport>> {
    match class {
        TransportClass::Plain => Ok(Box::new(PlainTransport::new(config, options)?)),
        TransportClass::ChallengeCapable => Ok(Box::new(ChallengeTransport::new(config, options)?)),
    }
}

/// Standard client: default headers, no challenge handling.
pub struct PlainTransport {
    client: Client,
    config: CrawlerConfig,
}

impl PlainTransport {
    pub fn new(config: &CrawlerConfig, options: TransportOptions) -> Result<Self> {
        Ok(Self {
            client: build_client(config, &options, options.browser)?,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl Transport for PlainTransport {
    fn class(&self) -> TransportClass {
        TransportClass::Plain
    }

    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        send_with_retry(&self.client, request, &self.config, None).await
    }
}

/// Browser-like client with a warmed cookie session and challenge replay.
pub struct ChallengeTransport {
    client: Client,
    config: CrawlerConfig,
    warmup_url: Option<String>,
    warmed: AtomicBool,
}

impl ChallengeTransport {
    pub fn new(config: &CrawlerConfig, options: TransportOptions) -> Result<Self> {
        Ok(Self {
            client: build_client(config, &options, true)?,
            config: config.clone(),
            warmup_url: options.warmup_url,
            warmed: AtomicBool::new(false),
        })
    }

    /// Visit the origin page so the cookie jar holds a session.
    async fn warm(&self) {
        let Some(url) = &self.warmup_url else {
            return;
        };
        match self.client.get(url).send().await {
            Ok(response) => {
                tracing::debug!(url = %url, status = %response.status(), "Session warm-up");
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Session warm-up failed");
            }
        }
        self.warmed.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl Transport for ChallengeTransport {
    fn class(&self) -> TransportClass {
        TransportClass::ChallengeCapable
    }

    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        if !self.warmed.load(Ordering::Relaxed) {
            self.warm().await;
        }
        send_with_retry(&self.client, request, &self.config, Some(self)).await
    }
}

/// True when a response is an automated-traffic interstitial.
pub fn is_challenge(status: StatusCode, headers: &HeaderMap, body: &str) -> bool {
    let mitigated = headers
        .get("cf-mitigated")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("challenge"));
    if mitigated {
        return true;
    }
    matches!(status.as_u16(), 403 | 429 | 503) && CHALLENGE_MARKERS.iter().any(|m| body.contains(m))
}

fn build_request(client: &Client, request: &HttpRequest) -> reqwest::RequestBuilder {
    let mut builder = match request.method {
        Method::Get => client.get(&request.url),
        Method::PostForm => client.post(&request.url).form(&request.form),
    };
    if !request.query.is_empty() {
        builder = builder.query(&request.query);
    }
    for (name, value) in &request.headers {
        builder = builder.header(name.clone(), value.as_str());
    }
    builder
}

async fn read_body(response: Response, charset: &str) -> Result<String> {
    Ok(response.text_with_charset(charset).await?)
}

/// Send `request`, retrying transient failures and (when `challenge` is
/// given) replaying after challenge interstitials.
async fn send_with_retry(
    client: &Client,
    request: &HttpRequest,
    config: &CrawlerConfig,
    challenge: Option<&ChallengeTransport>,
) -> Result<HttpResponse> {
    let max_attempts = config.max_attempts.max(1);
    let mut last_error: Option<String> = None;
    let mut challenged = false;

    for attempt in 0..max_attempts {
        if attempt > 0 {
            let delay = config.backoff_for(attempt);
            tracing::debug!(
                url = %request.url,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Retrying after delay"
            );
            tokio::time::sleep(delay).await;
        }

        let response = match build_request(client, request).send().await {
            Ok(response) => response,
            Err(e) if e.is_connect() || e.is_timeout() => {
                tracing::warn!(
                    url = %request.url,
                    error = %e,
                    attempt = attempt + 1,
                    max_attempts,
                    "Connection error, will retry"
                );
                last_error = Some(e.to_string());
                challenged = false;
                continue;
            }
            // Other errors (like invalid URL) - don't retry
            Err(e) => return Err(CrawlError::Http(e)),
        };

        let status = response.status();

        if let Some(transport) = challenge {
            if matches!(status.as_u16(), 403 | 429 | 503) || response.headers().contains_key("cf-mitigated") {
                let headers = response.headers().clone();
                let body = read_body(response, request.fallback_charset).await?;
                if is_challenge(status, &headers, &body) {
                    tracing::warn!(
                        url = %request.url,
                        status = %status,
                        attempt = attempt + 1,
                        max_attempts,
                        "Challenge page served, re-warming session"
                    );
                    challenged = true;
                    transport.warm().await;
                    continue;
                }
                if status.is_server_error() {
                    last_error = Some(format!("Server error: {status}"));
                    challenged = false;
                    continue;
                }
                return Err(CrawlError::Status {
                    url: request.url.clone(),
                    status: status.as_u16(),
                });
            }
        }

        if status.is_server_error() {
            tracing::warn!(
                url = %request.url,
                status = %status,
                attempt = attempt + 1,
                max_attempts,
                "Server error, will retry"
            );
            last_error = Some(format!("Server error: {status}"));
            challenged = false;
            continue;
        }

        // Don't retry client errors (4xx) - they won't succeed
        if !status.is_success() {
            return Err(CrawlError::Status {
                url: request.url.clone(),
                status: status.as_u16(),
            });
        }

        let url = response.url().to_string();
        let body = read_body(response, request.fallback_charset).await?;
        return Ok(HttpResponse {
            url,
            status: status.as_u16(),
            body,
        });
    }

    if challenged {
        return Err(CrawlError::ChallengeUnresolved {
            url: request.url.clone(),
            attempts: max_attempts,
        });
    }
    Err(CrawlError::RetriesExhausted {
        url: request.url.clone(),
        attempts: max_attempts,
        message: last_error.unwrap_or_else(|| "Unknown error".to_string()),
    })
}

/// Deserialize a JSON body; a mismatch is a schema failure.
pub fn decode_json<T: DeserializeOwned>(context: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| CrawlError::json(context, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_transports() {
        let config = CrawlerConfig::default();
        let plain = create_transport(TransportClass::Plain, &config, TransportOptions::default()).unwrap();
        assert_eq!(plain.class(), TransportClass::Plain);

        let challenge = create_transport(
            TransportClass::ChallengeCapable,
            &config,
            TransportOptions::browser().warmup("https://www.tpex.org.tw/"),
        )
        .unwrap();
        assert_eq!(challenge.class(), TransportClass::ChallengeCapable);
    }

    #[test]
    fn test_invalid_cookie_url_is_config_error() {
        let result = PlainTransport::new(
            &CrawlerConfig::default(),
            TransportOptions::default().cookie("over18=1", "not a url"),
        );
        assert!(matches!(result, Err(CrawlError::Config(_))));
    }

    #[test]
    fn test_is_challenge_by_marker() {
        let headers = HeaderMap::new();
        assert!(is_challenge(
            StatusCode::SERVICE_UNAVAILABLE,
            &headers,
            "<title>Just a moment...</title>"
        ));
        assert!(!is_challenge(StatusCode::FORBIDDEN, &headers, "Forbidden"));
        // markers on a successful page are ordinary content
        assert!(!is_challenge(StatusCode::OK, &headers, "Just a moment..."));
    }

    #[test]
    fn test_is_challenge_by_header() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-mitigated", HeaderValue::from_static("challenge"));
        assert!(is_challenge(StatusCode::FORBIDDEN, &headers, ""));
    }

    #[test]
    fn test_decode_json_error_is_schema() {
        let result: Result<serde_json::Value> = decode_json("twse", "<html>");
        assert_eq!(result.unwrap_err().kind(), crate::error::ErrorKind::Schema);
    }
}
