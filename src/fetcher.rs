//! Page fetching and readable-text extraction.
//!
//! [`ContentFetcher`] issues a single GET per URL with a browser-like header
//! set and turns the HTML into plain text. It never raises to its caller:
//! [`ContentFetcher::fetch`] returns `None` for any miss, and
//! [`ContentFetcher::try_fetch`] reports which kind of miss it was.
//!
//! No caching and no retry happen here; callers decide whether a miss is
//! worth another attempt.

use crate::config::FetchSettings;
use crate::utils::{normalize_whitespace, truncate_chars};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, redirect};
use scraper::{ElementRef, Html};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Elements whose contents are never part of the readable text.
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "nav", "footer", "header", "iframe", "svg", "head",
];

/// Why a page produced no text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Timeout,
    /// Connection, TLS, redirect or body-read failure.
    Http(String),
    /// Non-2xx response.
    Status(u16),
    /// The response is not an HTML or text document.
    NotHtml(String),
    /// The page parsed but held no visible text.
    Empty,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("request timed out"),
            Self::Http(msg) => write!(f, "request failed: {msg}"),
            Self::Status(code) => write!(f, "HTTP status {code}"),
            Self::NotHtml(kind) => write!(f, "unsupported content type {kind}"),
            Self::Empty => f.write_str("no readable text"),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(e.to_string())
        }
    }
}

/// Header set that some origins require before they serve real content.
pub fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers
}

#[derive(Debug, Clone)]
pub struct ContentFetcher {
    client: Client,
    max_chars: usize,
}

impl ContentFetcher {
    /// Build a fetcher with its own client, timeout and redirect policy.
    pub fn new(settings: &FetchSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .default_headers(browser_headers())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .redirect(redirect::Policy::limited(5))
            .build()?;
        Ok(Self {
            client,
            max_chars: settings.max_chars,
        })
    }

    /// Fetch `url` and return its readable text, or `None` on any failure.
    pub async fn fetch(&self, url: &str) -> Option<String> {
        match self.try_fetch(url).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(%url, error = %e, "Page fetch missed");
                None
            }
        }
    }

    /// Fetch `url` and return its readable text, capped at `max_chars`.
    #[instrument(level = "debug", skip(self))]
    pub async fn try_fetch(&self, url: &str) -> Result<String, FetchError> {
        let html = self.fetch_html(url).await?;
        let text = extract_text(&html, self.max_chars);
        if text.is_empty() {
            return Err(FetchError::Empty);
        }
        info!(%url, chars = text.chars().count(), "Extracted page text");
        Ok(text)
    }

    /// Fetch the raw HTML of `url`.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !content_type.is_empty() && !is_textual(&content_type) {
            return Err(FetchError::NotHtml(content_type));
        }

        let body = response.text().await?;
        debug!(%url, bytes = body.len(), "Fetched page");
        Ok(body)
    }
}

fn is_textual(content_type: &str) -> bool {
    content_type.starts_with("text/") || content_type.contains("html") || content_type.contains("xml")
}

/// Extract visible text from an HTML document.
///
/// Drops [`SKIPPED_ELEMENTS`] subtrees, collapses whitespace, and keeps at
/// most `max_chars` characters.
pub fn extract_text(html: &str, max_chars: usize) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();
    push_visible_text(document.root_element(), &mut raw);
    truncate_chars(&normalize_whitespace(&raw), max_chars)
}

fn push_visible_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child_element) = ElementRef::wrap(child) {
            let name = child_element.value().name();
            if !SKIPPED_ELEMENTS.contains(&name) {
                push_visible_text(child_element, out);
            }
        }
    }
}
