//! Search backends for the `SearchQuery` strategy.
//!
//! - [`google`]: Google Custom Search JSON API (key + cx, date restricted)
//! - [`duckduckgo`]: DuckDuckGo's HTML endpoint, no credentials
//!
//! Both return plain [`SearchHit`]s; enrichment happens in the collector.

use super::GoogleCredentials;
use crate::config::SearchSettings;
use crate::utils::normalize_whitespace;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::error::Error;
use tracing::{debug, instrument};
use url::Url;

/// Google caps `num` at 10 per request.
const GOOGLE_MAX_NUM: usize = 10;

static RESULT_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse(".result").unwrap());
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a.result__a").unwrap());
static SNIPPET_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse(".result__snippet").unwrap());

/// One search result before enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    items: Vec<GoogleItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleItem {
    title: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
}

/// Query Google Custom Search for at most `limit` hits.
#[instrument(level = "info", skip(client, settings, creds), fields(query = %settings.query))]
pub async fn google(
    client: &Client,
    settings: &SearchSettings,
    creds: &GoogleCredentials,
    limit: usize,
) -> Result<Vec<SearchHit>, Box<dyn Error>> {
    let num = limit.clamp(1, GOOGLE_MAX_NUM).to_string();
    let response = client
        .get(&settings.google_endpoint)
        .query(&[
            ("key", creds.key.as_str()),
            ("cx", creds.cx.as_str()),
            ("q", settings.query.as_str()),
            ("dateRestrict", settings.date_restrict.as_str()),
            ("num", num.as_str()),
        ])
        .send()
        .await
        .and_then(|r| r.error_for_status())
        // The API key is part of the query string.
        .map_err(reqwest::Error::without_url)?;

    let parsed: GoogleResponse = response.json().await.map_err(reqwest::Error::without_url)?;
    let hits: Vec<SearchHit> = parsed
        .items
        .into_iter()
        .filter_map(|item| {
            Some(SearchHit {
                title: normalize_whitespace(&item.title?),
                link: item.link?,
                snippet: normalize_whitespace(item.snippet.as_deref().unwrap_or_default()),
            })
        })
        .take(limit)
        .collect();
    debug!(count = hits.len(), "Google search hits");
    Ok(hits)
}

/// Query DuckDuckGo's HTML endpoint for at most `limit` hits.
#[instrument(level = "info", skip(client, settings), fields(query = %settings.query))]
pub async fn duckduckgo(
    client: &Client,
    settings: &SearchSettings,
    limit: usize,
) -> Result<Vec<SearchHit>, Box<dyn Error>> {
    let html = client
        .post(&settings.duckduckgo_endpoint)
        .form(&[("q", settings.query.as_str())])
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    let hits = parse_duckduckgo(&html, limit);
    debug!(count = hits.len(), "DuckDuckGo search hits");
    Ok(hits)
}

/// Parse DuckDuckGo HTML results, skipping ads.
pub fn parse_duckduckgo(html: &str, limit: usize) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    document
        .select(&RESULT_SELECTOR)
        .filter(|block| !block.value().classes().any(|c| c == "result--ad"))
        .filter_map(|block| {
            let anchor = block.select(&TITLE_SELECTOR).next()?;
            let link = decode_ddg_link(anchor.value().attr("href")?)?;
            let title = normalize_whitespace(&anchor.text().collect::<String>());
            let snippet = block
                .select(&SNIPPET_SELECTOR)
                .next()
                .map(|s| normalize_whitespace(&s.text().collect::<String>()))
                .unwrap_or_default();
            (!title.is_empty()).then_some(SearchHit { title, link, snippet })
        })
        .take(limit)
        .collect()
}

/// DuckDuckGo wraps targets as `//duckduckgo.com/l/?uddg=<encoded>`.
fn decode_ddg_link(href: &str) -> Option<String> {
    let base = Url::parse("https://duckduckgo.com/").ok()?;
    let url = base.join(href).ok()?;
    if let Some((_, target)) = url.query_pairs().find(|(k, _)| k == "uddg") {
        return Some(target.into_owned());
    }
    if url.host_str() == Some("duckduckgo.com") {
        return None;
    }
    Some(url.to_string())
}
