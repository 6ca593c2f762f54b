//! Headline collection from a topic-filtered RSS search feed.
//!
//! The default source is Google News search RSS, queried with the topic and
//! a `when:` recency filter. Entries are kept in feed order (assumed newest
//! first) and capped at the configured limit.
//!
//! # Failure policy
//!
//! Network, status and parse failures never leave this module. They become
//! [`NewsSection::Unavailable`], which the prompt renders as
//! `fetch failed: <reason>`.

use crate::config::NewsSettings;
use crate::fetcher::browser_headers;
use crate::models::{NewsItem, NewsSection};
use crate::utils::normalize_whitespace;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::error::Error;
use std::time::Duration;
use tracing::{info, instrument, warn};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewsCollector {
    client: Client,
    settings: NewsSettings,
}

impl NewsCollector {
    pub fn new(settings: NewsSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .default_headers(browser_headers())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self { client, settings })
    }

    /// Full feed URL for `topic` restricted to the last `window`.
    pub fn feed_url(&self, topic: &str, window: &str) -> String {
        let query = format!("{topic} when:{window}");
        format!(
            "{}?q={}&hl={}&gl={}&ceid={}",
            self.settings.feed_url,
            urlencoding::encode(&query),
            self.settings.hl,
            self.settings.gl,
            self.settings.ceid,
        )
    }

    /// Collect at most `limit` headlines about `topic` from the last `window`.
    #[instrument(level = "info", skip(self))]
    pub async fn collect(&self, topic: &str, window: &str) -> NewsSection {
        let url = self.feed_url(topic, window);
        match self.fetch_items(&url).await {
            Ok(items) => {
                info!(count = items.len(), "Collected news items");
                NewsSection::Items(items)
            }
            Err(e) => {
                warn!(error = %e, "News feed unavailable");
                NewsSection::Unavailable(e.to_string())
            }
        }
    }

    async fn fetch_items(&self, url: &str) -> Result<Vec<NewsItem>, Box<dyn Error>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let xml = response.text().await?;
        parse_feed(&xml, self.settings.limit)
    }
}

/// Parse an RSS 2.0 document into at most `limit` items, in feed order.
///
/// Entries without a title or link are skipped; entries without a parseable
/// `pubDate` are kept with `published: None`.
pub fn parse_feed(xml: &str, limit: usize) -> Result<Vec<NewsItem>, Box<dyn Error>> {
    let rss: Rss = quick_xml::de::from_str(&scrub_html_entities(xml))?;
    let items = rss
        .channel
        .items
        .into_iter()
        .filter_map(|item| {
            let title = normalize_whitespace(item.title.as_deref()?);
            let link = item.link?.trim().to_string();
            if title.is_empty() || link.is_empty() {
                return None;
            }
            Some(NewsItem {
                title,
                link,
                published: item.pub_date.as_deref().and_then(parse_pub_date),
            })
        })
        .take(limit)
        .collect();
    Ok(items)
}

fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Feeds sometimes carry HTML entities that are not valid XML.
fn scrub_html_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
