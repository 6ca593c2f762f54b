//! Data models that flow through one digest run.
//!
//! - [`NewsItem`] / [`NewsSection`]: headlines from the feed, or why there are none
//! - [`OpportunityCandidate`] / [`OpportunitySection`]: postings, or the static fallback
//! - [`DigestRequest`]: everything the composer needs, built once per run
//! - [`Digest`]: the generated text that gets delivered
//!
//! Each section type renders itself into the plain text block that is
//! embedded in the prompt.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::fmt;

/// Format used for feed timestamps in the prompt.
pub const PUBLISHED_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

/// A single headline from the news feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    /// `None` when the entry had no parseable timestamp.
    pub published: Option<DateTime<Utc>>,
}

impl NewsItem {
    /// Human-readable publish time, or `"unknown"`.
    pub fn published_label(&self) -> String {
        self.published
            .map(|ts| ts.format(PUBLISHED_FORMAT).to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Outcome of the news collection step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewsSection {
    Items(Vec<NewsItem>),
    /// The feed could not be fetched or parsed.
    Unavailable(String),
}

impl NewsSection {
    pub fn len(&self) -> usize {
        match self {
            Self::Items(items) => items.len(),
            Self::Unavailable(_) => 0,
        }
    }

    /// Render the section for the prompt.
    ///
    /// `window` is only used for the "nothing new" message.
    pub fn render(&self, window: &str) -> String {
        match self {
            Self::Items(items) if items.is_empty() => {
                format!("No major news in the past {window}.")
            }
            Self::Items(items) => items
                .iter()
                .map(|item| format!("- [{}]({}) ({})", item.title, item.link, item.published_label()))
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Unavailable(reason) => format!("fetch failed: {reason}"),
        }
    }
}

/// Tags which strategy produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceStrategy {
    Search,
    Targets,
    Crawl,
}

impl fmt::Display for SourceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Search => "search",
            Self::Targets => "targets",
            Self::Crawl => "crawl",
        };
        f.write_str(name)
    }
}

/// A job or internship posting discovered by one of the strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpportunityCandidate {
    pub title: String,
    pub link: String,
    /// Search snippet or listing-page excerpt.
    pub snippet: String,
    /// Extracted page text, present only when enrichment succeeded.
    pub body: Option<String>,
    pub source: SourceStrategy,
}

impl OpportunityCandidate {
    /// The richest text available for this candidate.
    pub fn best_text(&self) -> &str {
        self.body.as_deref().unwrap_or(&self.snippet)
    }
}

/// A known-good career page, used when no live posting could be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackLink {
    pub label: &'static str,
    pub url: &'static str,
}

/// Why the opportunity collector fell back to the static list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// The search backend needs credentials that are not configured.
    MissingCredentials,
    /// The strategy ran but found nothing.
    NoResults,
    /// The strategy failed outright.
    Failed(String),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredentials => f.write_str("search credentials not configured"),
            Self::NoResults => f.write_str("no new postings found"),
            Self::Failed(reason) => write!(f, "search failed: {reason}"),
        }
    }
}

/// Outcome of the opportunity collection step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpportunitySection {
    Found(Vec<OpportunityCandidate>),
    Fallback {
        reason: FallbackReason,
        links: Vec<FallbackLink>,
    },
}

impl OpportunitySection {
    /// Number of live postings. Fallback career pages are not postings.
    pub fn len(&self) -> usize {
        match self {
            Self::Found(candidates) => candidates.len(),
            Self::Fallback { .. } => 0,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    /// Render the section for the prompt.
    pub fn render(&self) -> String {
        match self {
            Self::Found(candidates) => candidates
                .iter()
                .map(|c| {
                    format!(
                        "Position: {}\nLink: {}\nDetails: {}\n---",
                        c.title,
                        c.link,
                        c.best_text()
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Fallback { links, .. } => {
                let mut out = String::from(
                    "No live postings today. Recommend browsing these career pages instead:\n",
                );
                for link in links {
                    out.push_str(&format!("- {}: {}\n", link.label, link.url));
                }
                out
            }
        }
    }
}

/// A fixed page used by the `targets` and `crawl` strategies.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Target {
    pub label: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
}

/// Everything the composer needs for one run.
#[derive(Debug, Clone)]
pub struct DigestRequest {
    pub topic_of_day: String,
    pub news: NewsSection,
    pub opportunities: OpportunitySection,
    pub date: NaiveDate,
}

/// The text delivered to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub body: String,
    /// `false` when the body is the sentinel failure message.
    pub generated: bool,
}

impl Digest {
    pub fn generated(body: String) -> Self {
        Self { body, generated: true }
    }

    pub fn failed(body: String) -> Self {
        Self { body, generated: false }
    }
}
