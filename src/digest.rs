//! Digest composition.
//!
//! Turns a [`DigestRequest`] into a [`Digest`]:
//!
//! 1. The topic of the day is derived from the date alone ([`select_topic`]),
//!    so re-runs on one day agree and consecutive days rotate, with no state
//!    kept between runs.
//! 2. [`render_prompt`] embeds the date, both collected sections and the topic
//!    in a fixed three-section instruction.
//! 3. [`DigestComposer`] sends the prompt through [`RetryAsk`]. When every
//!    attempt fails the composer returns a sentinel digest instead of an error,
//!    so the operator still receives a message.

use crate::api::{AskAsync, RetryAsk};
use crate::models::{Digest, DigestRequest};
use chrono::NaiveDate;
use std::time::Duration;
use tracing::{error, info, instrument};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a. Stable across processes, platforms and releases.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

/// Pick the topic of the day from `catalog`.
///
/// Hashes the ISO date (`YYYY-MM-DD`) and reduces it modulo the catalog size.
/// Returns `None` only for an empty catalog.
pub fn select_topic(date: NaiveDate, catalog: &[String]) -> Option<&str> {
    if catalog.is_empty() {
        return None;
    }
    let iso = date.format("%Y-%m-%d").to_string();
    let index = (fnv1a(iso.as_bytes()) % catalog.len() as u64) as usize;
    Some(catalog[index].as_str())
}

/// Render the generation instruction for `request`.
pub fn render_prompt(request: &DigestRequest, news_window: &str, language: &str) -> String {
    format!(
        r#"You are a seasoned science writer covering nuclear fusion. Using the material below, write the daily fusion digest for {date}.

### Part 1: Fusion Pulse
Summarize each news item below in one or two sentences (at most 50 words each) and keep its link.
{news}

### Part 2: Internships & Openings
This is the most important part. Read the postings below carefully.
{opportunities}
For every posting, list:
* **Organization**: the organization offering it (infer it from the link if needed)
* **Requirements**: a summary of what the posting asks for
* **Link**: the original link, unchanged
If the list above only names career pages, recommend them briefly instead.

### Part 3: Fusion Bite of the Day
Today's topic: {topic}
Explain this topic in about 100 words. Keep it lively (emoji welcome) but substantial; assume a reader with an undergraduate physics background.

Write the whole digest in {language} and output Markdown only, with the three part headings above."#,
        date = request.date.format("%Y-%m-%d"),
        news = request.news.render(news_window),
        opportunities = request.opportunities.render(),
        topic = request.topic_of_day,
        language = language,
    )
}

/// Composes digests through a generation backend with bounded retry.
#[derive(Debug)]
pub struct DigestComposer<B> {
    backend: RetryAsk<B>,
    news_window: String,
    language: String,
}

impl<B> DigestComposer<B>
where
    B: AskAsync<Response = String>,
{
    pub fn new(
        backend: B,
        attempts: usize,
        retry_delay: Duration,
        news_window: &str,
        language: &str,
    ) -> Self {
        Self {
            backend: RetryAsk::new(backend, attempts, retry_delay),
            news_window: news_window.to_string(),
            language: language.to_string(),
        }
    }

    /// Generate the digest for `request`.
    ///
    /// Never fails: exhausted retries produce a sentinel digest with
    /// `generated == false`.
    #[instrument(level = "info", skip_all, fields(date = %request.date, topic = %request.topic_of_day))]
    pub async fn compose(&self, request: &DigestRequest) -> Digest {
        let prompt = render_prompt(request, &self.news_window, &self.language);
        info!(
            prompt_chars = prompt.chars().count(),
            news = request.news.len(),
            opportunities = request.opportunities.len(),
            "Rendered digest prompt"
        );

        match self.backend.ask(&prompt).await {
            Ok(body) => Digest::generated(body),
            Err(e) => {
                error!(error = %e, "Digest generation failed; sending sentinel digest");
                Digest::failed(format!(
                    "Digest generation failed after {} attempts: {e}",
                    self.backend.max_attempts()
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FallbackReason, NewsItem, NewsSection, OpportunitySection};
    use crate::opportunities::fallback;
    use std::cell::{Cell, RefCell};
    use std::collections::HashSet;
    use std::error::Error;

    /// Scripted backend: fails `failures` times, then echoes the prompt.
    struct ScriptedBackend {
        failures: usize,
        calls: Cell<usize>,
        last_prompt: RefCell<String>,
    }

    impl ScriptedBackend {
        fn new(failures: usize) -> Self {
            Self { failures, calls: Cell::new(0), last_prompt: RefCell::new(String::new()) }
        }
    }

    impl AskAsync for &ScriptedBackend {
        type Response = String;

        async fn ask(&self, text: &str) -> Result<String, Box<dyn Error>> {
            self.calls.set(self.calls.get() + 1);
            *self.last_prompt.borrow_mut() = text.to_string();
            if self.calls.get() <= self.failures {
                Err("backend unavailable".into())
            } else {
                Ok(format!("# Digest\n{text}"))
            }
        }
    }

    fn catalog() -> Vec<String> {
        crate::config::DigestSettings::default().topics
    }

    fn request() -> DigestRequest {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        DigestRequest {
            topic_of_day: select_topic(date, &catalog()).unwrap().to_string(),
            news: NewsSection::Items(vec![NewsItem {
                title: "Wendelstein 7-X sets record".into(),
                link: "https://news.example.com/w7x".into(),
                published: None,
            }]),
            opportunities: fallback::section(FallbackReason::NoResults),
            date,
        }
    }

    #[test]
    fn test_select_topic_is_stable_within_a_day() {
        let catalog = catalog();
        let d = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let again = NaiveDate::parse_from_str("2025-03-14", "%Y-%m-%d").unwrap();
        assert_eq!(select_topic(d, &catalog), select_topic(again, &catalog));
    }

    #[test]
    fn test_select_topic_covers_catalog_over_a_year() {
        let catalog = catalog();
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let seen: HashSet<&str> = start
            .iter_days()
            .take(365)
            .filter_map(|d| select_topic(d, &catalog))
            .collect();
        assert!(seen.len() * 10 >= catalog.len() * 8, "only {} of {} topics used", seen.len(), catalog.len());
    }

    #[test]
    fn test_select_topic_empty_catalog() {
        assert_eq!(select_topic(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), &[]), None);
    }

    #[test]
    fn test_fnv1a_reference_values() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_prompt_embeds_sections() {
        let req = request();
        let prompt = render_prompt(&req, "48h", "Simplified Chinese");
        assert!(prompt.contains("2025-06-01"));
        assert!(prompt.contains("[Wendelstein 7-X sets record](https://news.example.com/w7x) (unknown)"));
        assert!(prompt.contains("https://www.iter.org/jobs"));
        assert!(prompt.contains(&format!("Today's topic: {}", req.topic_of_day)));
        assert!(prompt.contains("Write the whole digest in Simplified Chinese"));
    }

    #[test]
    fn test_prompt_carries_news_sentinel() {
        let req = DigestRequest { news: NewsSection::Unavailable("HTTP status 503".into()), ..request() };
        assert!(render_prompt(&req, "48h", "English").contains("fetch failed: HTTP status 503"));
    }

    #[tokio::test]
    async fn test_compose_recovers_after_two_failures() {
        let backend = ScriptedBackend::new(2);
        let composer = DigestComposer::new(&backend, 3, Duration::ZERO, "48h", "English");
        let digest = composer.compose(&request()).await;
        assert!(digest.generated);
        assert!(digest.body.starts_with("# Digest"));
        assert_eq!(backend.calls.get(), 3);
    }

    #[tokio::test]
    async fn test_compose_exhaustion_returns_sentinel() {
        let backend = ScriptedBackend::new(usize::MAX);
        let composer = DigestComposer::new(&backend, 3, Duration::ZERO, "48h", "English");
        let digest = composer.compose(&request()).await;
        assert!(!digest.generated);
        assert_eq!(digest.body, "Digest generation failed after 3 attempts: backend unavailable");
        assert_eq!(backend.calls.get(), 3);
    }

    #[tokio::test]
    async fn test_compose_sends_rendered_prompt() {
        let backend = ScriptedBackend::new(0);
        let composer = DigestComposer::new(&backend, 3, Duration::ZERO, "48h", "English");
        let req = request();
        composer.compose(&req).await;
        assert_eq!(*backend.last_prompt.borrow(), render_prompt(&req, "48h", "English"));
    }

    #[tokio::test]
    async fn test_sentinel_digest_never_carries_the_api_key() {
        let client = crate::api::GeminiClient::new(
            "http://127.0.0.1:9/v1beta",
            "gemini-2.0-flash",
            "SECRET-GEMINI-KEY",
            Duration::from_secs(5),
        )
        .unwrap();
        let composer = DigestComposer::new(client, 1, Duration::ZERO, "48h", "English");
        let digest = composer.compose(&request()).await;
        assert!(!digest.generated);
        assert!(digest.body.starts_with("Digest generation failed after 1 attempts"));
        assert!(!digest.body.contains("SECRET-GEMINI-KEY"), "{}", digest.body);
    }
}
