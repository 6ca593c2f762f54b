//! `TwoLevelCrawl` strategy.
//!
//! 1. Pick `targets_per_run` listing pages at random.
//! 2. Keep anchors whose text is long enough and names a role keyword.
//! 3. Dedupe by (title, url) and follow a random sample for detail text.
//!
//! Randomness spreads coverage across days without remembering earlier runs.

use super::{OpportunityCollector, Pacer};
use crate::config::CrawlSettings;
use crate::models::{FallbackReason, OpportunityCandidate, SourceStrategy};
use crate::utils::normalize_whitespace;
use itertools::Itertools;
use once_cell::sync::Lazy;
use rand::Rng;
use rand::seq::IndexedRandom;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// A link found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingLink {
    pub title: String,
    pub url: String,
    /// Label of the listing page it came from.
    pub origin: String,
}

/// Whether anchor `text` looks like a posting.
///
/// The text must be strictly longer than `min_chars` characters and contain
/// at least one keyword, case-insensitively.
pub fn is_candidate_anchor(text: &str, keywords: &[String], min_chars: usize) -> bool {
    if text.chars().count() <= min_chars {
        return false;
    }
    let lower = text.to_lowercase();
    keywords.iter().any(|k| lower.contains(&k.to_lowercase()))
}

/// Extract keyword-matching posting links from a listing page.
///
/// Relative links are resolved against `base`; only http(s) links survive.
/// Results are deduplicated by (title, url), keeping the first occurrence.
pub fn extract_listing_links(
    html: &str,
    base: &Url,
    origin: &str,
    keywords: &[String],
    min_chars: usize,
) -> Vec<ListingLink> {
    let document = Html::parse_document(html);
    document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?.trim();
            if href.is_empty()
                || href.starts_with('#')
                || href.starts_with("mailto:")
                || href.starts_with("javascript:")
                || href.starts_with("tel:")
            {
                return None;
            }
            let title = normalize_whitespace(&anchor.text().collect::<String>());
            if !is_candidate_anchor(&title, keywords, min_chars) {
                return None;
            }
            let resolved = base.join(href).ok()?;
            matches!(resolved.scheme(), "http" | "https").then(|| ListingLink {
                title,
                url: resolved.to_string(),
                origin: origin.to_string(),
            })
        })
        .unique_by(|link| (link.title.clone(), link.url.clone()))
        .collect()
}

#[instrument(level = "info", skip_all)]
pub(super) async fn collect<R: Rng + ?Sized>(
    collector: &OpportunityCollector,
    settings: &CrawlSettings,
    rng: &mut R,
    pacer: &mut Pacer,
) -> Result<Vec<OpportunityCandidate>, FallbackReason> {
    let listings: Vec<_> = settings
        .targets
        .choose_multiple(rng, settings.targets_per_run.max(1))
        .cloned()
        .collect();
    if listings.is_empty() {
        return Err(FallbackReason::Failed("no crawl targets configured".into()));
    }

    let mut links = Vec::new();
    let mut last_miss = None;
    let mut reached = 0usize;
    for listing in &listings {
        let base = match Url::parse(&listing.url) {
            Ok(base) => base,
            Err(e) => {
                warn!(url = %listing.url, error = %e, "Invalid crawl target URL");
                last_miss = Some(format!("invalid target URL {}: {e}", listing.url));
                continue;
            }
        };
        pacer.wait().await;
        match collector.fetcher.fetch_html(&listing.url).await {
            Ok(html) => {
                reached += 1;
                let found = extract_listing_links(
                    &html,
                    &base,
                    &listing.label,
                    &settings.keywords,
                    settings.min_anchor_chars,
                );
                info!(listing = %listing.label, count = found.len(), "Listing page matched links");
                links.extend(found);
            }
            Err(e) => {
                warn!(url = %listing.url, error = %e, "Listing page unreachable");
                last_miss = Some(format!("{}: {e}", listing.label));
            }
        }
    }

    if reached == 0 {
        return Err(FallbackReason::Failed(
            last_miss.unwrap_or_else(|| "no listing page reachable".into()),
        ));
    }

    let links: Vec<ListingLink> = links
        .into_iter()
        .unique_by(|link| (link.title.clone(), link.url.clone()))
        .collect();
    let sample_size = settings.sample_size.min(collector.limit);
    let sample: Vec<ListingLink> = links.choose_multiple(rng, sample_size).cloned().collect();
    debug!(matched = links.len(), sampled = sample.len(), "Sampled listing links");

    let mut candidates = Vec::new();
    for link in sample {
        let body = collector.enrich(&link.url, pacer).await;
        let snippet = format!("Listed on {}: {}", link.origin, link.title);
        candidates.push(collector.candidate(link.title, link.url, snippet, body, SourceStrategy::Crawl));
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::super::Strategy;
    use super::super::tests::collector;
    use super::*;
    use crate::config::CrawlSettings;
    use crate::models::{OpportunitySection, Target};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn keywords() -> Vec<String> {
        CrawlSettings::default().keywords
    }

    #[test]
    fn test_only_keyword_anchors_of_sufficient_length() {
        let html = r#"<html><body>
            <a href="/jobs/42">Plasma Engineer - Apply</a>
            <a href="/">Home</a>
            <a href="/contact">Contact</a>
        </body></html>"#;
        let base = Url::parse("https://fusion.example.com/careers").unwrap();
        let links = extract_listing_links(html, &base, "Example", &keywords(), 8);
        assert_eq!(
            links,
            vec![ListingLink {
                title: "Plasma Engineer - Apply".into(),
                url: "https://fusion.example.com/jobs/42".into(),
                origin: "Example".into(),
            }]
        );
    }

    #[test]
    fn test_short_keyword_anchor_is_rejected() {
        // Contains "intern" but is not longer than the threshold.
        assert!(!is_candidate_anchor("Interns", &keywords(), 8));
        assert!(is_candidate_anchor("Summer INTERNSHIP 2026", &keywords(), 8));
        assert!(!is_candidate_anchor("About our company history", &keywords(), 8));
    }

    #[test]
    fn test_listing_links_dedupe_and_skip_non_http() {
        let html = r##"<html><body>
            <a href="/jobs/1">Postdoc in Plasma Theory</a>
            <a href="https://fusion.example.com/jobs/1">Postdoc in Plasma Theory</a>
            <a href="/jobs/1?ref=footer">Postdoc in Plasma Theory</a>
            <a href="mailto:hr@fusion.example.com">Email an engineer today</a>
            <a href="ftp://fusion.example.com/engineer.txt">Engineer spec sheet</a>
            <a href="#engineer">Jump to engineer roles</a>
        </body></html>"##;
        let base = Url::parse("https://fusion.example.com/careers").unwrap();
        let links = extract_listing_links(html, &base, "Example", &keywords(), 8);
        let urls: Vec<_> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://fusion.example.com/jobs/1", "https://fusion.example.com/jobs/1?ref=footer"]
        );
    }

    #[tokio::test]
    async fn test_crawl_follows_sampled_links() {
        let mut server = mockito::Server::new_async().await;
        let _listing = server
            .mock("GET", "/careers")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(
                r#"<html><body><nav><a href="/">Home</a></nav>
                   <a href="/jobs/1">Plasma Engineer - Apply</a>
                   <a href="/jobs/2">PhD Student: Divertor Materials</a>
                   <a href="/contact">Contact</a></body></html>"#,
            )
            .create_async()
            .await;
        let _job1 = server
            .mock("GET", "/jobs/1")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html><body><p>Design RF heating systems.</p></body></html>")
            .create_async()
            .await;
        let _job2 = server
            .mock("GET", "/jobs/2")
            .with_status(500)
            .create_async()
            .await;

        let settings = CrawlSettings {
            targets: vec![Target {
                label: "Example Fusion".into(),
                url: format!("{}/careers", server.url()),
                description: String::new(),
            }],
            sample_size: 5,
            ..CrawlSettings::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        let section = collector(5, 2000)
            .collect(&Strategy::TwoLevelCrawl(settings), &mut rng)
            .await;
        let OpportunitySection::Found(mut candidates) = section else {
            panic!("expected candidates");
        };
        candidates.sort_by(|a, b| a.link.cmp(&b.link));
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].best_text(), "Design RF heating systems.");
        assert_eq!(candidates[1].body, None);
        assert_eq!(
            candidates[1].best_text(),
            "Listed on Example Fusion: PhD Student: Divertor Materials"
        );
        assert!(candidates.iter().all(|c| c.source == SourceStrategy::Crawl));
    }

    #[tokio::test]
    async fn test_crawl_sample_bounded_by_limit() {
        let mut server = mockito::Server::new_async().await;
        let anchors: String = (0..10)
            .map(|i| format!(r#"<a href="/jobs/{i}">Research Scientist number {i}</a>"#))
            .collect();
        let _listing = server
            .mock("GET", "/careers")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(format!("<html><body>{anchors}</body></html>"))
            .create_async()
            .await;
        let _jobs = server
            .mock("GET", mockito::Matcher::Regex("^/jobs/".into()))
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html><body>Details</body></html>")
            .create_async()
            .await;

        let settings = CrawlSettings {
            targets: vec![Target {
                label: "Lab".into(),
                url: format!("{}/careers", server.url()),
                description: String::new(),
            }],
            sample_size: 8,
            ..CrawlSettings::default()
        };
        let mut rng = StdRng::seed_from_u64(5);
        let section = collector(3, 2000)
            .collect(&Strategy::TwoLevelCrawl(settings), &mut rng)
            .await;
        assert_eq!(section.len(), 3);
        assert!(!section.is_fallback());
    }

    #[tokio::test]
    async fn test_unreachable_listing_falls_back() {
        let mut server = mockito::Server::new_async().await;
        let _listing = server
            .mock("GET", "/careers")
            .with_status(503)
            .create_async()
            .await;

        let settings = CrawlSettings {
            targets: vec![Target {
                label: "Lab".into(),
                url: format!("{}/careers", server.url()),
                description: String::new(),
            }],
            ..CrawlSettings::default()
        };
        let mut rng = StdRng::seed_from_u64(5);
        let section = collector(3, 2000)
            .collect(&Strategy::TwoLevelCrawl(settings), &mut rng)
            .await;
        match section {
            OpportunitySection::Fallback { reason, links } => {
                assert!(matches!(reason, FallbackReason::Failed(_)));
                assert!(!links.is_empty());
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }
}
