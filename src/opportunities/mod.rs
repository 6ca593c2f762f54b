//! Job and internship discovery.
//!
//! A run uses exactly one [`Strategy`]:
//!
//! | Strategy | Module | Discovery | Needs credentials |
//! |----------|--------|-----------|-------------------|
//! | `SearchQuery` | [`search`] | One query against Google Custom Search or DuckDuckGo | Google only |
//! | `FixedTargets` | [`targets`] | Scrape a fixed list of career pages | No |
//! | `TwoLevelCrawl` | [`crawl`] | Listing page → keyword-matched links → detail pages | No |
//!
//! Every candidate is enriched through the [`ContentFetcher`] when possible;
//! a miss falls back to the search snippet or listing excerpt. When nothing
//! live can be found, the collector returns the static list from
//! [`fallback`], so the digest always has opportunity content.
//!
//! Outbound fetches within a run are spaced by a fixed courtesy delay
//! ([`Pacer`]).

pub mod crawl;
pub mod fallback;
pub mod search;
pub mod targets;

use crate::config::{
    CrawlSettings, Credentials, OpportunitySettings, SearchBackend, SearchSettings, StrategyKind,
};
use crate::fetcher::{ContentFetcher, browser_headers};
use crate::models::{
    FallbackReason, OpportunityCandidate, OpportunitySection, SourceStrategy, Target,
};
use crate::utils::truncate_chars;
use rand::Rng;
use rand::seq::IndexedRandom;
use reqwest::Client;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Key and scope identifier for Google Custom Search.
#[derive(Clone)]
pub struct GoogleCredentials {
    pub key: String,
    pub cx: String,
}

impl std::fmt::Debug for GoogleCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleCredentials")
            .field("key", &"<redacted>")
            .field("cx", &self.cx)
            .finish()
    }
}

/// One way of discovering candidate postings.
#[derive(Debug, Clone)]
pub enum Strategy {
    SearchQuery {
        settings: SearchSettings,
        /// `None` when the Google backend is selected but not configured.
        google: Option<GoogleCredentials>,
    },
    FixedTargets(Vec<Target>),
    TwoLevelCrawl(CrawlSettings),
}

impl Strategy {
    /// Build the strategy named by `kind`, drawing uniformly from
    /// `settings.random_pool` when `kind` is [`StrategyKind::Random`].
    pub fn resolve<R: Rng + ?Sized>(
        kind: StrategyKind,
        settings: &OpportunitySettings,
        credentials: &Credentials,
        rng: &mut R,
    ) -> Self {
        let concrete = match kind {
            StrategyKind::Random => {
                let pool: Vec<StrategyKind> = settings
                    .random_pool
                    .iter()
                    .copied()
                    .filter(|k| *k != StrategyKind::Random)
                    .collect();
                let picked = pool.choose(rng).copied().unwrap_or(StrategyKind::Search);
                info!(?picked, "Randomly selected opportunity strategy");
                picked
            }
            other => other,
        };

        match concrete {
            StrategyKind::Targets => Self::FixedTargets(settings.targets.clone()),
            StrategyKind::Crawl => Self::TwoLevelCrawl(settings.crawl.clone()),
            StrategyKind::Search | StrategyKind::Random => {
                let google = match (&credentials.search_key, &credentials.search_cx) {
                    (Some(key), Some(cx)) => Some(GoogleCredentials {
                        key: key.clone(),
                        cx: cx.clone(),
                    }),
                    _ => None,
                };
                Self::SearchQuery {
                    settings: settings.search.clone(),
                    google,
                }
            }
        }
    }

    pub fn tag(&self) -> SourceStrategy {
        match self {
            Self::SearchQuery { .. } => SourceStrategy::Search,
            Self::FixedTargets(_) => SourceStrategy::Targets,
            Self::TwoLevelCrawl(_) => SourceStrategy::Crawl,
        }
    }
}

/// Spaces successive outbound requests by a fixed delay.
///
/// The first request of a run goes out immediately.
#[derive(Debug)]
pub struct Pacer {
    delay: Duration,
    primed: bool,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, primed: false }
    }

    pub async fn wait(&mut self) {
        if self.primed && !self.delay.is_zero() {
            debug!(delay = ?self.delay, "Courtesy delay");
            sleep(self.delay).await;
        }
        self.primed = true;
    }
}

#[derive(Debug, Clone)]
pub struct OpportunityCollector {
    fetcher: ContentFetcher,
    search_client: Client,
    limit: usize,
    body_budget: usize,
    courtesy_delay: Duration,
}

impl OpportunityCollector {
    pub fn new(
        fetcher: ContentFetcher,
        settings: &OpportunitySettings,
    ) -> Result<Self, reqwest::Error> {
        let search_client = Client::builder()
            .default_headers(browser_headers())
            .timeout(Duration::from_secs(settings.search.timeout_secs))
            .build()?;
        Ok(Self {
            fetcher,
            search_client,
            limit: settings.limit,
            body_budget: settings.body_budget,
            courtesy_delay: Duration::from_millis(settings.courtesy_delay_ms),
        })
    }

    /// Run `strategy` and return at most `limit` candidates, or the static
    /// fallback list when nothing live was found.
    #[instrument(level = "info", skip_all, fields(strategy = %strategy.tag()))]
    pub async fn collect<R: Rng + ?Sized>(
        &self,
        strategy: &Strategy,
        rng: &mut R,
    ) -> OpportunitySection {
        let mut pacer = Pacer::new(self.courtesy_delay);
        let result = match strategy {
            Strategy::SearchQuery { settings, google } => {
                self.collect_search(settings, google.as_ref(), &mut pacer).await
            }
            Strategy::FixedTargets(list) => {
                targets::collect(self, list, &mut pacer).await
            }
            Strategy::TwoLevelCrawl(settings) => {
                crawl::collect(self, settings, rng, &mut pacer).await
            }
        };

        match result {
            Ok(candidates) if !candidates.is_empty() => {
                info!(count = candidates.len(), "Collected opportunities");
                OpportunitySection::Found(candidates)
            }
            Ok(_) => {
                warn!("Strategy found no postings; using fallback list");
                fallback::section(FallbackReason::NoResults)
            }
            Err(reason) => {
                warn!(%reason, "Strategy unavailable; using fallback list");
                fallback::section(reason)
            }
        }
    }

    async fn collect_search(
        &self,
        settings: &SearchSettings,
        google: Option<&GoogleCredentials>,
        pacer: &mut Pacer,
    ) -> Result<Vec<OpportunityCandidate>, FallbackReason> {
        pacer.wait().await;
        let hits = match settings.backend {
            SearchBackend::Google => {
                let creds = google.ok_or(FallbackReason::MissingCredentials)?;
                search::google(&self.search_client, settings, creds, self.limit).await
            }
            SearchBackend::Duckduckgo => {
                search::duckduckgo(&self.search_client, settings, self.limit).await
            }
        }
        .map_err(|e| FallbackReason::Failed(e.to_string()))?;

        info!(count = hits.len(), backend = ?settings.backend, "Search returned hits");

        let mut candidates = Vec::new();
        for hit in hits.into_iter().take(self.limit) {
            let body = self.enrich(&hit.link, pacer).await;
            candidates.push(self.candidate(hit.title, hit.link, hit.snippet, body, SourceStrategy::Search));
        }
        Ok(candidates)
    }

    /// Fetch detail text for `link`, honoring the courtesy delay.
    async fn enrich(&self, link: &str, pacer: &mut Pacer) -> Option<String> {
        pacer.wait().await;
        self.fetcher.fetch(link).await
    }

    /// Build a candidate with its body and snippet held to the body budget.
    fn candidate(
        &self,
        title: String,
        link: String,
        snippet: String,
        body: Option<String>,
        source: SourceStrategy,
    ) -> OpportunityCandidate {
        OpportunityCandidate {
            title,
            link,
            snippet: truncate_chars(&snippet, self.body_budget),
            body: body.map(|b| truncate_chars(&b, self.body_budget)),
            source,
        }
    }
}
