//! One digest run: news → opportunities → compose → deliver.
//!
//! Steps run strictly in sequence. Both collections are fully materialized
//! before the composer sees them, and no step below this one returns an
//! error: every degradation is carried as data.

use crate::api::AskAsync;
use crate::digest::{DigestComposer, select_topic};
use crate::models::{Digest, DigestRequest};
use crate::news::NewsCollector;
use crate::notify::{Delivery, Notifier};
use crate::opportunities::{OpportunityCollector, Strategy};
use chrono::NaiveDate;
use rand::Rng;
use std::time::Instant;
use tracing::{info, instrument};

/// Collaborators and per-run inputs.
pub struct Pipeline<B> {
    pub news: NewsCollector,
    pub opportunities: OpportunityCollector,
    pub composer: DigestComposer<B>,
    pub notifier: Notifier,
    pub strategy: Strategy,
    pub news_topic: String,
    pub news_window: String,
    /// Non-empty catalog for the topic of the day.
    pub topics: Vec<String>,
    /// Skip webhook delivery.
    pub dry_run: bool,
}

/// Everything a run produced.
#[derive(Debug)]
pub struct RunReport {
    pub request: DigestRequest,
    pub digest: Digest,
    pub delivery: Delivery,
}

impl<B> Pipeline<B>
where
    B: AskAsync<Response = String>,
{
    #[instrument(level = "info", skip_all, fields(date = %date))]
    pub async fn run<R: Rng + ?Sized>(&self, date: NaiveDate, rng: &mut R) -> RunReport {
        let t0 = Instant::now();

        let news = self.news.collect(&self.news_topic, &self.news_window).await;
        let opportunities = self.opportunities.collect(&self.strategy, rng).await;

        let topic_of_day = select_topic(date, &self.topics)
            .unwrap_or(self.news_topic.as_str())
            .to_string();
        info!(
            %topic_of_day,
            news = news.len(),
            opportunities = opportunities.len(),
            opportunities_fallback = opportunities.is_fallback(),
            "Collected digest inputs"
        );

        let request = DigestRequest {
            topic_of_day,
            news,
            opportunities,
            date,
        };
        let digest = self.composer.compose(&request).await;

        let delivery = if self.dry_run {
            info!("Dry run; not delivering digest");
            Delivery::Skipped
        } else {
            self.notifier.notify(&digest, &request).await
        };

        info!(
            elapsed_ms = t0.elapsed().as_millis(),
            generated = digest.generated,
            ?delivery,
            "Run complete"
        );
        RunReport { request, digest, delivery }
    }
}
