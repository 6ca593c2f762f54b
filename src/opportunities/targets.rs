//! `FixedTargets` strategy: scrape a hand-picked list of career pages.
//!
//! Each target becomes one candidate. The page text is the body when the
//! fetch works; the configured description stands in when it does not.

use super::{OpportunityCollector, Pacer};
use crate::models::{FallbackReason, OpportunityCandidate, SourceStrategy, Target};
use tracing::{debug, instrument};

#[instrument(level = "info", skip_all, fields(targets = list.len()))]
pub(super) async fn collect(
    collector: &OpportunityCollector,
    list: &[Target],
    pacer: &mut Pacer,
) -> Result<Vec<OpportunityCandidate>, FallbackReason> {
    let mut candidates = Vec::new();
    for target in list.iter().take(collector.limit) {
        let body = collector.enrich(&target.url, pacer).await;
        debug!(url = %target.url, enriched = body.is_some(), "Scraped target page");
        let snippet = if target.description.is_empty() {
            target.label.clone()
        } else {
            target.description.clone()
        };
        candidates.push(collector.candidate(
            target.label.clone(),
            target.url.clone(),
            snippet,
            body,
            SourceStrategy::Targets,
        ));
    }
    Ok(candidates)
}
