//! # Fusion Digest
//!
//! A once-per-run pipeline that collects recent fusion-energy headlines and
//! internship/job postings, asks an LLM to turn them into a daily digest, and
//! pushes the digest to a ServerChan webhook.
//!
//! ## Usage
//!
//! ```sh
//! GOOGLE_API_KEY=... SERVERCHAN_SENDKEY=... fusion_digest --strategy random
//! ```
//!
//! ## Architecture
//!
//! 1. **News**: topic-filtered RSS search feed, capped at N items
//! 2. **Opportunities**: one discovery strategy (search, fixed targets, or a
//!    two-level crawl) with page enrichment and a static fallback list
//! 3. **Compose**: date-derived topic of the day, prompt, generation with
//!    bounded retry
//! 4. **Deliver**: single fire-and-forget webhook POST
//!
//! Collection failures degrade into sentinel content and never stop the run.
//! Only configuration problems (for example a missing `GOOGLE_API_KEY`) end
//! the process with a non-zero status.

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod digest;
mod fetcher;
mod models;
mod news;
mod notify;
mod opportunities;
mod pipeline;
mod utils;

use api::GeminiClient;
use cli::Cli;
use config::{Credentials, Settings};
use digest::DigestComposer;
use fetcher::ContentFetcher;
use news::NewsCollector;
use notify::Notifier;
use opportunities::{OpportunityCollector, Strategy};
use pipeline::Pipeline;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "fusion_digest starting up");

    let args = Cli::parse();
    debug!(config = ?args.config, strategy = ?args.strategy, dry_run = args.dry_run, "Parsed CLI arguments");

    // ---- Configuration (the only fatal stage) ----
    let credentials = Credentials::from_cli(&args).inspect_err(|e| {
        error!(error = %e, "Generation backend is not configured; refusing to run");
    })?;
    let mut settings = Settings::load(args.config.as_deref()).await?;
    settings.apply_cli(&args);
    settings.validate()?;
    debug!(?credentials, "Loaded credentials");

    let date = args.date.unwrap_or_else(|| Local::now().date_naive());
    let mut rng = rand::rng();

    // ---- Collaborators, scoped to this run ----
    let fetcher = ContentFetcher::new(&settings.fetch)?;
    let strategy = Strategy::resolve(
        settings.opportunities.strategy,
        &settings.opportunities,
        &credentials,
        &mut rng,
    );
    info!(strategy = %strategy.tag(), "Opportunity strategy selected");

    let backend = GeminiClient::new(
        &settings.digest.endpoint,
        &settings.digest.model,
        &credentials.generation_key,
        Duration::from_secs(settings.digest.timeout_secs),
    )?;

    let pipeline = Pipeline {
        news: NewsCollector::new(settings.news.clone())?,
        opportunities: OpportunityCollector::new(fetcher, &settings.opportunities)?,
        composer: DigestComposer::new(
            backend,
            settings.digest.attempts,
            Duration::from_secs(settings.digest.retry_delay_secs),
            &settings.news.window,
            &settings.digest.language,
        ),
        notifier: Notifier::new(&settings.notify, credentials.notify_key.clone())?,
        strategy,
        news_topic: settings.news.topic.clone(),
        news_window: settings.news.window.clone(),
        topics: settings.digest.topics.clone(),
        dry_run: args.dry_run,
    };

    // ---- Run ----
    let report = pipeline.run(date, &mut rng).await;

    // Keep a copy of the digest in the job output.
    println!("{}", report.digest.body);

    info!(
        date = %report.request.date,
        topic = %report.request.topic_of_day,
        generated = report.digest.generated,
        delivery = ?report.delivery,
        "Execution complete"
    );
    Ok(())
}
