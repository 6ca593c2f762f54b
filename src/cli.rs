//! Command-line interface definitions for Fusion Digest.
//!
//! Secrets are read from environment variables through clap's `env`
//! support so the binary can run unattended from a scheduler. Everything
//! else has a default in [`crate::config::Settings`].

use crate::config::StrategyKind;
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for one digest run.
///
/// # Examples
///
/// ```sh
/// # Defaults, keys from the environment
/// GOOGLE_API_KEY=... SERVERCHAN_SENDKEY=... fusion_digest
///
/// # Custom settings, crawl strategy, print only
/// fusion_digest -c digest.yaml --strategy crawl --dry-run
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML settings file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// News topic to search for (overrides the settings file)
    #[arg(short, long)]
    pub topic: Option<String>,

    /// Opportunity discovery strategy (overrides the settings file)
    #[arg(short, long, value_enum)]
    pub strategy: Option<StrategyKind>,

    /// Run as if today were this date (YYYY-MM-DD)
    #[arg(short, long)]
    pub date: Option<NaiveDate>,

    /// Generation model name (overrides the settings file)
    #[arg(long, env = "GEMINI_MODEL")]
    pub model: Option<String>,

    /// Print the digest without pushing it to the webhook
    #[arg(long)]
    pub dry_run: bool,

    /// API key for the text-generation backend
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub google_api_key: Option<String>,

    /// API key for the Google Custom Search backend
    #[arg(long, env = "GOOGLESEARCH_API_KEY", hide_env_values = true)]
    pub search_api_key: Option<String>,

    /// Search engine scope identifier (cx) for Google Custom Search
    #[arg(long, env = "GOOGLESEARCH_CX")]
    pub search_cx: Option<String>,

    /// ServerChan send key; delivery is skipped when absent
    #[arg(long, env = "SERVERCHAN_SENDKEY", hide_env_values = true)]
    pub sendkey: Option<String>,
}
