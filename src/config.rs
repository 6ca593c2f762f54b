//! Run settings loaded from an optional YAML file.
//!
//! Every field carries a default, so running without `--config` yields a
//! working fusion-news setup. Secrets never live here: they come from the
//! environment through [`crate::cli::Cli`] and are gathered into
//! [`Credentials`].
//!
//! # Example
//!
//! ```yaml
//! news:
//!   topic: "Nuclear Fusion"
//!   window: "48h"
//!   limit: 6
//! opportunities:
//!   strategy: random
//!   random_pool: [search, crawl]
//! digest:
//!   language: "English"
//! ```

use crate::cli::Cli;
use crate::models::Target;
use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::path::Path;
use tracing::{info, instrument};

/// Configuration-level failures. These are the only errors allowed to end a
/// run with a non-zero exit status.
#[derive(Debug)]
pub enum ConfigError {
    /// A required secret is absent from the environment.
    MissingKey(&'static str),
    /// The settings file could not be read.
    Unreadable(String),
    /// The settings file is not valid YAML for [`Settings`].
    Invalid(String),
    /// A setting has a value the pipeline cannot run with.
    Unusable(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey(var) => write!(f, "missing required environment variable {var}"),
            Self::Unreadable(msg) => write!(f, "cannot read settings file: {msg}"),
            Self::Invalid(msg) => write!(f, "invalid settings file: {msg}"),
            Self::Unusable(msg) => write!(f, "unusable setting: {msg}"),
        }
    }
}

impl Error for ConfigError {}

/// Which opportunity discovery strategy a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// One structured query against a search backend.
    Search,
    /// Scrape a fixed list of target pages directly.
    Targets,
    /// Crawl listing pages, then follow matching links.
    Crawl,
    /// Uniform pick from `random_pool`.
    Random,
}

/// Search backend used by the `search` strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    /// Google Custom Search JSON API (needs key + cx).
    Google,
    /// DuckDuckGo HTML endpoint (no credentials).
    Duckduckgo,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub news: NewsSettings,
    pub opportunities: OpportunitySettings,
    pub fetch: FetchSettings,
    pub digest: DigestSettings,
    pub notify: NotifySettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsSettings {
    pub topic: String,
    /// Recency filter understood by the feed, e.g. `48h` or `7d`.
    pub window: String,
    pub limit: usize,
    pub feed_url: String,
    pub hl: String,
    pub gl: String,
    pub ceid: String,
    pub timeout_secs: u64,
}

impl Default for NewsSettings {
    fn default() -> Self {
        Self {
            topic: "Nuclear Fusion".to_string(),
            window: "48h".to_string(),
            limit: 6,
            feed_url: "https://news.google.com/rss/search".to_string(),
            hl: "en-US".to_string(),
            gl: "US".to_string(),
            ceid: "US:en".to_string(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpportunitySettings {
    pub strategy: StrategyKind,
    pub random_pool: Vec<StrategyKind>,
    pub limit: usize,
    /// Character budget for any enriched page body handed to the composer.
    pub body_budget: usize,
    pub courtesy_delay_ms: u64,
    pub search: SearchSettings,
    pub targets: Vec<Target>,
    pub crawl: CrawlSettings,
}

impl Default for OpportunitySettings {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Search,
            random_pool: vec![StrategyKind::Search, StrategyKind::Targets, StrategyKind::Crawl],
            limit: 5,
            body_budget: 2000,
            courtesy_delay_ms: 1500,
            search: SearchSettings::default(),
            targets: default_targets(),
            crawl: CrawlSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub backend: SearchBackend,
    pub query: String,
    /// Google `dateRestrict` value; `m3` is "past three months".
    pub date_restrict: String,
    pub google_endpoint: String,
    pub duckduckgo_endpoint: String,
    pub timeout_secs: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            backend: SearchBackend::Google,
            query: "internship OR thesis OR student OR graduate".to_string(),
            date_restrict: "m3".to_string(),
            google_endpoint: "https://www.googleapis.com/customsearch/v1".to_string(),
            duckduckgo_endpoint: "https://html.duckduckgo.com/html/".to_string(),
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    pub targets: Vec<Target>,
    pub keywords: Vec<String>,
    /// Anchors must be strictly longer than this many characters.
    pub min_anchor_chars: usize,
    pub sample_size: usize,
    pub targets_per_run: usize,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            targets: default_crawl_targets(),
            keywords: [
                "physicist", "engineer", "intern", "postdoc", "scientist", "student", "phd",
                "thesis", "graduate",
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
            min_anchor_chars: 8,
            sample_size: 3,
            targets_per_run: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    /// Cap on extracted page text, in characters.
    pub max_chars: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self { timeout_secs: 15, max_chars: 3000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DigestSettings {
    pub model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
    pub attempts: usize,
    pub retry_delay_secs: u64,
    pub language: String,
    pub topics: Vec<String>,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 30,
            attempts: 3,
            retry_delay_secs: 5,
            language: "Simplified Chinese".to_string(),
            topics: default_topics(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub endpoint: String,
    pub title_prefix: String,
    pub timeout_secs: u64,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            endpoint: "https://sctapi.ftqq.com".to_string(),
            title_prefix: "⚛️ 核聚变早报".to_string(),
            timeout_secs: 15,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or defaults when no path is given.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No settings file given; using defaults");
            return Ok(Self::default());
        };
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Unreadable(format!("{}: {e}", path.display())))?;
        let settings = Self::from_yaml(&raw)?;
        info!(path = %path.display(), "Loaded settings file");
        Ok(settings)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Fold CLI overrides into the file settings.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(topic) = &cli.topic {
            self.news.topic = topic.clone();
        }
        if let Some(strategy) = cli.strategy {
            self.opportunities.strategy = strategy;
        }
        if let Some(model) = &cli.model {
            self.digest.model = model.clone();
        }
    }

    /// Reject settings the pipeline cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.digest.topics.is_empty() {
            return Err(ConfigError::Unusable("digest.topics must not be empty".into()));
        }
        if self.digest.attempts == 0 {
            return Err(ConfigError::Unusable("digest.attempts must be at least 1".into()));
        }
        if self.opportunities.strategy == StrategyKind::Random
            && self.opportunities.random_pool.iter().all(|k| *k == StrategyKind::Random)
        {
            return Err(ConfigError::Unusable(
                "opportunities.random_pool needs at least one concrete strategy".into(),
            ));
        }
        Ok(())
    }
}

/// Secrets gathered from the environment.
#[derive(Clone, Default)]
pub struct Credentials {
    pub generation_key: String,
    pub search_key: Option<String>,
    pub search_cx: Option<String>,
    pub notify_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("generation_key", &"<redacted>")
            .field("search_key", &self.search_key.as_ref().map(|_| "<redacted>"))
            .field("search_cx", &self.search_cx)
            .field("notify_key", &self.notify_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    /// Collect credentials, failing fast when the generation key is absent.
    ///
    /// Blank values count as absent.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let present = |v: &Option<String>| v.as_ref().filter(|s| !s.trim().is_empty()).cloned();
        let generation_key =
            present(&cli.google_api_key).ok_or(ConfigError::MissingKey("GOOGLE_API_KEY"))?;
        Ok(Self {
            generation_key,
            search_key: present(&cli.search_api_key),
            search_cx: present(&cli.search_cx),
            notify_key: present(&cli.sendkey),
        })
    }
}

fn target(label: &str, url: &str, description: &str) -> Target {
    Target {
        label: label.to_string(),
        url: url.to_string(),
        description: description.to_string(),
    }
}

fn default_targets() -> Vec<Target> {
    vec![
        target(
            "ITER Careers",
            "https://www.iter.org/jobs",
            "ITER Organization vacancies, traineeships and the ITER project associates scheme",
        ),
        target(
            "EUROfusion Opportunities",
            "https://euro-fusion.org/careers/",
            "EUROfusion consortium careers, PhD and engineering grants",
        ),
        target(
            "PPPL Careers",
            "https://www.pppl.gov/careers",
            "Princeton Plasma Physics Laboratory jobs and student internships",
        ),
        target(
            "UKAEA Careers",
            "https://careers.ukaea.uk/",
            "UK Atomic Energy Authority graduate and apprenticeship programmes",
        ),
    ]
}

fn default_crawl_targets() -> Vec<Target> {
    vec![
        target(
            "Commonwealth Fusion Systems",
            "https://cfs.energy/careers",
            "CFS open roles in magnets, plasma operations and engineering",
        ),
        target(
            "Max Planck IPP",
            "https://www.ipp.mpg.de/jobs",
            "IPP Garching and Greifswald job board",
        ),
        target(
            "Tokamak Energy",
            "https://tokamakenergy.com/careers/",
            "Tokamak Energy vacancies",
        ),
    ]
}

fn default_topics() -> Vec<String> {
    [
        "The Lawson criterion and the triple product",
        "Tokamaks versus stellarators",
        "High-temperature superconducting magnets",
        "Tritium breeding blankets",
        "Plasma-facing materials and tungsten divertors",
        "Inertial confinement and the NIF ignition shot",
        "Magnetic reconnection in fusion plasmas",
        "Edge-localized modes and how to tame them",
        "Neutral beam injection heating",
        "Electron cyclotron resonance heating",
        "Bootstrap current in tokamaks",
        "Neutron damage and materials embrittlement",
        "The D-T versus p-B11 fuel debate",
        "Field-reversed configurations",
        "Z-pinch devices and sheared-flow stabilization",
        "Disruption mitigation with shattered pellets",
        "Plasma diagnostics: Thomson scattering",
        "Gyrokinetic simulation of turbulence",
        "Remote handling and maintenance robotics",
        "Fusion power plant economics and capacity factor",
    ]
    .iter()
    .map(|t| t.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults_are_usable() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.fetch.max_chars, 3000);
        assert_eq!(settings.digest.attempts, 3);
        assert_eq!(settings.digest.topics.len(), 20);
        assert_eq!(settings.digest.language, "Simplified Chinese");
        assert_eq!(settings.notify.title_prefix, "⚛️ 核聚变早报");
        assert!(!settings.opportunities.targets.is_empty());
    }

    #[test]
    fn test_yaml_overrides_defaults() {
        let yaml = r#"
news:
  topic: "Stellarator"
  limit: 8
opportunities:
  strategy: crawl
  search:
    backend: duckduckgo
digest:
  language: "English"
  topics: ["Only topic"]
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.news.topic, "Stellarator");
        assert_eq!(settings.news.limit, 8);
        assert_eq!(settings.news.window, "48h");
        assert_eq!(settings.opportunities.strategy, StrategyKind::Crawl);
        assert_eq!(settings.opportunities.search.backend, SearchBackend::Duckduckgo);
        assert_eq!(settings.digest.language, "English");
        assert_eq!(settings.digest.topics, vec!["Only topic".to_string()]);
        assert_eq!(settings.digest.model, "gemini-2.0-flash");
    }

    #[test]
    fn test_empty_yaml_is_defaults() {
        let settings = Settings::from_yaml("  \n").unwrap();
        assert_eq!(settings.news.topic, "Nuclear Fusion");
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        let err = Settings::from_yaml("news: [not, a, map]").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_empty_topic_catalog_is_unusable() {
        let mut settings = Settings::default();
        settings.digest.topics.clear();
        assert!(matches!(settings.validate(), Err(ConfigError::Unusable(_))));
    }

    #[test]
    fn test_random_pool_needs_concrete_strategy() {
        let mut settings = Settings::default();
        settings.opportunities.strategy = StrategyKind::Random;
        settings.opportunities.random_pool = vec![StrategyKind::Random];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_credentials_require_generation_key() {
        let cli = Cli::parse_from(["fusion_digest"]);
        let cli = Cli { google_api_key: None, ..cli };
        assert!(matches!(
            Credentials::from_cli(&cli),
            Err(ConfigError::MissingKey("GOOGLE_API_KEY"))
        ));
    }

    #[test]
    fn test_credentials_treat_blank_as_absent() {
        let cli = Cli::parse_from(["fusion_digest"]);
        let cli = Cli {
            google_api_key: Some("g-key".into()),
            search_api_key: Some("   ".into()),
            search_cx: None,
            sendkey: Some("SCT123".into()),
            ..cli
        };
        let creds = Credentials::from_cli(&cli).unwrap();
        assert_eq!(creds.generation_key, "g-key");
        assert!(creds.search_key.is_none());
        assert_eq!(creds.notify_key.as_deref(), Some("SCT123"));
        assert!(!format!("{creds:?}").contains("g-key"));
    }

    #[test]
    fn test_apply_cli_overrides() {
        let cli = Cli::parse_from([
            "fusion_digest",
            "--topic",
            "Inertial Fusion",
            "--strategy",
            "targets",
            "--model",
            "gemini-2.5-flash",
        ]);
        let mut settings = Settings::default();
        settings.apply_cli(&cli);
        assert_eq!(settings.news.topic, "Inertial Fusion");
        assert_eq!(settings.opportunities.strategy, StrategyKind::Targets);
        assert_eq!(settings.digest.model, "gemini-2.5-flash");
    }
}
