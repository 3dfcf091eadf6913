//! Runtime configuration loaded from YAML.
//!
//! Every section falls back to defaults, so an empty file (or no file at
//! all) gives a working setup apart from credentials, which come from the
//! file or the `NEWS_API_KEYS` / `GEMINI_API_KEYS` environment variables.
//!
//! ```yaml
//! gemini:
//!   keys: ["AIza...", "AIza..."]
//!   model: gemini-1.5-pro-latest
//! news_api:
//!   keys: ["12f3..."]
//! pipeline:
//!   target_count: 5
//!   batch_size: 3
//! ```

use crate::error::{Error, Result};
use crate::rotator::RotationPolicy;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub news_api: NewsApiConfig,
    pub gemini: GeminiConfig,
    pub scrape: ScrapeConfig,
    pub pipeline: PipelineConfig,
    pub rotation: RotationConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NewsApiConfig {
    pub keys: Vec<String>,
    pub base_url: String,
    /// Country used for top headlines when no query is given.
    pub country: String,
    pub page_size: u32,
    pub timeout_secs: u64,
}

impl Default for NewsApiConfig {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            base_url: "https://newsapi.org".to_string(),
            country: "in".to_string(),
            page_size: 50,
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub keys: Vec<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            model: "gemini-1.5-pro-latest".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            temperature: 0.2,
            max_output_tokens: 1024,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// CSS selectors tried in order; the first yielding text wins.
    pub selectors: Vec<String>,
    /// Scraped text is cut to this many characters before prompting.
    pub max_content_chars: usize,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            selectors: vec![
                "article".to_string(),
                ".article__body-content".to_string(),
                ".story-body".to_string(),
            ],
            max_content_chars: 2000,
            timeout_secs: 20,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub target_count: usize,
    pub batch_size: usize,
    /// Largest `targetCount` an API request may ask for.
    pub max_target_count: usize,
    /// Largest `batchSize` an API request may ask for. Bounds provider calls in flight.
    pub max_batch_size: usize,
    /// Upper bound on scrape + summarize for one article.
    pub article_timeout_secs: u64,
}

impl PipelineConfig {
    /// Requested counts, defaulted and capped at the configured maximums.
    pub fn bounded(&self, target_count: Option<usize>, batch_size: Option<usize>) -> (usize, usize) {
        (
            target_count.unwrap_or(self.target_count).min(self.max_target_count),
            batch_size.unwrap_or(self.batch_size).min(self.max_batch_size),
        )
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_count: 5,
            batch_size: 3,
            max_target_count: 20,
            max_batch_size: 10,
            article_timeout_secs: 90,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RotationConfig {
    pub rate_limit_delay_ms: u64,
    pub exhausted_cooldown_ms: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        let policy = RotationPolicy::default();
        Self {
            rate_limit_delay_ms: policy.rate_limit_delay.as_millis() as u64,
            exhausted_cooldown_ms: policy.exhausted_cooldown.as_millis() as u64,
        }
    }
}

impl RotationConfig {
    pub fn policy(&self) -> RotationPolicy {
        RotationPolicy {
            rate_limit_delay: Duration::from_millis(self.rate_limit_delay_ms),
            exhausted_cooldown: Duration::from_millis(self.exhausted_cooldown_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5001".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, or defaults when no path is given.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&str>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = tokio::fs::read_to_string(Path::new(path)).await?;
                let config = Self::from_yaml(&raw)?;
                info!(path, "Loaded configuration");
                config
            }
            None => {
                info!("No config file given; using defaults");
                Self::default()
            }
        };
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        // An empty document deserializes to unit, not a mapping.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Replace key lists with comma-separated environment overrides.
    pub fn apply_key_overrides(&mut self, news_api_keys: Option<&str>, gemini_keys: Option<&str>) {
        if let Some(raw) = news_api_keys {
            self.news_api.keys = split_keys(raw);
        }
        if let Some(raw) = gemini_keys {
            self.gemini.keys = split_keys(raw);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.target_count == 0 {
            return Err(Error::Config("pipeline.target_count must be at least 1".into()));
        }
        if self.pipeline.batch_size == 0 {
            return Err(Error::Config("pipeline.batch_size must be at least 1".into()));
        }
        if self.pipeline.max_target_count < self.pipeline.target_count {
            return Err(Error::Config(
                "pipeline.max_target_count must be at least pipeline.target_count".into(),
            ));
        }
        if self.pipeline.max_batch_size < self.pipeline.batch_size {
            return Err(Error::Config(
                "pipeline.max_batch_size must be at least pipeline.batch_size".into(),
            ));
        }
        if self.scrape.selectors.is_empty() {
            return Err(Error::Config("scrape.selectors must not be empty".into()));
        }
        for selector in &self.scrape.selectors {
            Selector::parse(selector).map_err(|e| {
                Error::Config(format!("invalid scrape selector {selector:?}: {e}"))
            })?;
        }
        Ok(())
    }
}

/// Split `a, b,,c` into `["a", "b", "c"]`.
pub fn split_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}
