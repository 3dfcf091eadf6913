//! Article page scraping with browser-like headers.
//!
//! Many news sites refuse or degrade responses for non-browser agents, so
//! every request carries a desktop Chrome user agent along with the usual
//! `Accept`, `Accept-Language`, and `Connection: keep-alive` headers.
//!
//! Scraping never fails loudly: a bad status, a network error, or a page
//! where no selector matches all come back as an empty string, which the
//! pipeline reads as "skip this article".

use crate::config::ScrapeConfig;
use crate::error::{Error, Result};
use crate::extract::ExtractionChain;
use crate::utils::truncate_chars;
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONNECTION, HeaderMap, HeaderValue};
use scraper::Html;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Anything that can turn an article URL into plain text.
pub trait ContentSource {
    /// Returns the article text, or an empty string when there is none.
    fn scrape(&self, url: &str) -> impl Future<Output = String> + Send;
}

#[derive(Debug)]
pub struct ContentFetcher {
    client: Client,
    chain: ExtractionChain,
    max_chars: usize,
}

impl ContentFetcher {
    pub fn new(config: &ScrapeConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let chain = ExtractionChain::from_selectors(&config.selectors)?;
        debug!(strategies = chain.strategy_count(), "Extraction chain ready");

        Ok(Self {
            client,
            chain,
            max_chars: config.max_content_chars,
        })
    }

    /// GET the page body, treating any non-2xx status as a failure.
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub async fn fetch_html(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Provider {
                provider: "scrape".to_string(),
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("").to_string(),
            });
        }
        Ok(response.text().await?)
    }

    /// Pull article text out of an HTML document, capped at `max_chars`.
    pub fn extract(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        match self.chain.extract(&document) {
            Some((strategy, text)) => {
                debug!(strategy, chars = text.chars().count(), "Extracted article text");
                truncate_chars(&text, self.max_chars).to_string()
            }
            None => String::new(),
        }
    }
}

impl ContentSource for ContentFetcher {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn scrape(&self, url: &str) -> String {
        let t0 = Instant::now();
        let html = match self.fetch_html(url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, "Scrape failed; treating as no content");
                return String::new();
            }
        };

        let content = self.extract(&html);
        if content.is_empty() {
            warn!("No selector produced article text");
        } else {
            info!(
                chars = content.chars().count(),
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "Scraped article"
            );
        }
        content
    }
}
