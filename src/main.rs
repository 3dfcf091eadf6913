//! # Awful Local News
//!
//! Summarizes news articles for a single Indian state. Article pages are
//! scraped with browser-like headers, sent to a hosted generative model that
//! writes a short summary and decides which of the state's cities the story
//! is about, and only the relevant ones are kept.
//!
//! ## Features
//!
//! - Fault-tolerant key rotation across several news search and model keys,
//!   with rate-limit backoff and a cooldown once every key has failed
//! - Article text extraction through an ordered list of fallback selectors
//! - Batched processing (3 at a time by default) that stops as soon as the
//!   target number of relevant articles (5 by default) is reached
//! - An HTTP API (`serve`) and a one-shot JSON digest (`digest`)
//!
//! ## Usage
//!
//! ```sh
//! GEMINI_API_KEYS=k1,k2 awful_local_news serve
//! NEWS_API_KEYS=n1 GEMINI_API_KEYS=k1 awful_local_news digest -q Punjab -j ./json
//! ```
//!
//! ## Architecture
//!
//! 1. **Search**: Find article references for the region (`digest`, `GET /news`)
//! 2. **Scrape**: Download each article page and extract its text
//! 3. **Summarize**: Ask the model for a region verdict and validate it
//! 4. **Collect**: Keep relevant articles, batch by batch, up to the target

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod extract;
mod fetcher;
mod gemini;
mod models;
mod newsapi;
mod outputs;
mod pipeline;
mod rotator;
mod server;
mod summarize;
#[cfg(test)]
mod test_support;
mod utils;

use cli::{Cli, Command};
use config::AppConfig;
use models::RegionalDigest;
use newsapi::NewsSearchClient;
use outputs::json;
use pipeline::LivePipeline;
use rotator::CredentialRotator;
use server::AppState;
use utils::{ensure_writable_dir, time_of_day};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("awful_local_news starting up");

    let args = Cli::parse();
    debug!(config = ?args.config, command = ?args.command, "Parsed CLI arguments");

    let mut config = AppConfig::load(args.config.as_deref()).await?;
    config.apply_key_overrides(args.news_api_keys.as_deref(), args.gemini_api_keys.as_deref());
    config.validate()?;

    match args.command {
        Command::Serve { listen } => run_server(config, listen).await?,
        Command::Digest {
            query,
            json_output_dir,
            target_count,
            batch_size,
        } => {
            run_digest(
                &config,
                &query,
                &json_output_dir,
                target_count.unwrap_or(config.pipeline.target_count),
                batch_size.unwrap_or(config.pipeline.batch_size),
            )
            .await?
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

/// News search client, or `None` when no keys are configured.
fn news_client(config: &AppConfig) -> Result<Option<NewsSearchClient>, error::Error> {
    if config.news_api.keys.is_empty() {
        return Ok(None);
    }
    let rotator = CredentialRotator::new(
        newsapi::PROVIDER,
        config.news_api.keys.clone(),
        config.rotation.policy(),
    )?;
    Ok(Some(NewsSearchClient::new(&config.news_api, Arc::new(rotator))?))
}

#[instrument(level = "info", skip_all)]
async fn run_server(config: AppConfig, listen: Option<String>) -> Result<(), Box<dyn Error>> {
    let pipeline = LivePipeline::from_config(&config)?;
    let news = news_client(&config)?;
    if news.is_none() {
        warn!("No news search keys configured; GET /news is disabled");
    }

    let listen_addr = listen.unwrap_or_else(|| config.server.listen_addr.clone());
    let state = AppState {
        pipeline,
        news,
        defaults: config.pipeline.clone(),
    };
    server::serve(&listen_addr, state).await?;
    Ok(())
}

#[instrument(level = "info", skip(config))]
async fn run_digest(
    config: &AppConfig,
    query: &str,
    json_output_dir: &str,
    target_count: usize,
    batch_size: usize,
) -> Result<(), Box<dyn Error>> {
    // Early check: fail before spending any provider quota
    if let Err(e) = ensure_writable_dir(json_output_dir).await {
        error!(
            path = %json_output_dir,
            error = %e,
            "JSON output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }
    if target_count == 0 || batch_size == 0 {
        return Err(error::Error::Config("target count and batch size must be at least 1".into()).into());
    }

    let news = news_client(config)?.ok_or_else(|| {
        error::Error::Config("digest needs news search keys (NEWS_API_KEYS or news_api.keys)".into())
    })?;
    let pipeline = LivePipeline::from_config(config)?;

    let articles = news.everything(query).await?;
    info!(count = articles.len(), "Total articles to analyze");

    let summarized = pipeline.run(&articles, query, target_count, batch_size).await?;

    let now = Local::now();
    let digest = RegionalDigest {
        query: query.to_string(),
        local_date: now.date_naive().to_string(),
        time_of_day: time_of_day(),
        local_time: now.time().format("%H:%M:%S").to_string(),
        articles: summarized,
    };
    info!(
        time_of_day = %digest.time_of_day,
        local_date = %digest.local_date,
        articles = digest.articles.len(),
        "Digest ready"
    );

    let path = json::write_digest(&digest, json_output_dir).await?;
    info!(path = %path.display(), "Digest written");
    Ok(())
}
