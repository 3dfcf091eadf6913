//! Batched scrape-and-summarize pipeline.
//!
//! Article references are consumed in fixed-size slices. Every reference in
//! a slice is scraped and summarized concurrently; the slice finishes only
//! when all of them settle, and the next slice starts only after the previous
//! one's results are merged. That keeps at most `batch_size` provider calls in
//! flight and lets the run stop as soon as `target_count` articles are in hand,
//! leaving the rest of the input untouched.
//!
//! Per-article failures (no content, malformed or irrelevant replies,
//! timeouts, even exhausted model keys) drop that article only. The run as a
//! whole fails only when it produced nothing and every summarization it
//! attempted ended with exhausted credentials.

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::fetcher::{ContentFetcher, ContentSource};
use crate::gemini::{self, GeminiModel};
use crate::models::{ArticleReference, SummarizedArticle};
use crate::rotator::CredentialRotator;
use crate::summarize::{ArticleSummarizer, SummarizationClient};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

/// The pipeline wired to real HTTP scraping and the hosted model.
pub type LivePipeline = BatchPipeline<ContentFetcher, SummarizationClient<GeminiModel>>;

pub struct BatchPipeline<F, S> {
    fetcher: F,
    summarizer: S,
    article_timeout: Option<Duration>,
}

/// What happened to one article reference.
#[derive(Debug)]
enum ArticleOutcome {
    Accepted(SummarizedArticle),
    NoContent,
    Dropped,
    Exhausted(Error),
    Failed(Error),
    TimedOut,
}

/// Running totals for one invocation of [`BatchPipeline::run`].
#[derive(Debug, Default)]
struct BatchState {
    processed: usize,
    accumulated: Vec<SummarizedArticle>,
    summarize_attempts: usize,
    exhausted_attempts: usize,
    first_exhaustion: Option<Error>,
}

impl BatchState {
    fn record(&mut self, index: usize, outcome: ArticleOutcome, target_count: usize) {
        match outcome {
            ArticleOutcome::Accepted(article) => {
                self.summarize_attempts += 1;
                if self.accumulated.len() < target_count {
                    self.accumulated.push(article);
                } else {
                    debug!(index, "Target already reached; discarding extra summary");
                }
            }
            ArticleOutcome::Dropped => self.summarize_attempts += 1,
            ArticleOutcome::Exhausted(e) => {
                self.summarize_attempts += 1;
                self.exhausted_attempts += 1;
                self.first_exhaustion.get_or_insert(e);
            }
            ArticleOutcome::Failed(e) => {
                self.summarize_attempts += 1;
                debug!(index, error = %e, "Article failed");
            }
            ArticleOutcome::NoContent | ArticleOutcome::TimedOut => {}
        }
    }

    fn finish(self) -> Result<Vec<SummarizedArticle>> {
        if self.accumulated.is_empty()
            && self.summarize_attempts > 0
            && self.exhausted_attempts == self.summarize_attempts
        {
            if let Some(e) = self.first_exhaustion {
                return Err(e);
            }
        }
        Ok(self.accumulated)
    }
}

impl<F, S> BatchPipeline<F, S>
where
    F: ContentSource + Sync,
    S: ArticleSummarizer + Sync,
{
    pub fn new(fetcher: F, summarizer: S) -> Self {
        Self {
            fetcher,
            summarizer,
            article_timeout: None,
        }
    }

    /// Bound scrape + summarize for each article. `Duration::ZERO` disables it.
    pub fn with_article_timeout(mut self, limit: Duration) -> Self {
        self.article_timeout = (!limit.is_zero()).then_some(limit);
        self
    }

    #[cfg(test)]
    pub(crate) fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Summarize `articles` for `query` until `target_count` are accepted or
    /// the input runs out. The result never holds more than `target_count`.
    #[instrument(
        level = "info",
        skip_all,
        fields(%query, total = articles.len(), target_count, batch_size)
    )]
    pub async fn run(
        &self,
        articles: &[ArticleReference],
        query: &str,
        target_count: usize,
        batch_size: usize,
    ) -> Result<Vec<SummarizedArticle>> {
        let t0 = Instant::now();
        let batch_size = batch_size.max(1);
        let mut state = BatchState::default();

        while state.accumulated.len() < target_count && state.processed < articles.len() {
            let start = state.processed;
            let end = (start + batch_size).min(articles.len());
            let batch = &articles[start..end];
            state.processed = end;

            info!(start, len = batch.len(), "Processing batch");
            let outcomes = join_all(
                batch
                    .iter()
                    .enumerate()
                    .map(|(offset, article)| self.process(start + offset, article, query)),
            )
            .await;

            for (offset, outcome) in outcomes.into_iter().enumerate() {
                state.record(start + offset, outcome, target_count);
            }
            info!(
                valid = state.accumulated.len(),
                target_count,
                processed = state.processed,
                "Batch merged"
            );
        }

        if state.processed >= articles.len() {
            info!("Processed all available articles");
        }
        let processed = state.processed;
        let result = state.finish();
        match &result {
            Ok(found) => info!(
                returned = found.len(),
                processed,
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "Pipeline complete"
            ),
            Err(e) => error!(error = %e, processed, "Pipeline failed"),
        }
        result
    }

    async fn process(&self, index: usize, article: &ArticleReference, query: &str) -> ArticleOutcome {
        let work = async {
            let content = self.fetcher.scrape(&article.url).await;
            if content.is_empty() {
                debug!(index, url = %article.url, source = ?article.source_tag(), "No content; skipping article");
                return ArticleOutcome::NoContent;
            }
            match self.summarizer.summarize(article, &content, query).await {
                Ok(Some(summarized)) => ArticleOutcome::Accepted(summarized),
                Ok(None) => ArticleOutcome::Dropped,
                Err(e) if e.is_exhausted() => {
                    warn!(index, url = %article.url, error = %e, "Summarization keys exhausted; skipping article");
                    ArticleOutcome::Exhausted(e)
                }
                Err(e) => {
                    warn!(index, url = %article.url, error = %e, "Summarization failed; skipping article");
                    ArticleOutcome::Failed(e)
                }
            }
        };

        match self.article_timeout {
            Some(limit) => match timeout(limit, work).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(index, url = %article.url, ?limit, "Article timed out; skipping");
                    ArticleOutcome::TimedOut
                }
            },
            None => work.await,
        }
    }
}

impl LivePipeline {
    /// Wire the real fetcher and model client from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let rotator = CredentialRotator::new(
            gemini::PROVIDER,
            config.gemini.keys.clone(),
            config.rotation.policy(),
        )?;
        let summarizer =
            SummarizationClient::new(GeminiModel::new(&config.gemini)?, Arc::new(rotator));
        let fetcher = ContentFetcher::new(&config.scrape)?;
        Ok(BatchPipeline::new(fetcher, summarizer)
            .with_article_timeout(Duration::from_secs(config.pipeline.article_timeout_secs)))
    }
}
