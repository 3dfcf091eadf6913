//! Region-aware article summarization through the generative model.
//!
//! The model is asked for a fixed JSON object (summary, `"<City> - <Category>"`
//! topic, one canonical location, a relevance flag for the queried state, and
//! every qualifying city it found). Its reply is untrusted: code fences are
//! stripped, the JSON is parsed, and required fields are checked before a
//! [`SummarizedArticle`] is produced.
//!
//! Outcomes:
//! - `Ok(Some(_))`: well-formed, complete, and relevant
//! - `Ok(None)`: no content, malformed reply, or not relevant to the query
//! - `Err(ExhaustedCredentials)`: every model key failed

use crate::error::Result;
use crate::gemini::GenerativeModel;
use crate::models::{ArticleReference, RegionVerdict, SummarizedArticle};
use crate::rotator::CredentialRotator;
use crate::utils::{looks_truncated, truncate_for_log};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// A fenced block anywhere in the reply, with or without a language tag.
static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)\s*```").expect("fence pattern is valid"));

/// Anything that can turn scraped content into a region-filtered summary.
pub trait ArticleSummarizer {
    fn summarize(
        &self,
        article: &ArticleReference,
        content: &str,
        query: &str,
    ) -> impl Future<Output = Result<Option<SummarizedArticle>>> + Send;
}

pub struct SummarizationClient<M> {
    model: M,
    rotator: Arc<CredentialRotator>,
}

impl<M: GenerativeModel + Sync> SummarizationClient<M> {
    pub fn new(model: M, rotator: Arc<CredentialRotator>) -> Self {
        Self { model, rotator }
    }

    async fn ask(&self, prompt: &str) -> Result<String> {
        let model = &self.model;
        self.rotator
            .with_fallback(|key| async move { model.generate(&key, prompt).await })
            .await
    }
}

impl<M: GenerativeModel + Sync> ArticleSummarizer for SummarizationClient<M> {
    #[instrument(level = "info", skip_all, fields(url = %article.url, %query))]
    async fn summarize(
        &self,
        article: &ArticleReference,
        content: &str,
        query: &str,
    ) -> Result<Option<SummarizedArticle>> {
        if content.trim().is_empty() {
            debug!("No content to summarize");
            return Ok(None);
        }
        info!(title = %article.title, "Summarizing article");

        let prompt = build_prompt(article, content, query);
        let response = self.ask(&prompt).await?;
        let mut parsed = parse_verdict(&response);

        // A reply cut off mid-object gets one more chance.
        if let Err(ref e) = parsed {
            if looks_truncated(e) {
                warn!(error = %e, "EOF while parsing; re-asking once");
                let retry = self.ask(&prompt).await?;
                parsed = parse_verdict(&retry);
            }
        }

        match parsed {
            Ok(verdict) => Ok(accept_verdict(article, verdict, query)),
            Err(e) => {
                warn!(
                    error = %e,
                    response_preview = %truncate_for_log(&response, 300),
                    "Model returned non-conforming JSON; skipping article"
                );
                Ok(None)
            }
        }
    }
}

/// The instruction sent for one article. Same inputs, same prompt.
pub fn build_prompt(article: &ArticleReference, content: &str, query: &str) -> String {
    let author = article
        .author
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or("Unknown");

    format!(
        r#"Summarize the following Indian news article in under 100 words:
Title: {title}
Author: {author}
Content: {content}
Search Query (State): {query}

Instructions:
1. Confirm that the article is an Indian news piece.
2. Extract any city names mentioned in the article (from both content and author) and keep only cities located in India.
3. From these, identify the cities that are within the state specified in the search query.
4. If at least one valid city from the queried state is found, mark the article as relevant. Choose one of these cities as the "location" and list all valid cities in "citiesFound".
5. If no valid city from the queried state is found, set "isRelevant" to false.
6. Provide a concise summary and a topic in the format "City - News Category".
7. Never use a city outside India as the location.

Output the result as JSON in exactly this format (no markdown, no code blocks):
{{
  "summary": "Summarized news content in under 100 words",
  "topic": "City - News Category",
  "location": "City",
  "isRelevant": true or false,
  "citiesFound": ["list of cities from the queried state"]
}}"#,
        title = article.title.trim(),
    )
}

/// Remove markdown code fences the model may wrap its JSON in.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(body) = FENCED_BLOCK.captures(trimmed).and_then(|c| c.get(1)) {
        return body.as_str().trim();
    }

    // An opening fence with no closing one (typically a truncated reply).
    let mut body = trimmed;
    if let Some(rest) = body.strip_prefix("```") {
        body = match rest.split_once('\n') {
            Some((_, after_tag)) => after_tag,
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
        };
    }
    body.trim_end().trim_end_matches("```").trim()
}

/// Parse the model reply into a [`RegionVerdict`].
///
/// Falls back to the outermost `{...}` span when the reply has prose around
/// the object. The first parse error is returned when nothing parses, so EOF
/// truncation stays detectable.
pub fn parse_verdict(raw: &str) -> std::result::Result<RegionVerdict, serde_json::Error> {
    let body = strip_code_fences(raw);
    let first_error = match serde_json::from_str::<RegionVerdict>(body) {
        Ok(verdict) => return Ok(verdict),
        Err(e) => e,
    };

    if let (Some(start), Some(end)) = (body.find('{'), body.rfind('}')) {
        if start < end && (start > 0 || end + 1 < body.len()) {
            if let Ok(verdict) = serde_json::from_str::<RegionVerdict>(&body[start..=end]) {
                return Ok(verdict);
            }
        }
    }
    Err(first_error)
}

/// Turn a parsed verdict into an article, or `None` if it should be dropped.
pub fn accept_verdict(
    article: &ArticleReference,
    verdict: RegionVerdict,
    query: &str,
) -> Option<SummarizedArticle> {
    if !verdict.isRelevant {
        info!(%query, title = %article.title, "Article skipped: no relevant cities for query");
        return None;
    }

    let required = |field: Option<String>| field.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let (Some(summary), Some(topic), Some(location)) = (
        required(verdict.summary),
        required(verdict.topic),
        required(verdict.location),
    ) else {
        warn!(title = %article.title, "Model reply missing summary, topic, or location; skipping");
        return None;
    };

    let mut cities_found: Vec<String> = verdict
        .citiesFound
        .unwrap_or_default()
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unique_by(|c| c.to_lowercase())
        .collect();
    if !cities_found.iter().any(|c| c.eq_ignore_ascii_case(&location)) {
        cities_found.insert(0, location.clone());
    }

    // Stale values from a resubmitted result would serialize as duplicate keys.
    let mut article = article.clone();
    for key in ["summary", "topic", "location", "citiesFound"] {
        article.extra.remove(key);
    }

    info!(%topic, %location, cities = ?cities_found, "News summarized successfully");
    Some(SummarizedArticle {
        article,
        summary,
        topic,
        location,
        cities_found,
    })
}
