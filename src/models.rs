//! Data models for article references and their summarized forms.
//!
//! This module defines the core data structures used throughout the application:
//! - [`ArticleReference`]: An article as handed to the pipeline (url, title, author, extras)
//! - [`SummarizedArticle`]: A reference enriched with the model's summary and location
//! - [`RegionVerdict`]: The raw JSON object the model is asked to return
//! - [`RegionalDigest`]: One `digest` run written to disk
//!
//! [`RegionVerdict`] keeps the model's camelCase field names verbatim, hence
//! the `#[allow(non_snake_case)]` attribute.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An article handed to the pipeline by the caller.
///
/// Provider metadata beyond `url`, `title`, and `author` (description,
/// `publishedAt`, source, image) is carried through untouched in `extra`
/// so it reappears on the summarized output.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ArticleReference {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ArticleReference {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            author: None,
            extra: Map::new(),
        }
    }

    #[cfg(test)]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Extract the domain name (before the TLD) from the article URL.
    /// For example: "https://www.bbc.com/news/x" -> "bbc"
    pub fn source_tag(&self) -> Option<String> {
        let parsed = url::Url::parse(&self.url).ok()?;
        let host = parsed.host_str()?;
        let parts: Vec<&str> = host.split('.').collect();
        if parts.len() >= 2 {
            return Some(parts[parts.len() - 2].to_string());
        }
        None
    }
}

/// An article the model summarized and judged relevant to the queried region.
///
/// Serializes flat: the original reference fields sit beside `summary`,
/// `topic`, `location`, and `citiesFound`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SummarizedArticle {
    #[serde(flatten)]
    pub article: ArticleReference,
    pub summary: String,
    /// Formatted as `"<City> - <Category>"`.
    pub topic: String,
    pub location: String,
    #[serde(rename = "citiesFound")]
    pub cities_found: Vec<String>,
}

/// The JSON object the model is instructed to produce.
///
/// Everything is optional here: model output is untrusted and is checked by
/// the summarization client before it becomes a [`SummarizedArticle`].
#[allow(non_snake_case)]
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RegionVerdict {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub isRelevant: bool,
    #[serde(default)]
    pub citiesFound: Option<Vec<String>>,
}

/// Body of `POST /summarize-news`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeRequest {
    pub articles: Vec<ArticleReference>,
    pub query: String,
    #[serde(default)]
    pub target_count: Option<usize>,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

/// One `digest` run, serialized to the JSON output directory.
///
/// The `time_of_day` field categorizes editions as:
/// - `"morning"`: 00:00 - 08:00
/// - `"afternoon"`: 08:00 - 16:00
/// - `"evening"`: 16:00 - 24:00
#[derive(Debug, Deserialize, Serialize)]
pub struct RegionalDigest {
    /// The region the articles were filtered for.
    pub query: String,
    /// The date of the run in `YYYY-MM-DD` format.
    pub local_date: String,
    pub time_of_day: String,
    pub local_time: String,
    pub articles: Vec<SummarizedArticle>,
}
