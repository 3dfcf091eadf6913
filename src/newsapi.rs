//! News search provider client (NewsAPI `everything` / `top-headlines`).
//!
//! Each request goes through the provider's own [`CredentialRotator`]; keys
//! travel in the `X-Api-Key` header. Unlike per-article summarization, a
//! search is a shared upstream call: when every key fails, the whole request
//! fails with [`Error::ExhaustedCredentials`].

use crate::config::NewsApiConfig;
use crate::error::{Error, Result};
use crate::models::ArticleReference;
use crate::rotator::CredentialRotator;
use crate::utils::truncate_for_log;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const PROVIDER: &str = "newsapi";

/// Placeholder NewsAPI substitutes for withdrawn articles.
const REMOVED: &str = "[Removed]";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<Value>,
}

#[derive(Debug)]
pub struct NewsSearchClient {
    client: Client,
    base_url: String,
    country: String,
    page_size: u32,
    rotator: Arc<CredentialRotator>,
}

impl NewsSearchClient {
    pub fn new(config: &NewsApiConfig, rotator: Arc<CredentialRotator>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base_url = Url::parse(&config.base_url)?;
        Ok(Self {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            country: config.country.clone(),
            page_size: config.page_size,
            rotator,
        })
    }

    /// Articles matching `query`, or top headlines when the query is blank.
    pub async fn search(&self, query: Option<&str>) -> Result<Vec<ArticleReference>> {
        match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => self.everything(q).await,
            None => self.top_headlines().await,
        }
    }

    #[instrument(level = "info", skip(self))]
    pub async fn everything(&self, query: &str) -> Result<Vec<ArticleReference>> {
        let page_size = self.page_size.to_string();
        let params = [
            ("q", query),
            ("sortBy", "publishedAt"),
            ("language", "en"),
            ("pageSize", page_size.as_str()),
        ];
        self.get("/v2/everything", &params).await
    }

    #[instrument(level = "info", skip(self), fields(country = %self.country))]
    pub async fn top_headlines(&self) -> Result<Vec<ArticleReference>> {
        let page_size = self.page_size.to_string();
        let params = [
            ("country", self.country.as_str()),
            ("pageSize", page_size.as_str()),
        ];
        self.get("/v2/top-headlines", &params).await
    }

    async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<Vec<ArticleReference>> {
        let url = format!("{}{}", self.base_url, path);
        let articles = self
            .rotator
            .with_fallback(|key| {
                let request = self
                    .client
                    .get(&url)
                    .header("X-Api-Key", key)
                    .query(params);
                async move {
                    let response = request.send().await?;
                    let status = response.status();
                    let body = response.text().await?;
                    parse_response(status, &body)
                }
            })
            .await?;
        info!(count = articles.len(), path, "Fetched article references");
        Ok(articles)
    }
}

/// Classify a NewsAPI reply and keep usable article references.
fn parse_response(status: StatusCode, body: &str) -> Result<Vec<ArticleReference>> {
    let parsed: Option<NewsApiResponse> = serde_json::from_str(body).ok();
    let ok = status.is_success() && parsed.as_ref().is_some_and(|r| r.status == "ok");

    if !ok {
        let code = parsed.as_ref().and_then(|r| r.code.clone()).unwrap_or_default();
        let message = parsed
            .as_ref()
            .and_then(|r| r.message.clone())
            .unwrap_or_else(|| truncate_for_log(body, 200));
        if status == StatusCode::TOO_MANY_REQUESTS || code == "rateLimited" {
            return Err(Error::RateLimited {
                provider: PROVIDER.to_string(),
                detail: message,
            });
        }
        return Err(Error::Provider {
            provider: PROVIDER.to_string(),
            status: status.as_u16(),
            message: if code.is_empty() { message } else { format!("{code}: {message}") },
        });
    }

    let articles = parsed.map(|r| r.articles).unwrap_or_default();
    let total = articles.len();
    let usable: Vec<ArticleReference> = articles
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<ArticleReference>(raw) {
            Ok(article) => Some(article),
            Err(e) => {
                debug!(error = %e, "Skipping malformed article entry");
                None
            }
        })
        .filter(|a| !a.url.trim().is_empty() && a.title != REMOVED)
        .collect();
    if usable.len() < total {
        warn!(dropped = total - usable.len(), "Dropped unusable article entries");
    }
    Ok(usable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotator::RotationPolicy;
    use crate::test_support::spawn_server;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    const GOOD_KEY: &str = "good-key-0001";

    fn sample_body() -> Value {
        json!({
            "status": "ok",
            "totalResults": 3,
            "articles": [
                {
                    "source": {"id": null, "name": "The Tribune"},
                    "author": "Tribune News Service",
                    "title": "Amritsar airport adds flights",
                    "url": "https://tribune.test/amritsar",
                    "publishedAt": "2024-11-02T10:00:00Z"
                },
                {
                    "source": {"id": null, "name": "[Removed]"},
                    "author": null,
                    "title": "[Removed]",
                    "url": "https://removed.com"
                },
                {"title": "no url here"}
            ]
        })
    }

    async fn provider() -> String {
        let router = Router::new()
            .route(
                "/v2/everything",
                get(|headers: HeaderMap, Query(params): Query<HashMap<String, String>>| async move {
                    let key = headers
                        .get("x-api-key")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("");
                    if key == "limited" {
                        return (
                            AxumStatus::TOO_MANY_REQUESTS,
                            Json(json!({"status": "error", "code": "rateLimited", "message": "too many"})),
                        );
                    }
                    if key != GOOD_KEY {
                        return (
                            AxumStatus::UNAUTHORIZED,
                            Json(json!({"status": "error", "code": "apiKeyInvalid", "message": "bad key"})),
                        );
                    }
                    if params.get("q").map(String::as_str) != Some("Punjab floods") {
                        return (AxumStatus::BAD_REQUEST, Json(json!({"status": "error"})));
                    }
                    (AxumStatus::OK, Json(sample_body()))
                }),
            )
            .route(
                "/v2/top-headlines",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    let country = params.get("country").cloned().unwrap_or_default();
                    Json(json!({
                        "status": "ok",
                        "articles": [{"url": format!("https://top.test/{country}"), "title": "Top"}]
                    }))
                }),
            );
        spawn_server(router).await
    }

    fn client(base: &str, keys: &[&str]) -> NewsSearchClient {
        let config = NewsApiConfig {
            base_url: base.to_string(),
            timeout_secs: 5,
            ..NewsApiConfig::default()
        };
        let rotator = CredentialRotator::with_start(
            PROVIDER,
            keys.iter().map(|k| k.to_string()).collect(),
            RotationPolicy::immediate(),
            0,
        )
        .unwrap();
        NewsSearchClient::new(&config, Arc::new(rotator)).unwrap()
    }

    #[tokio::test]
    async fn test_everything_rotates_past_bad_keys() {
        let base = provider().await;
        let news = client(&base, &["bad-key", "limited", GOOD_KEY]);

        let articles = news.everything("Punjab floods").await.unwrap();

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Amritsar airport adds flights");
        assert_eq!(articles[0].author.as_deref(), Some("Tribune News Service"));
        assert_eq!(articles[0].extra["source"]["name"], "The Tribune");
        assert_eq!(news.rotator.cursor(), 2);
    }

    #[tokio::test]
    async fn test_all_keys_bad_is_exhausted() {
        let base = provider().await;
        let news = client(&base, &["bad-1", "bad-2"]);

        let err = news.everything("Punjab floods").await.unwrap_err();
        assert!(matches!(err, Error::ExhaustedCredentials { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_blank_query_uses_top_headlines() {
        let base = provider().await;
        let news = client(&base, &[GOOD_KEY]);

        let articles = news.search(Some("   ")).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].url, "https://top.test/in");
    }

    #[test]
    fn test_parse_rate_limited_code() {
        let body = r#"{"status":"error","code":"rateLimited","message":"You have made too many requests"}"#;
        let err = parse_response(StatusCode::OK, body).unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_parse_error_status() {
        let body = r#"{"status":"error","code":"apiKeyDisabled","message":"disabled"}"#;
        let err = parse_response(StatusCode::UNAUTHORIZED, body).unwrap_err();
        match err {
            Error::Provider { status, message, .. } => {
                assert_eq!(status, 401);
                assert_eq!(message, "apiKeyDisabled: disabled");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let config = NewsApiConfig {
            base_url: "not a url".to_string(),
            ..NewsApiConfig::default()
        };
        let rotator =
            CredentialRotator::with_start(PROVIDER, vec!["k".into()], RotationPolicy::immediate(), 0).unwrap();
        let err = NewsSearchClient::new(&config, Arc::new(rotator)).unwrap_err();
        assert!(matches!(err, Error::Url(_)));
    }
}
