//! Hosted generative model client (Gemini `generateContent`).
//!
//! [`GenerativeModel`] is the seam the summarization client talks to: one
//! prompt in, the model's raw text out, using whichever API key the
//! credential rotator hands over. [`GeminiModel`] is the REST
//! implementation; tests substitute in-memory fakes.

use crate::config::GeminiConfig;
use crate::error::{Error, Result, mentions_quota};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

pub const PROVIDER: &str = "gemini";

/// A text-in, text-out generative model keyed per call.
pub trait GenerativeModel {
    fn generate(&self, api_key: &str, prompt: &str)
    -> impl Future<Output = Result<String>> + Send;
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
}

#[derive(Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Deserialize)]
struct GeminiPartResponse {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct GeminiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Clone)]
pub struct GeminiModel {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiModel {
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url,
            urlencoding::encode(&self.model)
        )
    }
}

impl GenerativeModel for GeminiModel {
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn generate(&self, api_key: &str, prompt: &str) -> Result<String> {
        let t0 = Instant::now();
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: self.max_output_tokens,
                temperature: self.temperature,
            },
        };

        // Key goes in a header; transport errors are stripped of their URL.
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(e.without_url()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(e.without_url()))?;
        let elapsed_ms = t0.elapsed().as_millis() as u64;

        let text = parse_response(status, &body)?;
        debug!(elapsed_ms, chars = text.len(), "Model responded");
        Ok(text)
    }
}

/// Classify a `generateContent` reply and pull out the first candidate's text.
fn parse_response(status: StatusCode, body: &str) -> Result<String> {
    let parsed: Option<GeminiResponse> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|r| r.error.as_ref());
    let message = error
        .map(|e| format!("{} {}", e.status, e.message).trim().to_string())
        .unwrap_or_else(|| crate::utils::truncate_for_log(body, 200));

    if status == StatusCode::TOO_MANY_REQUESTS || (error.is_some() && mentions_quota(&message)) {
        warn!(status = status.as_u16(), %message, "Model rate limited");
        return Err(Error::RateLimited {
            provider: PROVIDER.to_string(),
            detail: message,
        });
    }
    if !status.is_success() || error.is_some() {
        return Err(Error::Provider {
            provider: PROVIDER.to_string(),
            status: status.as_u16(),
            message,
        });
    }

    let text: String = parsed
        .and_then(|r| r.candidates)
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(Error::Provider {
            provider: PROVIDER.to_string(),
            status: status.as_u16(),
            message: "response contained no candidate text".to_string(),
        });
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{dead_address, spawn_server};
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    fn config(base_url: &str) -> GeminiConfig {
        GeminiConfig {
            base_url: base_url.to_string(),
            keys: vec![],
            timeout_secs: 5,
            ..GeminiConfig::default()
        }
    }

    #[test]
    fn test_parse_success() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]}}]}"#;
        assert_eq!(parse_response(StatusCode::OK, body).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_parse_429_is_rate_limited() {
        let body = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = parse_response(StatusCode::TOO_MANY_REQUESTS, body).unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_parse_quota_message_in_error_body() {
        let body = r#"{"error":{"code":400,"message":"Quota exceeded for this key","status":"FAILED_PRECONDITION"}}"#;
        let err = parse_response(StatusCode::BAD_REQUEST, body).unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));
    }

    #[test]
    fn test_parse_invalid_key() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        let err = parse_response(StatusCode::BAD_REQUEST, body).unwrap_err();
        assert!(matches!(err, Error::Provider { status: 400, .. }));
        assert!(!err.is_rate_limited());
    }

    #[test]
    fn test_parse_empty_candidates() {
        let err = parse_response(StatusCode::OK, r#"{"candidates":[]}"#).unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
        let err = parse_response(StatusCode::OK, "not json").unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
    }

    #[tokio::test]
    async fn test_generate_sends_prompt_and_key() {
        let router = Router::new().route(
            "/v1beta/models/:model",
            post(
                |headers: HeaderMap, Json(body): Json<Value>| async move {
                    let prompt = body["contents"][0]["parts"][0]["text"]
                        .as_str()
                        .unwrap_or("")
                        .to_string();
                    let key = headers
                        .get("x-goog-api-key")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    Json(json!({
                        "candidates": [{"content": {"parts": [{"text": format!("{key}:{prompt}")}]}}]
                    }))
                },
            ),
        );
        let base = spawn_server(router).await;
        let model = GeminiModel::new(&config(&base)).unwrap();

        let text = model.generate("key-1", "hello").await.unwrap();
        assert_eq!(text, "key-1:hello");
    }

    #[tokio::test]
    async fn test_generate_maps_429() {
        let router = Router::new().route(
            "/v1beta/models/:model",
            post(|| async {
                (
                    axum::http::StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({"error": {"code": 429, "message": "slow down", "status": "RESOURCE_EXHAUSTED"}})),
                )
            }),
        );
        let base = spawn_server(router).await;
        let model = GeminiModel::new(&config(&base)).unwrap();

        let err = model.generate("key-1", "hello").await.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_network_error_does_not_expose_key() {
        let base = dead_address().await;
        let model = GeminiModel::new(&config(&base)).unwrap();

        let err = model.generate("AIzaSECRETKEY9876", "hi").await.unwrap_err();
        assert!(matches!(err, Error::Http(_)));
        let text = err.to_string();
        assert!(!text.contains("AIzaSECRETKEY9876"), "key leaked: {text}");
        assert!(!format!("{err:?}").contains("AIzaSECRETKEY9876"));
    }
}
