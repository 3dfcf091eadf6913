//! HTTP API.
//!
//! - `POST /summarize-news`: `{articles, query, targetCount?, batchSize?}` ->
//!   summarized articles relevant to the queried state
//! - `GET /news?q=...`: article references from the news search provider
//! - `GET /health`
//!
//! Exhausted provider credentials map to a 500 with a generic error body;
//! nothing about keys or upstream replies leaks to clients.

use crate::config::PipelineConfig;
use crate::error::Error;
use crate::fetcher::ContentSource;
use crate::models::{ArticleReference, SummarizeRequest, SummarizedArticle};
use crate::newsapi::NewsSearchClient;
use crate::pipeline::BatchPipeline;
use crate::summarize::ArticleSummarizer;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

pub struct AppState<F, S> {
    pub pipeline: BatchPipeline<F, S>,
    /// Absent when no news search keys are configured.
    pub news: Option<NewsSearchClient>,
    pub defaults: PipelineConfig,
}

/// An error response: status plus a `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// Log the real cause, hand the client a generic message.
    fn internal(cause: &Error, public: &str) -> Self {
        error!(error = %cause, "Request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: public.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct NewsQuery {
    pub q: Option<String>,
}

pub fn create_router<F, S>(state: AppState<F, S>) -> Router
where
    F: ContentSource + Send + Sync + 'static,
    S: ArticleSummarizer + Send + Sync + 'static,
{
    Router::new()
        .route("/summarize-news", post(summarize_news::<F, S>))
        .route("/news", get(search_news::<F, S>))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Bind `listen_addr` and serve until Ctrl-C.
pub async fn serve<F, S>(listen_addr: &str, state: AppState<F, S>) -> crate::error::Result<()>
where
    F: ContentSource + Send + Sync + 'static,
    S: ArticleSummarizer + Send + Sync + 'static,
{
    let addr: SocketAddr = listen_addr
        .parse()
        .map_err(|e| Error::Config(format!("invalid listen address {listen_addr:?}: {e}")))?;
    let listener = TcpListener::bind(addr).await?;
    info!("Server is running on http://{}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn summarize_news<F, S>(
    State(state): State<Arc<AppState<F, S>>>,
    Json(request): Json<SummarizeRequest>,
) -> Result<Json<Vec<SummarizedArticle>>, ApiError>
where
    F: ContentSource + Send + Sync + 'static,
    S: ArticleSummarizer + Send + Sync + 'static,
{
    let query = request.query.trim();
    info!(query, articles = request.articles.len(), "Request received");
    if query.is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }
    let (target_count, batch_size) = state
        .defaults
        .bounded(request.target_count, request.batch_size);
    if target_count == 0 || batch_size == 0 {
        return Err(ApiError::bad_request("targetCount and batchSize must be at least 1"));
    }
    if request.target_count.is_some_and(|n| n > target_count)
        || request.batch_size.is_some_and(|n| n > batch_size)
    {
        warn!(
            requested_target = ?request.target_count,
            requested_batch = ?request.batch_size,
            target_count,
            batch_size,
            "Request exceeded configured limits; clamping"
        );
    }

    let summarized = state
        .pipeline
        .run(&request.articles, query, target_count, batch_size)
        .await
        .map_err(|e| ApiError::internal(&e, "Failed to summarize news"))?;
    info!(returned = summarized.len(), "Returning summarized articles");
    Ok(Json(summarized))
}

#[instrument(level = "info", skip_all)]
async fn search_news<F, S>(
    State(state): State<Arc<AppState<F, S>>>,
    Query(params): Query<NewsQuery>,
) -> Result<Json<Vec<ArticleReference>>, ApiError>
where
    F: ContentSource + Send + Sync + 'static,
    S: ArticleSummarizer + Send + Sync + 'static,
{
    info!(q = ?params.q, "News search requested");
    let Some(news) = state.news.as_ref() else {
        return Err(ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "news search is not configured".to_string(),
        });
    };
    let articles = news
        .search(params.q.as_deref())
        .await
        .map_err(|e| ApiError::internal(&e, "Failed to fetch news"))?;
    Ok(Json(articles))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
