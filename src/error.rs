//! Crate-wide error type.
//!
//! Every provider call, scrape, and config load reports failures through
//! [`Error`]. Soft outcomes (empty content, malformed or irrelevant model
//! output) are not errors and never appear here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Every credential for a provider failed in one full rotation pass.
    #[error("all {attempts} credentials for {provider} failed")]
    ExhaustedCredentials { provider: String, attempts: usize },

    #[error("{provider} rate limited the request: {detail}")]
    RateLimited { provider: String, detail: String },

    #[error("{provider} returned HTTP {status}: {message}")]
    Provider {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the failure means "slow down" rather than "this key is bad".
    ///
    /// The rotator inserts a short delay before trying the next credential
    /// when this holds.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Error::RateLimited { .. } => true,
            Error::Provider {
                status, message, ..
            } => *status == 429 || mentions_quota(message),
            Error::Http(e) => e.status().is_some_and(|s| s.as_u16() == 429),
            _ => false,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Error::ExhaustedCredentials { .. })
    }
}

/// Provider error bodies that signal quota or rate limiting.
pub fn mentions_quota(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("quota")
        || lower.contains("resource_exhausted")
        || lower.contains("rate limit")
        || lower.contains("ratelimited")
        || lower.contains("too many requests")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_variant() {
        let e = Error::RateLimited {
            provider: "gemini".into(),
            detail: "slow down".into(),
        };
        assert!(e.is_rate_limited());
        assert!(!e.is_exhausted());
    }

    #[test]
    fn test_provider_429_is_rate_limited() {
        let e = Error::Provider {
            provider: "newsapi".into(),
            status: 429,
            message: "".into(),
        };
        assert!(e.is_rate_limited());
    }

    #[test]
    fn test_provider_quota_message_is_rate_limited() {
        let e = Error::Provider {
            provider: "gemini".into(),
            status: 400,
            message: "Quota exceeded for metric generate_content".into(),
        };
        assert!(e.is_rate_limited());
    }

    #[test]
    fn test_plain_provider_failure_is_not_rate_limited() {
        let e = Error::Provider {
            provider: "gemini".into(),
            status: 401,
            message: "API key not valid".into(),
        };
        assert!(!e.is_rate_limited());
        assert!(!Error::Config("x".into()).is_rate_limited());
    }

    #[test]
    fn test_exhausted_display() {
        let e = Error::ExhaustedCredentials {
            provider: "gemini".into(),
            attempts: 4,
        };
        assert!(e.is_exhausted());
        assert_eq!(e.to_string(), "all 4 credentials for gemini failed");
    }
}
