//! Google Custom Search backend.
//!
//! Calls are serialized and retried through a [`RetryExecutor`]; every retry
//! builds a new HTTP client so a poisoned connection is never reused.
//! Successful API responses are cached by normalized query and result
//! count, so requests that differ only in `include_raw_content` share them.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{BackendHit, SearchBackend};
use crate::cache::TtlCache;
use crate::error::{ServiceError, UpstreamError, describe_reqwest_error};
use crate::http::build_client;
use crate::retry::{Attempt, RetryExecutor, RetryPolicy};

/// The API never returns more than ten items per page.
const MAX_PAGE_SIZE: usize = 10;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CseResponse {
    #[serde(default)]
    pub items: Vec<CseItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CseItem {
    pub link: Option<String>,
    pub title: Option<String>,
    pub snippet: Option<String>,
}

/// API result cache, keyed by `(lowercased trimmed query, max_results)`.
pub type GoogleCache = TtlCache<(String, usize), CseResponse>;

pub struct GoogleBackend {
    api_key: Option<String>,
    cse_id: Option<String>,
    endpoint: String,
    user_agent: String,
    executor: RetryExecutor,
    session: Mutex<Option<reqwest::Client>>,
    cache: Arc<GoogleCache>,
}

impl GoogleBackend {
    pub fn new(
        api_key: Option<String>,
        cse_id: Option<String>,
        base_url: &str,
        user_agent: &str,
        policy: RetryPolicy,
        cache: Arc<GoogleCache>,
    ) -> Self {
        GoogleBackend {
            api_key,
            cse_id,
            endpoint: format!("{}/customsearch/v1", base_url.trim_end_matches('/')),
            user_agent: user_agent.to_string(),
            executor: RetryExecutor::new(policy),
            session: Mutex::new(None),
            cache,
        }
    }

    fn credentials(&self) -> Result<(&str, &str), UpstreamError> {
        match (self.api_key.as_deref(), self.cse_id.as_deref()) {
            (Some(key), Some(cx)) => Ok((key, cx)),
            _ => Err(UpstreamError::NotConfigured(
                "Google API not configured. Set GOOGLE_API_KEY and GOOGLE_CSE_ID.".to_string(),
            )),
        }
    }

    /// The cached client, or a new one when `fresh` is set or none exists.
    fn session(&self, fresh: bool) -> Result<reqwest::Client, UpstreamError> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| UpstreamError::Call("session lock poisoned".to_string()))?;
        if fresh || session.is_none() {
            let client = build_client(&self.user_agent, Some(REQUEST_TIMEOUT))
                .map_err(|e| UpstreamError::Call(describe_reqwest_error(&e)))?;
            *session = Some(client);
        }
        session
            .clone()
            .ok_or_else(|| UpstreamError::Call("no http session".to_string()))
    }

    fn reset_session(&self) {
        if let Ok(mut session) = self.session.lock() {
            *session = None;
        }
    }

    async fn call_api(
        &self,
        query: &str,
        num: usize,
        attempt: Attempt,
    ) -> Result<CseResponse, UpstreamError> {
        let (key, cx) = self.credentials()?;
        let client = self.session(attempt.fresh_connection)?;
        let num = num.to_string();

        let response = client
            .get(&self.endpoint)
            .query(&[("key", key), ("cx", cx), ("q", query), ("num", num.as_str())])
            .send()
            .await
            .map_err(|e| UpstreamError::Call(describe_reqwest_error(&e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Call(format!(
                "HTTP {} {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or_default(),
                body.trim()
            )));
        }

        response
            .json::<CseResponse>()
            .await
            .map_err(|e| UpstreamError::Call(describe_reqwest_error(&e.without_url())))
    }

    async fn fetch(&self, query: &str, max_results: usize) -> Result<CseResponse, ServiceError> {
        let key = (query.trim().to_lowercase(), max_results);
        if let Some(cached) = self.cache.get(&key).await {
            tracing::debug!(
                "Cache hit for Google search: query={}, max_results={}",
                query,
                max_results
            );
            return Ok(cached);
        }

        let num = max_results.min(MAX_PAGE_SIZE);
        let data = self
            .executor
            .execute(
                |attempt| self.call_api(query, num, attempt),
                || self.reset_session(),
            )
            .await
            .map_err(|e| {
                tracing::error!("Google API error: {e}");
                map_upstream_error(e)
            })?;

        self.cache.set(key, &data).await;
        tracing::debug!(
            "Cached Google search results: query={}, max_results={}",
            query,
            max_results
        );
        Ok(data)
    }
}

/// Maps an exhausted or fatal upstream failure to what the caller sees.
pub fn map_upstream_error(err: UpstreamError) -> ServiceError {
    let message = match err {
        UpstreamError::NotConfigured(message) => return ServiceError::NotConfigured(message),
        UpstreamError::Call(message) => message,
    };

    if message.contains("403") || message.contains("Forbidden") {
        ServiceError::UpstreamAuth("Google API authentication failed. Check your API key.".to_string())
    } else if message.contains("429") || message.contains("Rate Limit") || message.contains("Quota") {
        ServiceError::RateLimited("Google API rate limit exceeded after retries".to_string())
    } else if message.contains("400") || message.contains("Invalid") {
        ServiceError::BadUpstreamRequest(format!("Invalid Google API request: {message}"))
    } else {
        ServiceError::Unavailable("Google search service unavailable".to_string())
    }
}

#[async_trait]
impl SearchBackend for GoogleBackend {
    fn name(&self) -> &str {
        "google"
    }

    fn is_available(&self) -> bool {
        self.credentials().is_ok()
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<BackendHit>, ServiceError> {
        let data = self.fetch(query, max_results).await?;
        Ok(data
            .items
            .into_iter()
            .map(|item| BackendHit {
                url: item.link.filter(|u| !u.is_empty()),
                title: item.title.unwrap_or_default(),
                content: item.snippet.unwrap_or_default(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_maps_to_auth_failure() {
        let err = map_upstream_error(UpstreamError::Call("HTTP 403 Forbidden: {}".into()));
        assert!(matches!(err, ServiceError::UpstreamAuth(_)));
    }

    #[test]
    fn exhausted_rate_limit_maps_to_429() {
        let err = map_upstream_error(UpstreamError::Call(
            "HTTP 429 Too Many Requests: Quota exceeded".into(),
        ));
        assert!(matches!(err, ServiceError::RateLimited(_)));
    }

    #[test]
    fn invalid_request_echoes_upstream_text() {
        let err = map_upstream_error(UpstreamError::Call(
            "HTTP 400 Bad Request: Invalid Value".into(),
        ));
        assert_eq!(
            err,
            ServiceError::BadUpstreamRequest(
                "Invalid Google API request: HTTP 400 Bad Request: Invalid Value".into()
            )
        );
    }

    #[test]
    fn unknown_failure_is_unavailable() {
        let err = map_upstream_error(UpstreamError::Call("HTTP 503 Service Unavailable: ".into()));
        assert!(matches!(err, ServiceError::Unavailable(_)));
    }

    #[test]
    fn missing_credentials_not_available() {
        let backend = GoogleBackend::new(
            Some("key".into()),
            None,
            "https://www.googleapis.com",
            "TestBot/1.0",
            RetryPolicy::default(),
            Arc::new(GoogleCache::new(4, Duration::from_secs(60))),
        );
        assert!(!backend.is_available());
        assert_eq!(backend.endpoint, "https://www.googleapis.com/customsearch/v1");
    }
}
