//! SearXNG meta-search backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{BackendHit, SearchBackend};
use crate::error::ServiceError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_BODY_LOG_LIMIT: usize = 500;

pub struct SearxngBackend {
    client: Client,
    base_url: String,
    engines: String,
    timeout: Duration,
}

impl SearxngBackend {
    pub fn new(client: Client, base_url: &str, engines: &str) -> Self {
        SearxngBackend {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            engines: engines.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngResult>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    url: Option<String>,
    title: Option<String>,
    content: Option<String>,
}

fn map_transport_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout("SearXNG timeout".to_string())
    } else if err.is_connect() || err.is_request() {
        tracing::error!("SearXNG connection error: {err}");
        ServiceError::Unreachable("Cannot connect to search service".to_string())
    } else {
        tracing::error!("SearXNG error: {err}");
        ServiceError::Unavailable("Search service unavailable".to_string())
    }
}

#[async_trait]
impl SearchBackend for SearxngBackend {
    fn name(&self) -> &str {
        "searxng"
    }

    fn is_available(&self) -> bool {
        !self.base_url.is_empty()
    }

    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<BackendHit>, ServiceError> {
        let params = [
            ("q", query),
            ("format", "json"),
            ("categories", "general"),
            ("engines", self.engines.as_str()),
            ("pageno", "1"),
            ("language", "auto"),
            ("safesearch", "1"),
        ];

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("X-Forwarded-For", "127.0.0.1")
            .header("X-Real-IP", "127.0.0.1")
            .form(&params)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(ERROR_BODY_LOG_LIMIT).collect();
            tracing::error!("SearXNG returned {}: {}", status.as_u16(), snippet);
            return Err(ServiceError::UpstreamStatus(status.as_u16()));
        }

        let body: SearxngResponse = response.json().await.map_err(map_transport_error)?;
        Ok(body
            .results
            .into_iter()
            .map(|r| BackendHit {
                url: r.url.filter(|u| !u.is_empty()),
                title: r.title.unwrap_or_default(),
                content: r.content.unwrap_or_default(),
            })
            .collect())
    }
}
