use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ServiceError;

fn default_max_results() -> usize {
    10
}

/// A `/search` request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub include_raw_content: bool,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, max_results: usize, include_raw_content: bool) -> Self {
        SearchQuery {
            query: query.into(),
            max_results,
            include_raw_content,
        }
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.query.trim().is_empty() {
            return Err(ServiceError::InvalidRequest(
                "Query cannot be empty".to_string(),
            ));
        }
        if self.max_results == 0 {
            return Err(ServiceError::InvalidRequest(
                "max_results must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub content: String,
    pub score: f64,
    pub raw_content: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchResponse {
    pub query: String,
    pub follow_up_questions: Option<Vec<String>>,
    pub answer: Option<String>,
    pub images: Vec<String>,
    pub results: Vec<SearchResult>,
    pub response_time: f64,
    pub request_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    #[default]
    Basic,
    Advanced,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Text,
}

/// A validated `/extract` request. The API layer coerces the loose wire
/// shape (single string or list of URLs) into this.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractRequest {
    pub urls: Vec<String>,
    pub include_images: bool,
    pub include_favicon: bool,
    pub include_links: bool,
    pub depth: Depth,
    pub format: Option<OutputFormat>,
    pub timeout: Option<f64>,
}

impl ExtractRequest {
    pub fn new(urls: Vec<String>) -> Self {
        ExtractRequest {
            urls,
            include_images: false,
            include_favicon: false,
            include_links: false,
            depth: Depth::Basic,
            format: None,
            timeout: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ImageInfo {
    pub url: String,
    pub description: Option<String>,
    pub score: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExtractResult {
    pub url: String,
    pub title: Option<String>,
    pub language: Option<String>,
    pub raw_content: Option<String>,
    pub images: Vec<ImageInfo>,
    pub favicon: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

/// A URL that could not be extracted, with a stable error code.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub url: String,
    pub error: String,
}

impl FailureRecord {
    pub fn new(url: impl Into<String>, error: impl Into<String>) -> Self {
        FailureRecord {
            url: url.into(),
            error: error.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExtractResponse {
    pub request_id: String,
    pub response_time: f64,
    pub results: Vec<ExtractResult>,
    pub failed_results: Vec<FailureRecord>,
}
