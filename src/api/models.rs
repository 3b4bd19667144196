use serde::{Deserialize, Serialize};

use crate::data_models::{Depth, ExtractRequest, OutputFormat};

/// `urls` may be a single string or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum UrlList {
    One(String),
    Many(Vec<String>),
}

impl UrlList {
    /// Trimmed, non-blank URLs in request order.
    pub fn normalize(self) -> Vec<String> {
        let urls = match self {
            UrlList::One(url) => vec![url],
            UrlList::Many(urls) => urls,
        };
        urls.into_iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequestBody {
    pub urls: UrlList,
    #[serde(default)]
    pub include_images: bool,
    #[serde(default)]
    pub include_favicon: bool,
    #[serde(default)]
    pub include_links: bool,
    #[serde(default, alias = "depth")]
    pub extract_depth: Depth,
    #[serde(default)]
    pub format: Option<OutputFormat>,
    #[serde(default)]
    pub timeout: Option<f64>,
}

impl From<ExtractRequestBody> for ExtractRequest {
    fn from(body: ExtractRequestBody) -> Self {
        ExtractRequest {
            urls: body.urls.normalize(),
            include_images: body.include_images,
            include_favicon: body.include_favicon,
            include_links: body.include_links,
            depth: body.extract_depth,
            format: body.format,
            timeout: body.timeout,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}
