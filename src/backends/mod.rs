//! Search providers behind a single trait, selected at startup.

use async_trait::async_trait;

use crate::error::ServiceError;

pub mod google;
pub mod searxng;

pub use google::{GoogleBackend, GoogleCache};
pub use searxng::SearxngBackend;

/// One backend result, before scoring. Entries without a URL are kept so
/// that positions stay stable; the search service skips them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendHit {
    pub url: Option<String>,
    pub title: String,
    pub content: String,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the backend has everything it needs to answer a query.
    fn is_available(&self) -> bool;

    /// Returns hits in backend order. May return more than `max_results`.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<BackendHit>, ServiceError>;
}
