//! Tavily-compatible search: backend query, optional raw-content
//! enrichment and positional scoring, memoized per request shape.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backends::{BackendHit, SearchBackend};
use crate::cache::TtlCache;
use crate::data_models::{SearchQuery, SearchResponse, SearchResult};
use crate::error::ServiceError;
use crate::extractor::{ExtractOptions, ExtractService, failure_summary};
use crate::normalizer::truncate_content;

/// Whole-response cache, keyed by `(query, max_results, include_raw_content)`.
pub type ResponseCache = TtlCache<(String, usize, bool), SearchResponse>;

/// Linear decay by backend position. Goes negative past index 18.
pub fn score_for_rank(index: usize) -> f64 {
    0.9 - 0.05 * index as f64
}

pub struct SearchService {
    backend: Arc<dyn SearchBackend>,
    extractor: Arc<ExtractService>,
    cache: Arc<ResponseCache>,
    scraper_timeout: Duration,
    max_content_length: usize,
}

impl SearchService {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        extractor: Arc<ExtractService>,
        cache: Arc<ResponseCache>,
        scraper_timeout: Duration,
        max_content_length: usize,
    ) -> Self {
        SearchService {
            backend,
            extractor,
            cache,
            scraper_timeout,
            max_content_length,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, ServiceError> {
        query.validate()?;

        let key = (
            query.query.clone(),
            query.max_results,
            query.include_raw_content,
        );
        if let Some(cached) = self.cache.get(&key).await {
            tracing::debug!("Serving cached search response for: {}", query.query);
            return Ok(cached);
        }

        let start = Instant::now();
        tracing::info!("Search request ({}): {}", self.backend.name(), query.query);

        let mut hits = self.backend.search(&query.query, query.max_results).await?;
        hits.truncate(query.max_results);

        let raw_contents = if query.include_raw_content {
            self.fetch_raw_contents(&hits).await
        } else {
            HashMap::new()
        };

        let results: Vec<SearchResult> = hits
            .into_iter()
            .enumerate()
            .filter_map(|(index, hit)| {
                let url = hit.url?;
                Some(SearchResult {
                    raw_content: raw_contents.get(&url).cloned(),
                    url,
                    title: hit.title,
                    content: hit.content,
                    score: score_for_rank(index),
                })
            })
            .collect();

        let response = SearchResponse {
            query: query.query.clone(),
            follow_up_questions: None,
            answer: None,
            images: Vec::new(),
            results,
            response_time: start.elapsed().as_secs_f64(),
            request_id: uuid::Uuid::new_v4().to_string(),
        };
        tracing::info!(
            "Search completed: {} results in {:.2}s",
            response.results.len(),
            response.response_time
        );

        self.cache.set(key, &response).await;
        Ok(response)
    }

    /// Raw content per URL for the hits that have one. Never fails: URLs
    /// that could not be fetched are simply absent.
    async fn fetch_raw_contents(&self, hits: &[BackendHit]) -> HashMap<String, String> {
        let urls: Vec<String> = hits.iter().filter_map(|h| h.url.clone()).collect();
        if urls.is_empty() {
            return HashMap::new();
        }

        let options = ExtractOptions::for_search(self.scraper_timeout);
        let outcome = self.extractor.extract_batch(&urls, &options).await;

        let mut contents = HashMap::new();
        let mut empty = 0usize;
        for result in outcome.results {
            match result.raw_content {
                Some(body) => {
                    contents.insert(result.url, truncate_content(&body, self.max_content_length));
                }
                None => empty += 1,
            }
        }

        tracing::info!(
            "Raw content scraping: {}/{} successful, {} failed ({} empty). Errors: {}",
            contents.len(),
            urls.len(),
            urls.len() - contents.len(),
            empty,
            failure_summary(&outcome.failures)
        );
        contents
    }
}
