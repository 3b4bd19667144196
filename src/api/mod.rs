use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::backends::{GoogleBackend, GoogleCache, SearchBackend, SearxngBackend};
use crate::cache::TtlCache;
use crate::config::{BackendKind, Config};
use crate::crawler::{BrowserSettings, HttpPageExtractor, PageExtractor, RemoteCrawlerExtractor};
use crate::extractor::{ExtractService, ExtractSettings};
use crate::http::build_client;
use crate::pdf::PdfExtractText;
use crate::retry::RetryPolicy;
use crate::search::{ResponseCache, SearchService};

pub mod handlers;
pub mod models;

#[derive(Clone)]
pub struct AppState {
    pub search: Arc<SearchService>,
    pub extract: Arc<ExtractService>,
}

impl AppState {
    /// Builds every service once. Both caches are created here and handed
    /// to the services that use them.
    pub fn from_config(config: &Config) -> Result<AppState, reqwest::Error> {
        let client = build_client(&config.scraper_user_agent, None)?;

        let page_extractor: Arc<dyn PageExtractor> = match &config.crawler_url {
            Some(crawler_url) => {
                tracing::info!("Using remote crawler at {crawler_url}");
                let browser = BrowserSettings {
                    headless: config.browser_headless,
                    user_agent: config.scraper_user_agent.clone(),
                    extra_headers: config.browser_extra_headers.clone(),
                    cookies: config.browser_cookies.clone(),
                    use_persistent_context: config.browser_use_persistent_context,
                };
                Arc::new(RemoteCrawlerExtractor::new(client.clone(), crawler_url, browser))
            }
            None => {
                tracing::info!("No CRAWLER_URL set, using built-in HTTP extractor");
                Arc::new(HttpPageExtractor::new(client.clone()))
            }
        };

        let extract = Arc::new(ExtractService::new(
            page_extractor,
            Arc::new(PdfExtractText),
            client.clone(),
            ExtractSettings::from_config(config),
        ));

        let backend: Arc<dyn SearchBackend> = match config.search_backend {
            BackendKind::Google => {
                tracing::info!("Using Google Custom Search API as search backend");
                let api_cache = Arc::new(
                    GoogleCache::new(config.search_cache_max_entries, config.search_cache_ttl)
                        .with_lock_timeout(config.cache_lock_timeout),
                );
                let policy = RetryPolicy {
                    max_retries: config.google_max_retries,
                    base_delay: config.google_retry_base_delay,
                    max_concurrency: config.google_max_concurrency,
                };
                Arc::new(GoogleBackend::new(
                    config.google_api_key.clone(),
                    config.google_cse_id.clone(),
                    &config.google_api_url,
                    &config.scraper_user_agent,
                    policy,
                    api_cache,
                ))
            }
            BackendKind::Searxng => {
                tracing::info!("Using SearXNG as search backend ({})", config.searxng_url);
                Arc::new(SearxngBackend::new(
                    client,
                    &config.searxng_url,
                    &config.search_engines,
                ))
            }
        };
        if !backend.is_available() {
            tracing::warn!(
                "Search backend {} is not fully configured; /search will fail",
                backend.name()
            );
        }

        let response_cache: Arc<ResponseCache> = Arc::new(
            TtlCache::new(
                config.search_response_cache_max_entries,
                config.search_response_cache_ttl,
            )
            .with_lock_timeout(config.cache_lock_timeout),
        );

        let search = Arc::new(SearchService::new(
            backend,
            extract.clone(),
            response_cache,
            config.scraper_timeout,
            config.scraper_max_length,
        ));

        Ok(AppState { search, extract })
    }
}

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search", post(handlers::search_handler))
        .route("/extract", post(handlers::extract_handler))
        .route("/health", get(handlers::health_handler))
        .route("/robots.txt", get(handlers::robots_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
