//! Concurrent content extraction for `/extract` and for search enrichment.
//!
//! Each URL is routed to the PDF pipeline or to the page extractor, runs
//! under its own deadline and ends up in exactly one of the result or
//! failure lists. Both lists keep the order the URLs were given in.

use futures::future::join_all;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::crawler::{PageExtractor, RunConfig};
use crate::data_models::{
    Depth, ExtractRequest, ExtractResponse, ExtractResult, FailureRecord, OutputFormat,
};
use crate::error::ServiceError;
use crate::normalizer;
use crate::pdf::{self, PdfLimits, PdfTextExtractor};

/// Extra time the orchestrator grants the page extractor on top of the
/// page timeout it was handed.
const ORCHESTRATION_GRACE: Duration = Duration::from_secs(2);

/// A request `timeout` is capped at this multiple of the advanced default.
const TIMEOUT_CEILING_FACTOR: u32 = 4;

#[derive(Debug, Clone)]
pub struct ExtractSettings {
    pub max_urls: usize,
    pub timeout_basic: Duration,
    pub timeout_advanced: Duration,
    pub default_format: OutputFormat,
    pub max_concurrency: usize,
    pub pdf_max_pages: usize,
    pub pdf_max_bytes: u64,
}

impl ExtractSettings {
    pub fn from_config(config: &Config) -> Self {
        ExtractSettings {
            max_urls: config.extract_max_urls,
            timeout_basic: config.extract_timeout_basic,
            timeout_advanced: config.extract_timeout_advanced,
            default_format: config.extract_default_format,
            max_concurrency: config.extract_max_concurrency,
            pdf_max_pages: config.pdf_max_pages,
            pdf_max_bytes: config.pdf_max_size_bytes,
        }
    }
}

impl Default for ExtractSettings {
    fn default() -> Self {
        ExtractSettings::from_config(&Config::default())
    }
}

/// Resolved per-batch options: every URL in a batch shares them.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub format: OutputFormat,
    pub include_images: bool,
    pub include_favicon: bool,
    pub include_links: bool,
    pub timeout: Duration,
    pub run_config: RunConfig,
}

impl ExtractOptions {
    /// Options used when fetching raw content for search results: markdown,
    /// no images, links kept.
    pub fn for_search(timeout: Duration) -> Self {
        ExtractOptions {
            format: OutputFormat::Markdown,
            include_images: false,
            include_favicon: false,
            include_links: true,
            timeout,
            run_config: RunConfig::for_search(timeout),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub results: Vec<ExtractResult>,
    pub failures: Vec<FailureRecord>,
}

enum UrlOutcome {
    Extracted(ExtractResult),
    Failed(FailureRecord),
}

pub struct ExtractService {
    extractor: Arc<dyn PageExtractor>,
    pdf_extractor: Arc<dyn PdfTextExtractor>,
    client: reqwest::Client,
    settings: ExtractSettings,
    limiter: Arc<Semaphore>,
}

impl ExtractService {
    /// `client` is used for PDF downloads only; pages go through `extractor`.
    pub fn new(
        extractor: Arc<dyn PageExtractor>,
        pdf_extractor: Arc<dyn PdfTextExtractor>,
        client: reqwest::Client,
        settings: ExtractSettings,
    ) -> Self {
        ExtractService {
            limiter: Arc::new(Semaphore::new(settings.max_concurrency.max(1))),
            extractor,
            pdf_extractor,
            client,
            settings,
        }
    }

    pub fn settings(&self) -> &ExtractSettings {
        &self.settings
    }

    pub fn timeout_ceiling(&self) -> Duration {
        self.settings
            .timeout_advanced
            .saturating_mul(TIMEOUT_CEILING_FACTOR)
    }

    pub async fn extract(&self, request: &ExtractRequest) -> Result<ExtractResponse, ServiceError> {
        let start = Instant::now();

        let urls: Vec<String> = request
            .urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .map(String::from)
            .collect();
        if urls.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "At least one URL is required".to_string(),
            ));
        }
        if urls.len() > self.settings.max_urls {
            return Err(ServiceError::InvalidRequest(format!(
                "Too many URLs. Max allowed: {}",
                self.settings.max_urls
            )));
        }

        let options = self.options_for(request);
        let outcome = self.extract_batch(&urls, &options).await;

        let response = ExtractResponse {
            request_id: uuid::Uuid::new_v4().to_string(),
            response_time: start.elapsed().as_secs_f64(),
            results: outcome.results,
            failed_results: outcome.failures,
        };
        tracing::info!(
            "Extracted {}/{} urls in {:.2}s (request {})",
            response.results.len(),
            urls.len(),
            response.response_time,
            response.request_id
        );
        Ok(response)
    }

    /// A missing, non-positive or unrepresentable `timeout` falls back to
    /// the depth default; anything else is capped.
    fn options_for(&self, request: &ExtractRequest) -> ExtractOptions {
        let depth_default = match request.depth {
            Depth::Basic => self.settings.timeout_basic,
            Depth::Advanced => self.settings.timeout_advanced,
        };
        let timeout = request
            .timeout
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .map(|t| t.min(self.timeout_ceiling()))
            .unwrap_or(depth_default);

        ExtractOptions {
            format: request.format.unwrap_or(self.settings.default_format),
            include_images: request.include_images,
            include_favicon: request.include_favicon,
            include_links: request.include_links,
            timeout,
            run_config: RunConfig::for_depth(request.depth, timeout),
        }
    }

    /// Extracts every URL concurrently. A failing URL never affects the
    /// others.
    pub async fn extract_batch(&self, urls: &[String], options: &ExtractOptions) -> BatchOutcome {
        let outcomes = join_all(urls.iter().map(|url| self.extract_one(url, options))).await;

        let mut batch = BatchOutcome::default();
        for outcome in outcomes {
            match outcome {
                UrlOutcome::Extracted(result) => batch.results.push(result),
                UrlOutcome::Failed(failure) => batch.failures.push(failure),
            }
        }
        batch
    }

    async fn extract_one(&self, url: &str, options: &ExtractOptions) -> UrlOutcome {
        let Ok(_permit) = self.limiter.acquire().await else {
            return UrlOutcome::Failed(FailureRecord::new(url, "crawl_failed"));
        };

        if pdf::is_pdf_url(url) {
            self.extract_pdf(url, options).await
        } else {
            self.extract_html(url, options).await
        }
    }

    async fn extract_pdf(&self, url: &str, options: &ExtractOptions) -> UrlOutcome {
        tracing::debug!("Extracting PDF: {url}");
        let limits = PdfLimits {
            timeout: options.timeout,
            max_bytes: self.settings.pdf_max_bytes,
            max_pages: self.settings.pdf_max_pages,
        };

        match pdf::extract_pdf(&self.client, self.pdf_extractor.clone(), url, limits).await {
            Ok(document) => {
                let text = normalizer::clean_markdown_noise(&document.text);
                let mut metadata = Map::new();
                metadata.insert("source".into(), json!("pdf"));
                metadata.insert("extractor".into(), json!(self.pdf_extractor.name()));
                metadata.insert("pages".into(), json!(document.pages));
                metadata.insert("pages_extracted".into(), json!(document.pages_extracted));

                UrlOutcome::Extracted(ExtractResult {
                    url: url.to_string(),
                    title: pdf::pdf_title_from_url(url),
                    language: None,
                    raw_content: (!text.is_empty()).then_some(text),
                    images: Vec::new(),
                    favicon: None,
                    metadata: Some(metadata),
                })
            }
            Err(e) => {
                tracing::warn!("PDF extraction failed for {url}: {e}");
                UrlOutcome::Failed(FailureRecord::new(url, e.to_string()))
            }
        }
    }

    async fn extract_html(&self, url: &str, options: &ExtractOptions) -> UrlOutcome {
        let deadline = options.timeout.saturating_add(ORCHESTRATION_GRACE);
        let crawl = self.extractor.crawl(url, &options.run_config);

        let output = match tokio::time::timeout(deadline, crawl).await {
            Err(_) => {
                tracing::warn!("Extract timeout for {url}");
                return UrlOutcome::Failed(FailureRecord::new(url, "timeout"));
            }
            Ok(Err(e)) => {
                tracing::error!("Extract error for {url} ({}): {e}", self.extractor.name());
                return UrlOutcome::Failed(FailureRecord::new(url, "crawl_failed"));
            }
            Ok(Ok(output)) => output,
        };

        if !output.success {
            let code = output
                .error_message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "crawl_failed".to_string());
            tracing::warn!("Extractor reported failure for {url}: {code}");
            return UrlOutcome::Failed(FailureRecord::new(url, code));
        }

        let raw_content = normalizer::render_body(
            &output,
            options.format,
            options.include_images,
            options.include_links,
        );
        let images = if options.include_images {
            normalizer::extract_images(output.media.as_ref())
        } else {
            Vec::new()
        };
        let favicon = if options.include_favicon {
            normalizer::guess_favicon(&output)
        } else {
            None
        };

        UrlOutcome::Extracted(ExtractResult {
            url: url.to_string(),
            title: normalizer::resolve_title(&output),
            language: normalizer::detect_language(&output),
            raw_content,
            images,
            favicon,
            metadata: normalizer::serialize_metadata(&output),
        })
    }
}

/// Counts failures per error code, for one-line log summaries.
pub fn failure_summary(failures: &[FailureRecord]) -> Value {
    let mut counts = Map::new();
    for failure in failures {
        let count = counts.entry(failure.error.clone()).or_insert(json!(0));
        *count = json!(count.as_u64().unwrap_or(0) + 1);
    }
    Value::Object(counts)
}
