//! Page extractors: the seam between the extraction pipeline and whatever
//! actually loads a web page.
//!
//! [`RemoteCrawlerExtractor`] talks to a headless-browser crawl service.
//! [`HttpPageExtractor`] is the built-in fallback that fetches the page with a
//! plain GET and renders markdown itself.

use async_trait::async_trait;
use reqwest::Url;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::time::Duration;

use crate::data_models::Depth;
use crate::error::CrawlError;
use crate::http::header_map;

/// Tags dropped before any text is taken from a page.
pub const EXCLUDED_TAGS: &[&str] = &[
    "nav",
    "header",
    "footer",
    "aside",
    "menu",
    "sidebar",
    "advertisement",
    "noscript",
    "script",
    "style",
    "form",
    "button",
    "iframe",
    "svg",
    "canvas",
    "video",
    "audio",
    "figure",
    "figcaption",
];

/// Class/id tokens that mark page chrome rather than content.
const BOILERPLATE_MARKERS: &[&str] = &[
    "nav", "menu", "sidebar", "footer", "header", "cookie", "banner", "promo", "ads", "badge",
];

const MARKDOWN_WIDTH: usize = 200;
const MAX_IFRAMES: usize = 3;

/// How a single page should be crawled. Derived once per extraction batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub depth: Depth,
    pub page_timeout: Duration,
    pub prune_threshold: f64,
    pub min_word_threshold: usize,
    pub word_count_threshold: usize,
    pub process_iframes: bool,
    pub delay_before_return: Duration,
    pub excluded_tags: &'static [&'static str],
}

impl RunConfig {
    /// The page timeout never drops below three seconds.
    pub fn for_depth(depth: Depth, timeout: Duration) -> RunConfig {
        let page_timeout = timeout.max(Duration::from_secs(3));
        match depth {
            Depth::Basic => RunConfig {
                depth,
                page_timeout,
                prune_threshold: 0.6,
                min_word_threshold: 15,
                word_count_threshold: 12,
                process_iframes: false,
                delay_before_return: Duration::from_millis(300),
                excluded_tags: EXCLUDED_TAGS,
            },
            Depth::Advanced => RunConfig {
                depth,
                page_timeout,
                prune_threshold: 0.5,
                min_word_threshold: 12,
                word_count_threshold: 10,
                process_iframes: true,
                delay_before_return: Duration::from_millis(1500),
                excluded_tags: EXCLUDED_TAGS,
            },
        }
    }

    /// Lighter settings used when enriching search results.
    pub fn for_search(timeout: Duration) -> RunConfig {
        RunConfig {
            depth: Depth::Basic,
            page_timeout: timeout,
            prune_threshold: 0.55,
            min_word_threshold: 15,
            word_count_threshold: 12,
            process_iframes: false,
            delay_before_return: Duration::from_millis(300),
            excluded_tags: EXCLUDED_TAGS,
        }
    }
}

/// Markdown as produced by an extractor. `fit` is the filtered rendition and
/// wins over `raw` when both are present.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "WireMarkdown")]
pub struct MarkdownContent {
    pub fit: Option<String>,
    pub raw: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireMarkdown {
    Plain(String),
    Generated {
        raw_markdown: Option<String>,
        fit_markdown: Option<String>,
    },
}

impl From<WireMarkdown> for MarkdownContent {
    fn from(wire: WireMarkdown) -> Self {
        match wire {
            WireMarkdown::Plain(text) => MarkdownContent {
                fit: None,
                raw: Some(text),
            },
            WireMarkdown::Generated {
                raw_markdown,
                fit_markdown,
            } => MarkdownContent {
                fit: fit_markdown,
                raw: raw_markdown,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Media {
    #[serde(default)]
    pub images: Vec<Value>,
}

/// Everything an extractor may know about a page. All content fields are
/// optional; the normalizer decides which one to trust.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CrawlOutput {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub markdown: Option<MarkdownContent>,
    #[serde(default)]
    pub cleaned_html: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub media: Option<Media>,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub response_headers: Option<Map<String, Value>>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl CrawlOutput {
    pub fn failed(url: &str, error_message: impl Into<String>) -> CrawlOutput {
        CrawlOutput {
            url: url.to_string(),
            success: false,
            error_message: Some(error_message.into()),
            ..Default::default()
        }
    }
}

/// Loads one page. An `Err` means the extractor itself broke; a page it
/// loaded but could not use comes back as `Ok` with `success == false`.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    fn name(&self) -> &str;

    async fn crawl(&self, url: &str, config: &RunConfig) -> Result<CrawlOutput, CrawlError>;
}

// =============================================================================
// Remote headless-browser crawler
// =============================================================================

/// Browser settings forwarded to the crawl service.
#[derive(Debug, Clone, Default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub user_agent: String,
    pub extra_headers: HashMap<String, String>,
    pub cookies: Vec<Value>,
    pub use_persistent_context: bool,
}

const STEALTH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-dev-shm-usage",
    "--no-sandbox",
    "--disable-web-security",
    "--disable-features=VizDisplayCompositor",
];

#[derive(Deserialize)]
struct CrawlServiceResponse {
    #[serde(default)]
    results: Vec<CrawlOutput>,
}

pub struct RemoteCrawlerExtractor {
    client: reqwest::Client,
    endpoint: String,
    browser: BrowserSettings,
}

impl RemoteCrawlerExtractor {
    pub fn new(client: reqwest::Client, base_url: &str, browser: BrowserSettings) -> Self {
        RemoteCrawlerExtractor {
            client,
            endpoint: format!("{}/crawl", base_url.trim_end_matches('/')),
            browser,
        }
    }

    fn request_body(&self, url: &str, config: &RunConfig) -> Value {
        let mut browser = json!({
            "headless": self.browser.headless,
            "verbose": false,
            "user_agent": self.browser.user_agent,
            "enable_stealth": true,
            "extra_args": STEALTH_ARGS,
            "ignore_https_errors": true,
            "use_persistent_context": self.browser.use_persistent_context,
        });
        if !self.browser.extra_headers.is_empty() {
            browser["headers"] = json!(self.browser.extra_headers);
        }
        if !self.browser.cookies.is_empty() {
            browser["cookies"] = Value::Array(self.browser.cookies.clone());
        }

        json!({
            "urls": [url],
            "browser_config": { "type": "BrowserConfig", "params": browser },
            "crawler_config": {
                "type": "CrawlerRunConfig",
                "params": {
                    "cache_mode": "bypass",
                    "check_robots_txt": false,
                    "remove_overlay_elements": true,
                    "process_iframes": config.process_iframes,
                    "excluded_tags": config.excluded_tags,
                    "word_count_threshold": config.word_count_threshold,
                    "page_timeout": config.page_timeout.as_millis() as u64,
                    "delay_before_return_html": config.delay_before_return.as_secs_f64(),
                    "markdown_generator": {
                        "type": "DefaultMarkdownGenerator",
                        "params": {
                            "content_filter": {
                                "type": "PruningContentFilter",
                                "params": {
                                    "threshold": config.prune_threshold,
                                    "threshold_type": "fixed",
                                    "min_word_threshold": config.min_word_threshold,
                                }
                            }
                        }
                    },
                    "magic": true,
                    "simulate_user": true,
                    "override_navigator": true,
                }
            }
        })
    }
}

#[async_trait]
impl PageExtractor for RemoteCrawlerExtractor {
    fn name(&self) -> &str {
        "remote-crawler"
    }

    async fn crawl(&self, url: &str, config: &RunConfig) -> Result<CrawlOutput, CrawlError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&self.request_body(url, config))
            .send()
            .await?
            .error_for_status()?;

        let body: CrawlServiceResponse = response.json().await?;
        let mut output = body
            .results
            .into_iter()
            .next()
            .ok_or_else(|| CrawlError::EmptyResponse(url.to_string()))?;
        if output.url.is_empty() {
            output.url = url.to_string();
        }
        Ok(output)
    }
}

// =============================================================================
// Built-in HTTP extractor
// =============================================================================

pub struct HttpPageExtractor {
    client: reqwest::Client,
}

struct ParsedPage {
    metadata: Map<String, Value>,
    images: Vec<Value>,
    cleaned_html: String,
    iframe_sources: Vec<String>,
}

impl HttpPageExtractor {
    pub fn new(client: reqwest::Client) -> Self {
        HttpPageExtractor { client }
    }

    async fn fetch_page(&self, url: Url, timeout: Duration) -> Result<reqwest::Response, CrawlError> {
        Ok(self.client.get(url).timeout(timeout).send().await?)
    }

    /// Text of an embedded frame; only used for advanced depth.
    async fn fetch_frame(&self, src: &str, timeout: Duration) -> Result<String, CrawlError> {
        let response = self
            .fetch_page(Url::parse(src)?, timeout)
            .await?
            .error_for_status()?;
        let html = response.text().await?;
        let cleaned = strip_excluded(&html, EXCLUDED_TAGS);
        render_markdown(&cleaned)
    }
}

#[async_trait]
impl PageExtractor for HttpPageExtractor {
    fn name(&self) -> &str {
        "http"
    }

    async fn crawl(&self, url: &str, config: &RunConfig) -> Result<CrawlOutput, CrawlError> {
        let base = Url::parse(url)?;
        let response = self.fetch_page(base.clone(), config.page_timeout).await?;

        let status = response.status();
        let headers = header_map(response.headers());
        if !status.is_success() {
            return Ok(CrawlOutput {
                status_code: Some(status.as_u16()),
                response_headers: Some(headers),
                ..CrawlOutput::failed(url, format!("http_error_{}", status.as_u16()))
            });
        }

        let html = response.text().await?;
        let page = parse_html(&base, &html, config);
        let mut raw = render_markdown(&page.cleaned_html)?;

        if config.process_iframes {
            for src in page.iframe_sources.iter().take(MAX_IFRAMES) {
                match self.fetch_frame(src, config.page_timeout).await {
                    Ok(text) if !text.trim().is_empty() => {
                        raw.push_str("\n\n");
                        raw.push_str(text.trim());
                    }
                    Ok(_) => {}
                    Err(e) => tracing::debug!("skipping iframe {src}: {e}"),
                }
            }
        }

        let fit = prune_markdown(&raw, config.min_word_threshold);

        Ok(CrawlOutput {
            url: url.to_string(),
            success: true,
            markdown: Some(MarkdownContent {
                fit: (!fit.is_empty()).then_some(fit),
                raw: Some(raw),
            }),
            cleaned_html: Some(page.cleaned_html),
            html: Some(html),
            metadata: Some(page.metadata),
            media: Some(Media {
                images: page.images,
            }),
            status_code: Some(status.as_u16()),
            response_headers: Some(headers),
            error_message: None,
        })
    }
}

fn parse_html(base: &Url, html: &str, config: &RunConfig) -> ParsedPage {
    let document = Html::parse_document(html);

    let mut metadata = Map::new();
    if let Ok(selector) = Selector::parse("title") {
        if let Some(title) = document.select(&selector).next() {
            let title = title.text().collect::<String>().trim().to_string();
            if !title.is_empty() {
                metadata.insert("title".into(), Value::from(title));
            }
        }
    }
    if let Ok(selector) = Selector::parse("meta[content]") {
        for meta in document.select(&selector) {
            let el = meta.value();
            let Some(key) = el.attr("name").or_else(|| el.attr("property")) else {
                continue;
            };
            let content = el.attr("content").unwrap_or_default().trim();
            if !content.is_empty() {
                metadata.insert(key.to_lowercase(), Value::from(content));
            }
        }
    }

    let mut images = Vec::new();
    if let Ok(selector) = Selector::parse("img[src]") {
        for img in document.select(&selector) {
            let Some(src) = img.value().attr("src") else {
                continue;
            };
            if src.starts_with("data:") {
                continue;
            }
            if let Ok(resolved) = base.join(src) {
                images.push(json!({
                    "src": resolved.to_string(),
                    "alt": img.value().attr("alt"),
                    "score": Value::Null,
                }));
            }
        }
    }

    let mut iframe_sources = Vec::new();
    if config.process_iframes {
        if let Ok(selector) = Selector::parse("iframe[src]") {
            for frame in document.select(&selector) {
                if let Some(Ok(resolved)) = frame.value().attr("src").map(|s| base.join(s)) {
                    if resolved.scheme() == "http" || resolved.scheme() == "https" {
                        iframe_sources.push(resolved.to_string());
                    }
                }
            }
        }
    }

    ParsedPage {
        metadata,
        images,
        cleaned_html: strip_excluded(html, config.excluded_tags),
        iframe_sources,
    }
}

fn has_boilerplate_marker(value: &str) -> bool {
    value.split_whitespace().any(|token| {
        let token = token.to_lowercase();
        BOILERPLATE_MARKERS.iter().any(|marker| {
            token == *marker
                || token.starts_with(&format!("{marker}-"))
                || token.ends_with(&format!("-{marker}"))
        })
    })
}

/// Serializes the document without excluded tags and without elements whose
/// class or id marks them as page chrome.
pub fn strip_excluded(html: &str, excluded_tags: &[&str]) -> String {
    let mut document = Html::parse_document(html);

    let doomed: Vec<_> = document
        .root_element()
        .descendants()
        .filter(|node| {
            let Some(el) = node.value().as_element() else {
                return false;
            };
            if matches!(el.name(), "html" | "body" | "main" | "article") {
                return false;
            }
            excluded_tags.contains(&el.name())
                || el.attr("class").is_some_and(has_boilerplate_marker)
                || el.attr("id").is_some_and(has_boilerplate_marker)
        })
        .map(|node| node.id())
        .collect();

    for id in doomed {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    document.root_element().html()
}

pub fn render_markdown(html: &str) -> Result<String, CrawlError> {
    html2text::from_read(html.as_bytes(), MARKDOWN_WIDTH)
        .map_err(|e| CrawlError::Render(e.to_string()))
}

/// Keeps headings and blocks with at least `min_words` words.
pub fn prune_markdown(markdown: &str, min_words: usize) -> String {
    markdown
        .split("\n\n")
        .map(str::trim)
        .filter(|block| {
            !block.is_empty()
                && (block.starts_with('#') || block.split_whitespace().count() >= min_words)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
