//! Turns whatever a page extractor returned into one text model.
//!
//! The body pipeline runs in a fixed order: pick the best available text,
//! drop UI noise, optionally strip images and links, optionally flatten to
//! plain text. Title, language and favicon are resolved independently,
//! document metadata first and the HTML itself second.

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use std::sync::OnceLock;
use url::Url;

use crate::crawler::{CrawlOutput, Media};
use crate::data_models::{ImageInfo, OutputFormat};

static NOISE_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
static IMAGE_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
static LINK_PATTERNS: OnceLock<LinkPatterns> = OnceLock::new();
static TEXT_PATTERNS: OnceLock<TextPatterns> = OnceLock::new();
static BLANK_RUNS: OnceLock<Regex> = OnceLock::new();
static FORMAT_ONLY_LINES: OnceLock<Regex> = OnceLock::new();

pub const IMAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".ico", ".bmp", ".tiff", ".tif", ".avif",
    ".heic", ".heif", ".jfif", ".pjpeg", ".pjp",
];

// Patterns are fixed at compile time; a failure here is a programming error.
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

fn get_noise_patterns() -> &'static [Regex] {
    NOISE_PATTERNS.get_or_init(|| {
        [
            // social sharing
            r"(?mi)^\s*\[?(Share|Tweet|Pin|Email|Print|Copy|Like|Follow|Subscribe)\]?\s*$",
            r"(?mi)^\s*\[?(Facebook|Twitter|LinkedIn|Instagram|YouTube|TikTok|Pinterest)\]?\s*$",
            // cookie and consent banners
            r"(?mi)^\s*\[?(Accept|Reject|Cookie|Privacy|GDPR|Consent)\s*(All|Cookies|Settings|Policy)?\]?\s*$",
            // breadcrumbs and pagination
            r"(?mi)^\s*\[?(Home|Back|Next|Previous|Page|›|»|«|‹)\]?\s*$",
            r"(?m)^\s*\d+\s*$",
            // login prompts
            r"(?mi)^\s*\[?(Sign\s*(In|Up|Out)|Log\s*(In|Out)|Register|Login|Logout)\]?\s*$",
            // decorative symbol lines
            r"(?m)^\s*[|\-*_#>•·–—]+\s*$",
            r"(?mi)^\s*\[?(Read\s*More|Continue\s*Reading|See\s*More|View\s*More|Load\s*More)\]?\s*$",
            // legal boilerplate
            r"(?mi)^\s*©.*\d{4}.*$",
            r"(?mi)^\s*All\s*Rights\s*Reserved.*$",
            r"(?mi)^\s*\[?Skip\s*(to)?\s*(Main)?\s*Content\]?\s*$",
        ]
        .iter()
        .map(|p| compile(p))
        .collect()
    })
}

fn get_image_patterns() -> &'static [Regex] {
    IMAGE_PATTERNS.get_or_init(|| {
        let ext = IMAGE_EXTENSIONS
            .iter()
            .map(|e| regex::escape(e))
            .collect::<Vec<_>>()
            .join("|");
        vec![
            compile(r"!\[[^\]]*\]\([^)]+\)"),
            compile(r"(?i)<img[^>]*>"),
            compile(&format!(r"(?mi)^\s*https?://[^\s]+({ext})(\?[^\s]*)?\s*$")),
            compile(&format!(r"(?i)\[[^\]]*\]\(([^)]+({ext})(\?[^)]*)?)\)")),
            compile(&format!(r#"(?i)https?://[^\s<>"]+({ext})(\?[^\s<>"]*)?"#)),
        ]
    })
}

struct LinkPatterns {
    markdown_link: Regex,
    anchor_tag: Regex,
    url_line: Regex,
    inline_url: Regex,
    empty_parens: Regex,
    empty_brackets: Regex,
}

fn get_link_patterns() -> &'static LinkPatterns {
    LINK_PATTERNS.get_or_init(|| LinkPatterns {
        markdown_link: compile(r"\[([^\]]*)\]\([^)]+\)"),
        anchor_tag: compile(r"(?i)<a\s+[^>]*>([^<]*)</a>"),
        url_line: compile(r"(?m)^\s*https?://[^\s]+\s*$"),
        inline_url: compile(r#"https?://[^\s<>")\]]+"#),
        empty_parens: compile(r"\(\s*\)"),
        empty_brackets: compile(r"\[\s*\]"),
    })
}

struct TextPatterns {
    code_fence: Regex,
    inline_code: Regex,
    image: Regex,
    link: Regex,
    symbols: Regex,
    whitespace: Regex,
}

fn get_text_patterns() -> &'static TextPatterns {
    TEXT_PATTERNS.get_or_init(|| TextPatterns {
        code_fence: compile(r"```[\s\S]*?```"),
        inline_code: compile(r"`([^`]+)`"),
        image: compile(r"!\[.*?\]\((.*?)\)"),
        link: compile(r"\[(.*?)\]\((.*?)\)"),
        symbols: compile(r"[#>*_]+"),
        whitespace: compile(r"\s{2,}"),
    })
}

/// Picks the body text of a crawl: filtered markdown, then raw markdown,
/// then the visible text of the HTML.
pub fn preferred_text(output: &CrawlOutput) -> Option<String> {
    if let Some(markdown) = &output.markdown {
        let candidates = [markdown.fit.as_deref(), markdown.raw.as_deref()];
        if let Some(text) = candidates.into_iter().flatten().map(str::trim).find(|t| !t.is_empty()) {
            return Some(text.to_string());
        }
    }

    let html = html_source(output)?;
    let text = visible_text(html);
    if text.is_empty() { None } else { Some(text) }
}

/// Renders the body in the requested format, or `None` when nothing is left.
pub fn render_body(
    output: &CrawlOutput,
    format: OutputFormat,
    include_images: bool,
    include_links: bool,
) -> Option<String> {
    let body = preferred_text(output)?;
    let mut body = clean_markdown_noise(&body);

    if !include_images {
        body = strip_image_links(&body);
    }
    if !include_links {
        body = strip_links(&body);
    }
    if body.trim().is_empty() {
        return None;
    }

    match format {
        OutputFormat::Text => Some(markdown_to_text(&body)),
        OutputFormat::Markdown => Some(body),
    }
}

/// Text nodes of the document joined by single spaces, skipping anything
/// inside `script`, `style` or `noscript`.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| matches!(el.name(), "script" | "style" | "noscript" | "template"))
        });
        if hidden {
            continue;
        }
        let text = text.trim();
        if !text.is_empty() {
            parts.push(text);
        }
    }

    parts.join(" ")
}

pub fn clean_markdown_noise(markdown: &str) -> String {
    if markdown.is_empty() {
        return String::new();
    }

    let mut result = markdown.to_string();
    for pattern in get_noise_patterns() {
        result = pattern.replace_all(&result, "").into_owned();
    }

    let blank_runs = BLANK_RUNS.get_or_init(|| compile(r"\n{4,}"));
    result = blank_runs.replace_all(&result, "\n\n\n").into_owned();

    let format_only = FORMAT_ONLY_LINES.get_or_init(|| compile(r"(?m)^\s*[#*_\-]{1,6}\s*$"));
    result = format_only.replace_all(&result, "").into_owned();

    result
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Removes markdown images, `<img>` tags and URLs that point at image files.
pub fn strip_image_links(markdown: &str) -> String {
    let mut result = markdown.to_string();
    for pattern in get_image_patterns() {
        result = pattern.replace_all(&result, "").into_owned();
    }
    result
}

/// Removes every hyperlink but keeps its visible text.
pub fn strip_links(markdown: &str) -> String {
    let p = get_link_patterns();
    let result = p.markdown_link.replace_all(markdown, "$1");
    let result = p.anchor_tag.replace_all(&result, "$1");
    let result = p.url_line.replace_all(&result, "");
    let result = p.inline_url.replace_all(&result, "");
    let result = p.empty_parens.replace_all(&result, "");
    let result = p.empty_brackets.replace_all(&result, "");
    result.into_owned()
}

/// Compact plain-text form of a markdown document.
pub fn markdown_to_text(markdown: &str) -> String {
    let p = get_text_patterns();
    let text = p.code_fence.replace_all(markdown, " ");
    let text = p.inline_code.replace_all(&text, "$1");
    let text = p.image.replace_all(&text, " ");
    let text = p.link.replace_all(&text, "$1");
    let text = p.symbols.replace_all(&text, " ");
    let text = p.whitespace.replace_all(&text, " ");
    text.trim().to_string()
}

/// Cuts `text` to `max_chars` characters, marking the cut with `...`.
pub fn truncate_content(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

fn html_source(output: &CrawlOutput) -> Option<&str> {
    output
        .cleaned_html
        .as_deref()
        .filter(|h| !h.trim().is_empty())
        .or(output.html.as_deref())
        .filter(|h| !h.trim().is_empty())
}

fn metadata_str<'a>(output: &'a CrawlOutput, key: &str) -> Option<&'a str> {
    output
        .metadata
        .as_ref()?
        .get(key)?
        .as_str()
        .filter(|s| !s.trim().is_empty())
}

pub fn resolve_title(output: &CrawlOutput) -> Option<String> {
    for key in ["title", "og:title"] {
        if let Some(title) = metadata_str(output, key) {
            return Some(title.trim().to_string());
        }
    }

    let document = Html::parse_document(html_source(output)?);
    let selector = Selector::parse("title").ok()?;
    let title = document
        .select(&selector)
        .next()?
        .text()
        .collect::<String>();
    let title = title.trim();
    if title.is_empty() { None } else { Some(title.to_string()) }
}

pub fn detect_language(output: &CrawlOutput) -> Option<String> {
    for key in ["language", "lang"] {
        if let Some(lang) = metadata_str(output, key) {
            return Some(lang.to_lowercase());
        }
    }

    let document = Html::parse_document(html_source(output)?);
    let selector = Selector::parse("html").ok()?;
    let html = document.select(&selector).next()?;
    html.value()
        .attr("lang")
        .or_else(|| html.value().attr("xml:lang"))
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.trim().to_lowercase())
}

pub fn guess_favicon(output: &CrawlOutput) -> Option<String> {
    if let Some(favicon) = metadata_str(output, "favicon") {
        return Some(favicon.to_string());
    }

    if let Some(icons) = output
        .metadata
        .as_ref()
        .and_then(|m| m.get("icons"))
        .and_then(Value::as_array)
    {
        for icon in icons {
            let href = icon
                .get("href")
                .or_else(|| icon.get("url"))
                .and_then(Value::as_str)
                .filter(|h| !h.is_empty());
            if let Some(href) = href {
                return resolve_url(&output.url, href);
            }
        }
    }

    let document = Html::parse_document(html_source(output)?);
    let selector = Selector::parse("link[rel]").ok()?;
    for link in document.select(&selector) {
        let is_icon = link
            .value()
            .attr("rel")
            .is_some_and(|rel| rel.split_whitespace().any(|r| r.to_lowercase().contains("icon")));
        if !is_icon {
            continue;
        }
        if let Some(href) = link.value().attr("href").filter(|h| !h.is_empty()) {
            return resolve_url(&output.url, href);
        }
    }
    None
}

/// Resolves `href` against `base`; a base that is not a URL leaves `href`
/// untouched.
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    match Url::parse(base) {
        Ok(base) => base.join(href).ok().map(|u| u.to_string()),
        Err(_) => Some(href.to_string()),
    }
}

pub fn extract_images(media: Option<&Media>) -> Vec<ImageInfo> {
    let Some(media) = media else {
        return Vec::new();
    };

    media
        .images
        .iter()
        .filter_map(|item| {
            let item = item.as_object()?;
            let src = ["src", "url"]
                .iter()
                .filter_map(|k| item.get(*k).and_then(Value::as_str))
                .find(|s| !s.is_empty())?;
            let description = ["desc", "alt"]
                .iter()
                .filter_map(|k| item.get(*k).and_then(Value::as_str))
                .find(|s| !s.is_empty())
                .map(str::to_string);
            Some(ImageInfo {
                url: src.to_string(),
                description,
                score: item.get("score").and_then(Value::as_f64),
            })
        })
        .collect()
}

/// Native metadata plus status code, response headers and error message.
pub fn serialize_metadata(output: &CrawlOutput) -> Option<Map<String, Value>> {
    let mut metadata = output.metadata.clone().unwrap_or_default();

    if let Some(status) = output.status_code {
        metadata.insert("status_code".into(), Value::from(status));
    }
    if let Some(headers) = output.response_headers.as_ref().filter(|h| !h.is_empty()) {
        metadata.insert("response_headers".into(), Value::Object(headers.clone()));
    }
    if let Some(error) = output.error_message.as_ref().filter(|e| !e.is_empty()) {
        metadata.insert("error_message".into(), Value::from(error.clone()));
    }

    if metadata.is_empty() { None } else { Some(metadata) }
}
