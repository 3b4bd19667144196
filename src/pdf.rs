//! PDF download and text-layer extraction.

use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::error::PdfError;

/// Pulls the text layer out of an in-memory PDF, one string per page.
/// Implementations are synchronous and are always run on the blocking pool.
pub trait PdfTextExtractor: Send + Sync {
    fn name(&self) -> &str;

    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, String>;
}

/// Pure-Rust extractor backed by `pdf-extract`. Scanned documents without a
/// text layer come back as blank pages.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractText;

impl PdfTextExtractor for PdfExtractText {
    fn name(&self) -> &str {
        "pdf-extract"
    }

    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, String> {
        pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PdfLimits {
    pub timeout: Duration,
    pub max_bytes: u64,
    pub max_pages: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdfDocument {
    pub text: String,
    pub pages: usize,
    pub pages_extracted: usize,
}

/// True when the URL path ends in `.pdf`. Unparsable URLs are not PDFs.
pub fn is_pdf_url(url: &str) -> bool {
    Url::parse(url)
        .map(|u| u.path().to_lowercase().ends_with(".pdf"))
        .unwrap_or(false)
}

pub fn bytes_look_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

/// Title derived from the file name in the URL path.
pub fn pdf_title_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let filename = parsed.path().rsplit('/').next().unwrap_or_default();
    let stem = if filename.to_lowercase().ends_with(".pdf") {
        &filename[..filename.len() - 4]
    } else {
        filename
    };
    let title = stem.replace("%20", " ").replace(['_', '-'], " ");
    let title = title.trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

fn transport_kind(err: &reqwest::Error) -> &'static str {
    if err.is_connect() {
        "connect"
    } else if err.is_redirect() {
        "redirect"
    } else if err.is_body() {
        "body"
    } else if err.is_decode() {
        "decode"
    } else if err.is_builder() {
        "builder"
    } else {
        "request"
    }
}

fn download_failure(err: reqwest::Error) -> PdfError {
    if err.is_timeout() {
        PdfError::DownloadTimeout
    } else {
        PdfError::Download(transport_kind(&err))
    }
}

/// Downloads the document, refusing anything over `max_bytes` as early as
/// possible. The whole download, body included, must finish within
/// `timeout`.
pub async fn download_pdf(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    max_bytes: u64,
) -> Result<Vec<u8>, PdfError> {
    let download = async {
        let mut response = client.get(url).send().await.map_err(download_failure)?;

        if response.status() != StatusCode::OK {
            return Err(PdfError::HttpStatus(response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_lowercase)
            .filter(|v| !v.is_empty());
        if let Some(content_type) = &content_type {
            if !content_type.contains("pdf") {
                return Err(PdfError::NotPdf);
            }
        }

        if response.content_length().is_some_and(|len| len > max_bytes) {
            return Err(PdfError::TooLarge);
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(download_failure)? {
            if (bytes.len() + chunk.len()) as u64 > max_bytes {
                return Err(PdfError::TooLarge);
            }
            bytes.extend_from_slice(&chunk);
        }

        if content_type.is_none() && !bytes_look_like_pdf(&bytes) {
            return Err(PdfError::NotPdf);
        }
        Ok::<_, PdfError>(bytes)
    };

    tokio::time::timeout(timeout, download)
        .await
        .map_err(|_| PdfError::DownloadTimeout)?
}

/// Downloads and parses a PDF, keeping at most `limits.max_pages` pages.
pub async fn extract_pdf(
    client: &reqwest::Client,
    extractor: Arc<dyn PdfTextExtractor>,
    url: &str,
    limits: PdfLimits,
) -> Result<PdfDocument, PdfError> {
    let bytes = download_pdf(client, url, limits.timeout, limits.max_bytes).await?;

    let pages = tokio::task::spawn_blocking(move || extractor.extract_pages(&bytes))
        .await
        .map_err(|e| PdfError::Parse(panic_message(e)))?
        .map_err(PdfError::Parse)?;

    let total = pages.len();
    let kept = total.min(limits.max_pages);
    let mut text = pages
        .iter()
        .take(kept)
        .map(|page| page.trim())
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    if text.trim().is_empty() {
        return Err(PdfError::NoText);
    }
    if total > limits.max_pages {
        text.push_str(&format!(
            "\n\n[Note: PDF truncated. Showing {kept} of {total} pages]"
        ));
    }

    Ok(PdfDocument {
        text,
        pages: total,
        pages_extracted: kept,
    })
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "parser panicked".to_string()
    }
}
