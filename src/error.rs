//! Error types shared by the search and extraction services.
//!
//! [`ServiceError`] is what a service hands back to its caller; every variant
//! carries the HTTP status the API layer answers with. Per-URL extraction
//! failures are not errors, they are recorded as
//! [`FailureRecord`](crate::data_models::FailureRecord) values.

use axum::http::StatusCode;

/// Caller-visible failure of a search or extract request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    /// The request itself is unusable (empty query, no URLs, too many URLs).
    #[error("{0}")]
    InvalidRequest(String),

    /// A backend is selected but its credentials are missing.
    #[error("{0}")]
    NotConfigured(String),

    /// The upstream rejected our credentials.
    #[error("{0}")]
    UpstreamAuth(String),

    /// The upstream kept rate limiting us after all retries.
    #[error("{0}")]
    RateLimited(String),

    /// The upstream refused the request as malformed.
    #[error("{0}")]
    BadUpstreamRequest(String),

    /// The upstream answered with an unexpected status code.
    #[error("search request failed with status {0}")]
    UpstreamStatus(u16),

    /// The upstream could not be reached at all.
    #[error("{0}")]
    Unreachable(String),

    /// The upstream did not answer in time.
    #[error("{0}")]
    Timeout(String),

    /// Any other upstream failure.
    #[error("{0}")]
    Unavailable(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidRequest(_) | ServiceError::BadUpstreamRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::Unreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::NotConfigured(_)
            | ServiceError::UpstreamAuth(_)
            | ServiceError::UpstreamStatus(_)
            | ServiceError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Failure of a single upstream call, as seen by the retry executor.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UpstreamError {
    /// Missing credentials. Retrying cannot help.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// The call failed; the message is matched against known transient
    /// signatures to decide whether to retry.
    #[error("{0}")]
    Call(String),
}

impl UpstreamError {
    pub fn message(&self) -> &str {
        match self {
            UpstreamError::NotConfigured(msg) | UpstreamError::Call(msg) => msg,
        }
    }
}

/// Failure raised by a page extractor (as opposed to a page the extractor
/// fetched but reported as unsuccessful).
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("crawler returned no result for {0}")]
    EmptyResponse(String),

    #[error("html conversion failed: {0}")]
    Render(String),
}

/// Why a PDF URL produced no text. The display form is the failure code
/// reported to API clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PdfError {
    #[error("http_error_{0}")]
    HttpStatus(u16),

    #[error("not_pdf")]
    NotPdf,

    #[error("pdf_too_large")]
    TooLarge,

    #[error("download_timeout")]
    DownloadTimeout,

    #[error("download_error: {0}")]
    Download(&'static str),

    #[error("no_text_content")]
    NoText,

    #[error("pdf_parse_error: {0}")]
    Parse(String),
}

/// Renders a `reqwest` error together with its source chain, so that
/// messages such as "connection reset by peer" survive for classification.
pub fn describe_reqwest_error(err: &reqwest::Error) -> String {
    let mut message = if err.is_timeout() {
        format!("request timed out: {err}")
    } else {
        err.to_string()
    };
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
