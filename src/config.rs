use dotenvy::dotenv;
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::data_models::OutputFormat;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; TavilyBot/1.0)";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{0}")]
    Invalid(String),
}

/// Which search provider answers `/search`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Searxng,
    Google,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,

    pub search_backend: BackendKind,
    pub searxng_url: String,
    pub search_engines: String,
    pub google_api_key: Option<String>,
    pub google_cse_id: Option<String>,
    pub google_api_url: String,
    pub google_max_retries: u32,
    pub google_retry_base_delay: Duration,
    pub google_max_concurrency: usize,

    pub scraper_timeout: Duration,
    pub scraper_max_length: usize,
    pub scraper_user_agent: String,

    pub search_cache_ttl: Duration,
    pub search_cache_max_entries: usize,
    pub search_response_cache_ttl: Duration,
    pub search_response_cache_max_entries: usize,
    pub cache_lock_timeout: Duration,

    pub extract_max_urls: usize,
    pub extract_timeout_basic: Duration,
    pub extract_timeout_advanced: Duration,
    pub extract_default_format: OutputFormat,
    pub extract_max_concurrency: usize,
    pub pdf_max_pages: usize,
    pub pdf_max_size_bytes: u64,

    pub crawler_url: Option<String>,
    pub browser_headless: bool,
    pub browser_use_persistent_context: bool,
    pub browser_extra_headers: HashMap<String, String>,
    pub browser_cookies: Vec<Value>,

    pub log_level: tracing::Level,
}

impl Config {
    /// Reads configuration from the process environment, loading `.env`
    /// first when present.
    pub fn from_env() -> Result<Config, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`] but loads the given env file.
    pub fn from_env_file(path: &Path) -> Result<Config, ConfigError> {
        dotenvy::from_path(path).map_err(|e| {
            ConfigError::Invalid(format!("cannot load env file {}: {e}", path.display()))
        })?;
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Missing keys take their
    /// defaults; blank values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let search_backend = match get_env_or_default(&get, "SEARCH_BACKEND", "searxng")
            .to_lowercase()
            .as_str()
        {
            "google" => BackendKind::Google,
            "searxng" => BackendKind::Searxng,
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "SEARCH_BACKEND",
                    value: other.to_string(),
                });
            }
        };

        let extract_default_format =
            match get_env_or_default(&get, "EXTRACT_DEFAULT_FORMAT", "markdown")
                .to_lowercase()
                .as_str()
            {
                "markdown" => OutputFormat::Markdown,
                "text" => OutputFormat::Text,
                other => {
                    return Err(ConfigError::InvalidValue {
                        key: "EXTRACT_DEFAULT_FORMAT",
                        value: other.to_string(),
                    });
                }
            };

        let browser_extra_headers = match get("BROWSER_EXTRA_HEADERS") {
            Some(raw) => serde_json::from_str(&raw).map_err(|_| ConfigError::InvalidValue {
                key: "BROWSER_EXTRA_HEADERS",
                value: raw,
            })?,
            None => HashMap::new(),
        };
        let browser_cookies = match get("BROWSER_COOKIES") {
            Some(raw) => serde_json::from_str(&raw).map_err(|_| ConfigError::InvalidValue {
                key: "BROWSER_COOKIES",
                value: raw,
            })?,
            None => Vec::new(),
        };

        let log_level = get_env_or_default(&get, "LOG_LEVEL", "info");
        let log_level = log_level
            .parse::<tracing::Level>()
            .map_err(|_| ConfigError::InvalidValue {
                key: "LOG_LEVEL",
                value: log_level.clone(),
            })?;

        let pdf_max_size_mb: f64 = parse_env(&get, "PDF_MAX_SIZE_MB", 50.0)?;

        let config = Config {
            server_host: get_env_or_default(&get, "SERVER_HOST", "0.0.0.0"),
            server_port: parse_env(&get, "SERVER_PORT", 8001)?,

            search_backend,
            searxng_url: get_env_or_default(&get, "SEARXNG_URL", "http://searxng:8080")
                .trim_end_matches('/')
                .to_string(),
            search_engines: get_env_or_default(&get, "SEARCH_ENGINES", "google,duckduckgo,brave"),
            google_api_key: get("GOOGLE_API_KEY"),
            google_cse_id: get("GOOGLE_CSE_ID"),
            google_api_url: get_env_or_default(&get, "GOOGLE_API_URL", "https://www.googleapis.com")
                .trim_end_matches('/')
                .to_string(),
            google_max_retries: parse_env(&get, "GOOGLE_MAX_RETRIES", 5)?,
            google_retry_base_delay: Duration::from_millis(parse_env(
                &get,
                "GOOGLE_RETRY_BASE_DELAY_MS",
                1000,
            )?),
            google_max_concurrency: parse_env(&get, "GOOGLE_MAX_CONCURRENCY", 1)?,

            scraper_timeout: seconds(parse_env(&get, "SCRAPER_TIMEOUT", 10.0)?),
            scraper_max_length: parse_env(&get, "SCRAPER_MAX_CONTENT_LENGTH", 2500)?,
            scraper_user_agent: get_env_or_default(&get, "SCRAPER_USER_AGENT", DEFAULT_USER_AGENT),

            search_cache_ttl: seconds(parse_env(&get, "SEARCH_CACHE_TTL", 120.0)?),
            search_cache_max_entries: parse_env(&get, "SEARCH_CACHE_MAX_ENTRIES", 256)?,
            search_response_cache_ttl: seconds(parse_env(&get, "SEARCH_RESPONSE_CACHE_TTL", 60.0)?),
            search_response_cache_max_entries: parse_env(
                &get,
                "SEARCH_RESPONSE_CACHE_MAX_ENTRIES",
                128,
            )?,
            cache_lock_timeout: Duration::from_millis(parse_env(
                &get,
                "CACHE_LOCK_TIMEOUT_MS",
                500,
            )?),

            extract_max_urls: parse_env(&get, "EXTRACT_MAX_URLS", 20)?,
            extract_timeout_basic: seconds(parse_env(&get, "EXTRACT_TIMEOUT_BASIC", 12.0)?),
            extract_timeout_advanced: seconds(parse_env(&get, "EXTRACT_TIMEOUT_ADVANCED", 25.0)?),
            extract_default_format,
            extract_max_concurrency: parse_env(&get, "EXTRACT_MAX_CONCURRENCY", 8)?,
            pdf_max_pages: parse_env(&get, "PDF_MAX_PAGES", 10)?,
            pdf_max_size_bytes: (pdf_max_size_mb.max(0.0) * 1024.0 * 1024.0) as u64,

            crawler_url: get("CRAWLER_URL").map(|u| u.trim_end_matches('/').to_string()),
            browser_headless: parse_env(&get, "BROWSER_HEADLESS", true)?,
            browser_use_persistent_context: parse_env(
                &get,
                "BROWSER_USE_PERSISTENT_CONTEXT",
                false,
            )?,
            browser_extra_headers,
            browser_cookies,

            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects limits that would make a service unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extract_max_urls == 0 {
            return Err(ConfigError::Invalid(
                "EXTRACT_MAX_URLS must be greater than 0".into(),
            ));
        }
        if self.extract_max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "EXTRACT_MAX_CONCURRENCY must be greater than 0".into(),
            ));
        }
        if self.google_max_retries == 0 {
            return Err(ConfigError::Invalid(
                "GOOGLE_MAX_RETRIES must be greater than 0".into(),
            ));
        }
        if self.google_max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "GOOGLE_MAX_CONCURRENCY must be greater than 0".into(),
            ));
        }
        if self.pdf_max_pages == 0 {
            return Err(ConfigError::Invalid(
                "PDF_MAX_PAGES must be greater than 0".into(),
            ));
        }
        if self.scraper_timeout.is_zero()
            || self.extract_timeout_basic.is_zero()
            || self.extract_timeout_advanced.is_zero()
        {
            return Err(ConfigError::Invalid("timeouts must be greater than 0".into()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        // Every key has a valid default, so an empty lookup cannot fail.
        Config::from_lookup(|_| None).unwrap_or_else(|e| unreachable!("default config: {e}"))
    }
}

fn get_env_or_default<G>(get: &G, key: &str, default: &str) -> String
where
    G: Fn(&str) -> Option<String>,
{
    get(key).unwrap_or_else(|| default.to_string())
}

fn parse_env<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(default),
    }
}

fn seconds(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}
