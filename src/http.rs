//! Shared `reqwest` client construction.

use reqwest::header::HeaderMap;
use serde_json::{Map, Value};
use std::time::Duration;

/// Builds a client with the given User-Agent. `timeout` bounds each whole
/// request; callers that enforce their own deadline pass `None`.
pub fn build_client(
    user_agent: &str,
    timeout: Option<Duration>,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(10));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build()
}

/// Response headers as a JSON object; non-UTF-8 values are dropped.
pub fn header_map(headers: &HeaderMap) -> Map<String, Value> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), Value::from(v)))
        })
        .collect()
}
