//! Async HTTP client wrapping reqwest.
//!
//! Not a browser, just HTTP requests. Follows redirects, sends browser-like
//! headers, and bounds every request with the caller's timeout. Does not
//! retry; retry policy belongs to whoever schedules the extraction.

use crate::error::ExtractError;
use crate::result::ExtractionConfig;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::time::Duration;

/// Response from an HTTP GET request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Original requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client for the static tier.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,\
                 image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .default_headers(headers)
            .build()
            .unwrap_or_default();

        Self { client }
    }

    /// GET `url` with the configured user agent and a hard timeout.
    ///
    /// Non-2xx statuses are returned as responses; only transport failures
    /// and timeouts are errors.
    pub async fn get(
        &self,
        url: &str,
        config: &ExtractionConfig,
    ) -> Result<HttpResponse, ExtractError> {
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                ExtractError::Timeout(config.timeout_ms)
            } else {
                ExtractError::Network(e.to_string())
            }
        };

        let mut request = self
            .client
            .get(url)
            .timeout(Duration::from_millis(config.timeout_ms));
        if let Ok(ua) = HeaderValue::from_str(&config.user_agent) {
            request = request.header(USER_AGENT, ua);
        }

        let resp = request.send().await.map_err(map_err)?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let body = resp.text().await.map_err(map_err)?;

        Ok(HttpResponse {
            url: url.to_string(),
            final_url,
            status,
            body,
        })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}
