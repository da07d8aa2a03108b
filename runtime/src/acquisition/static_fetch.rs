//! Tier 1: plain HTTP GET plus selector rules.
//!
//! Cheapest tier. Never launches a browser and never calls a model.

use super::http_client::HttpClient;
use super::selectors::SelectorRuleSet;
use crate::error::{ConfigError, ExtractError};
use crate::pipeline::ProductSource;
use crate::result::{ExtractionConfig, ExtractionMethod, ExtractionResult, ProductData};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Fetches raw markup over HTTP and applies the selector rule table.
pub struct StaticFetcher {
    http: HttpClient,
    rules: Arc<SelectorRuleSet>,
}

impl StaticFetcher {
    pub fn new(http: HttpClient, rules: Arc<SelectorRuleSet>) -> Self {
        Self { http, rules }
    }

    /// Fetch `url` and extract product fields from the response body.
    ///
    /// Never fails: network errors, timeouts, non-2xx statuses and missing
    /// fields all come back as failed results.
    pub async fn fetch_static(&self, url: &str, config: &ExtractionConfig) -> ExtractionResult {
        let resp = match self.http.get(url, config).await {
            Ok(r) => r,
            Err(e) => {
                info!("static fetch of {url} failed: {e}");
                return ExtractionResult::failure(e, ExtractionMethod::Static);
            }
        };

        if !resp.is_success() {
            let err = ExtractError::HttpStatus {
                status: resp.status,
                url: resp.final_url,
            };
            info!("static fetch of {url} failed: {err}");
            return ExtractionResult::failure(err, ExtractionMethod::Static);
        }

        let data = self.rules.resolve_html(&resp.body).into_product(&resp.final_url);
        evaluate(data)
    }
}

/// Price, currency and image are required; the title is optional.
fn evaluate(data: ProductData) -> ExtractionResult {
    let mut missing = Vec::new();
    if data.price.is_none() {
        missing.push("price");
    }
    if data.currency.is_none() {
        missing.push("currency");
    }
    if data.image_url.is_none() {
        missing.push("image");
    }

    if missing.is_empty() {
        ExtractionResult::success(data, ExtractionMethod::Static)
    } else {
        debug!("static selectors missed: {}", missing.join(", "));
        ExtractionResult::failure(ExtractError::MissingFields(missing), ExtractionMethod::Static)
    }
}

#[async_trait]
impl ProductSource for StaticFetcher {
    async fn fetch(
        &self,
        url: &str,
        config: &ExtractionConfig,
    ) -> Result<ExtractionResult, ConfigError> {
        Ok(self.fetch_static(url, config).await)
    }
}
