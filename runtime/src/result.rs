//! The uniform result type returned by every tier.

use crate::error::ExtractError;
use serde::{Deserialize, Serialize};

/// Default Tier 1 timeout.
pub const STATIC_TIMEOUT_MS: u64 = 10_000;
/// Default Tier 2 timeout.
pub const RENDERED_TIMEOUT_MS: u64 = 30_000;

/// Desktop Chrome user agent sent when the caller does not supply one.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Which tier produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    /// Plain HTTP GET plus selector rules.
    Static,
    /// Headless browser plus selector rules on the live DOM.
    Rendered,
    /// Structured-output language model over the rendered markup.
    Ai,
}

/// Taxonomy tag attached to failed results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Network,
    Render,
    Parse,
    Ai,
}

/// Extracted product fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductData {
    pub title: Option<String>,
    /// Hundredths of the major currency unit.
    pub price: Option<u64>,
    /// Three uppercase letters (ISO 4217).
    pub currency: Option<String>,
    /// Absolute URL.
    pub image_url: Option<String>,
}

impl ProductData {
    /// Title, price and image are all present.
    pub fn is_complete(&self) -> bool {
        self.title.as_deref().is_some_and(|t| !t.is_empty())
            && self.price.is_some()
            && self.image_url.is_some()
    }
}

/// Outcome of one extraction attempt. Created fresh per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub success: bool,
    /// Present iff `success`.
    pub data: Option<ProductData>,
    /// Present iff `!success`.
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_kind: Option<ErrorKind>,
    pub method: ExtractionMethod,
}

impl ExtractionResult {
    pub fn success(data: ProductData, method: ExtractionMethod) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
            method,
        }
    }

    pub fn failure(err: ExtractError, method: ExtractionMethod) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            method,
        }
    }

    /// Successful and carrying title, price and image.
    pub fn is_complete(&self) -> bool {
        self.success && self.data.as_ref().is_some_and(ProductData::is_complete)
    }
}

/// Per-call knobs supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionConfig {
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl ExtractionConfig {
    pub fn new(timeout_ms: u64, user_agent: impl Into<String>) -> Self {
        Self {
            timeout_ms,
            user_agent: user_agent.into(),
        }
    }

    /// Tier 1 defaults.
    pub fn static_default() -> Self {
        Self::new(STATIC_TIMEOUT_MS, DEFAULT_USER_AGENT)
    }

    /// Tier 2 defaults.
    pub fn rendered_default() -> Self {
        Self::new(RENDERED_TIMEOUT_MS, DEFAULT_USER_AGENT)
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self::static_default()
    }
}
