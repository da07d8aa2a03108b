//! AI-assisted extraction, the last tier.
//!
//! Condenses rendered markup with [`prepare::prepare_html`], asks a
//! structured-output model for `{title, price, currency, imageUrl}`, and
//! normalises the answer into a [`ProductData`].

pub mod client;
pub mod prepare;
pub mod provider;

use crate::error::{ConfigError, ExtractError};
use crate::price::resolve_image_url;
use crate::result::{ExtractionMethod, ExtractionResult, ProductData};
use async_trait::async_trait;
use client::{StructuredModel, StructuredRequest};
use provider::AiSettings;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

const SCHEMA_NAME: &str = "product";

const INSTRUCTIONS: &str = "You extract product data from an e-commerce product page. \
Return the product title, the current selling price as a decimal number in major units \
(the discounted or sale price if one is shown, never the crossed-out list price and never \
a per-unit or per-weight price), the ISO 4217 currency code of that price, and the absolute \
URL of the main product image. Use null for anything the page does not show.";

static PRODUCT_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "type": "object",
        "properties": {
            "title": {"type": ["string", "null"]},
            "price": {"type": ["number", "null"]},
            "currency": {"type": ["string", "null"]},
            "imageUrl": {"type": ["string", "null"]},
        },
        "required": ["title", "price", "currency", "imageUrl"],
        "additionalProperties": false,
    })
});

/// Schema the model answer must satisfy.
pub fn product_schema() -> &'static Value {
    &PRODUCT_SCHEMA
}

/// Extraction from already rendered markup, injected into the rendered tier.
#[async_trait]
pub trait FallbackExtractor: Send + Sync {
    /// Only a configuration problem is an `Err`; everything else is a result.
    async fn extract(&self, url: &str, html: &str) -> Result<ExtractionResult, ConfigError>;
}

/// The structured-output model extractor.
pub struct AiExtractor {
    settings: AiSettings,
    model: Arc<dyn StructuredModel>,
}

impl AiExtractor {
    pub fn new(settings: AiSettings, model: Arc<dyn StructuredModel>) -> Self {
        Self { settings, model }
    }

    /// Extractor talking to the configured provider over HTTP.
    pub fn from_settings(settings: AiSettings) -> Self {
        let model = Arc::new(client::HttpStructuredModel::from_settings(&settings));
        Self::new(settings, model)
    }

    pub fn settings(&self) -> &AiSettings {
        &self.settings
    }

    /// Extract product fields from rendered `html` of the page at `url`.
    ///
    /// Fails with [`ConfigError`] when the active provider has no model name.
    /// Model errors and unusable answers come back as failed results.
    pub async fn extract_with_ai(
        &self,
        url: &str,
        html: &str,
    ) -> Result<ExtractionResult, ConfigError> {
        let model = self.settings.model_name()?;
        let max_chars = self.settings.max_chars();
        let excerpt = prepare::prepare_html(html, max_chars);
        info!(
            "AI extraction via {}/{model}: {} of {} chars",
            self.settings.provider,
            excerpt.chars().count(),
            html.len()
        );

        let instructions = format!("{INSTRUCTIONS}\nPage URL: {url}");
        let request = StructuredRequest {
            instructions: &instructions,
            content: &excerpt,
            schema: product_schema(),
            schema_name: SCHEMA_NAME,
        };

        let answer = match self.model.generate(model, &request).await {
            Ok(v) => v,
            Err(e) => {
                warn!("model call failed: {e:#}");
                return Ok(ExtractionResult::failure(
                    ExtractError::AiExtraction(format!("{e:#}")),
                    ExtractionMethod::Ai,
                ));
            }
        };
        debug!("model answer: {answer}");

        Ok(match interpret(answer, url) {
            Ok(data) => ExtractionResult::success(data, ExtractionMethod::Ai),
            Err(e) => ExtractionResult::failure(e, ExtractionMethod::Ai),
        })
    }
}

#[async_trait]
impl FallbackExtractor for AiExtractor {
    async fn extract(&self, url: &str, html: &str) -> Result<ExtractionResult, ConfigError> {
        self.extract_with_ai(url, html).await
    }
}

#[derive(Debug, Deserialize)]
struct ModelAnswer {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    price: Option<Value>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default, rename = "imageUrl")]
    image_url: Option<String>,
}

/// Normalise a model answer. Needs a JSON object with a title or a price.
fn interpret(answer: Value, page_url: &str) -> Result<ProductData, ExtractError> {
    // serde would read a struct from an array by position
    if !answer.is_object() {
        return Err(ExtractError::AiExtraction(
            "model answer was not a JSON object".into(),
        ));
    }
    let answer: ModelAnswer = serde_json::from_value(answer)
        .map_err(|e| ExtractError::AiExtraction(format!("malformed model answer: {e}")))?;

    let title = answer
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    let price = answer.price.as_ref().and_then(decimal).and_then(to_minor_units);
    let currency = answer
        .currency
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| c.len() == 3 && c.bytes().all(|b| b.is_ascii_uppercase()));
    let image_url = resolve_image_url(answer.image_url.as_deref(), page_url);

    if title.is_none() && price.is_none() {
        return Err(ExtractError::AiNoData);
    }
    Ok(ProductData {
        title,
        price,
        currency,
        image_url,
    })
}

/// Numbers, or numeric strings some local models emit despite the schema.
fn decimal(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Decimal major units to integer hundredths, rounding to nearest.
fn to_minor_units(major: f64) -> Option<u64> {
    if !major.is_finite() || major < 0.0 {
        return None;
    }
    let minor = (major * 100.0).round();
    if minor > u64::MAX as f64 {
        return None;
    }
    Some(minor as u64)
}
