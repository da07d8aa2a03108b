//! Structured-output model clients.
//!
//! Each provider exposes schema-constrained generation differently: OpenAI
//! takes a `json_schema` response format, Anthropic a forced tool call, and
//! Ollama a `format` schema. [`HttpStructuredModel`] hides that behind the
//! [`StructuredModel`] trait so the extractor only sees a JSON value.

use super::provider::{AiSettings, Provider};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 1024;

/// One schema-constrained generation request.
#[derive(Debug, Clone, Copy)]
pub struct StructuredRequest<'a> {
    /// System prompt.
    pub instructions: &'a str,
    /// User content (the page excerpt).
    pub content: &'a str,
    /// JSON Schema the response must satisfy.
    pub schema: &'a Value,
    pub schema_name: &'a str,
}

/// A model that answers with an object conforming to a schema.
#[async_trait]
pub trait StructuredModel: Send + Sync {
    async fn generate(&self, model: &str, request: &StructuredRequest<'_>) -> Result<Value>;
}

/// reqwest-backed client for one provider.
pub struct HttpStructuredModel {
    client: reqwest::Client,
    provider: Provider,
    base_url: String,
    api_key: Option<String>,
}

impl HttpStructuredModel {
    pub fn new(
        provider: Provider,
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout_ms: u64,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_default();

        Self {
            client,
            provider,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Client for the active provider in `settings`.
    pub fn from_settings(settings: &AiSettings) -> Self {
        Self::new(
            settings.provider,
            settings.base_url(),
            settings.api_key().map(str::to_string),
            settings.timeout_ms,
        )
    }

    fn api_key(&self) -> Result<&str> {
        match (self.api_key.as_deref(), self.provider.api_key_env_var()) {
            (Some(key), _) if !key.is_empty() => Ok(key),
            (_, Some(var)) => bail!("{var} is not set"),
            (_, None) => Ok(""),
        }
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let mut req = self.client.post(&url).json(body);
        match self.provider {
            Provider::OpenAi => req = req.bearer_auth(self.api_key()?),
            Provider::Anthropic => {
                req = req
                    .header("x-api-key", self.api_key()?)
                    .header("anthropic-version", ANTHROPIC_VERSION)
            }
            Provider::Ollama => {}
        }

        debug!("POST {url}");
        let resp = req
            .send()
            .await
            .with_context(|| format!("{} request failed", self.provider))?;
        let status = resp.status();
        let text = resp.text().await.context("failed to read model response")?;
        if !status.is_success() {
            let snippet: String = text.chars().take(300).collect();
            bail!("{} returned HTTP {}: {snippet}", self.provider, status.as_u16());
        }
        serde_json::from_str(&text).context("model response was not JSON")
    }

    async fn openai(&self, model: &str, request: &StructuredRequest<'_>) -> Result<Value> {
        let body = json!({
            "model": model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": request.instructions},
                {"role": "user", "content": request.content},
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema_name,
                    "strict": true,
                    "schema": request.schema,
                },
            },
        });
        let resp = self.post("/chat/completions", &body).await?;
        let message = &resp["choices"][0]["message"];
        if let Some(refusal) = message["refusal"].as_str() {
            bail!("model refused: {refusal}");
        }
        let content = message["content"]
            .as_str()
            .context("response has no message content")?;
        serde_json::from_str(content).context("message content was not valid JSON")
    }

    async fn anthropic(&self, model: &str, request: &StructuredRequest<'_>) -> Result<Value> {
        let body = json!({
            "model": model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "temperature": 0,
            "system": request.instructions,
            "messages": [{"role": "user", "content": request.content}],
            "tools": [{
                "name": request.schema_name,
                "description": "Record the extracted product fields.",
                "input_schema": request.schema,
            }],
            "tool_choice": {"type": "tool", "name": request.schema_name},
        });
        let resp = self.post("/messages", &body).await?;
        resp["content"]
            .as_array()
            .and_then(|blocks| blocks.iter().find(|b| b["type"] == "tool_use"))
            .map(|block| block["input"].clone())
            .context("response has no tool_use block")
    }

    async fn ollama(&self, model: &str, request: &StructuredRequest<'_>) -> Result<Value> {
        let body = json!({
            "model": model,
            "stream": false,
            "format": request.schema,
            "options": {"temperature": 0},
            "messages": [
                {"role": "system", "content": request.instructions},
                {"role": "user", "content": request.content},
            ],
        });
        let resp = self.post("/api/chat", &body).await?;
        let content = resp["message"]["content"]
            .as_str()
            .context("response has no message content")?;
        serde_json::from_str(content).context("message content was not valid JSON")
    }
}

#[async_trait]
impl StructuredModel for HttpStructuredModel {
    async fn generate(&self, model: &str, request: &StructuredRequest<'_>) -> Result<Value> {
        match self.provider {
            Provider::OpenAi => self.openai(model, request).await,
            Provider::Anthropic => self.anthropic(model, request).await,
            Provider::Ollama => self.ollama(model, request).await,
        }
    }
}
