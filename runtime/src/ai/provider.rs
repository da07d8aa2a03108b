//! Model provider selection and per-provider settings.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default timeout for one model call.
pub const MODEL_TIMEOUT_MS: u64 = 60_000;

/// A structured-output model vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAi,
    Anthropic,
    Ollama,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Anthropic, Provider::Ollama];

    pub fn id(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Ollama => "ollama",
        }
    }

    /// Environment variable naming the model for this provider.
    pub fn model_env_var(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_MODEL",
            Provider::Anthropic => "ANTHROPIC_MODEL",
            Provider::Ollama => "OLLAMA_MODEL",
        }
    }

    /// Environment variable holding the API key. Local Ollama needs none.
    pub fn api_key_env_var(&self) -> Option<&'static str> {
        match self {
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::Anthropic => Some("ANTHROPIC_API_KEY"),
            Provider::Ollama => None,
        }
    }

    pub fn base_url_env_var(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_BASE_URL",
            Provider::Anthropic => "ANTHROPIC_BASE_URL",
            Provider::Ollama => "OLLAMA_BASE_URL",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Anthropic => "https://api.anthropic.com/v1",
            Provider::Ollama => "http://localhost:11434",
        }
    }

    /// Input budget in characters for the condensed page excerpt.
    /// Local models get a much smaller context than hosted ones.
    pub fn default_max_chars(&self) -> usize {
        match self {
            Provider::OpenAi => 100_000,
            Provider::Anthropic => 150_000,
            Provider::Ollama => 15_000,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Provider::ALL
            .into_iter()
            .find(|p| p.id() == wanted)
            .ok_or_else(|| ConfigError::UnknownProvider(s.trim().to_string()))
    }
}

/// Model name, credentials, and endpoint for one provider.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProviderEndpoint {
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl fmt::Debug for ProviderEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEndpoint")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Everything the AI extractor needs to pick and call a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiSettings {
    pub provider: Provider,
    pub openai: ProviderEndpoint,
    pub anthropic: ProviderEndpoint,
    pub ollama: ProviderEndpoint,
    /// Overrides the provider's default input budget.
    pub max_chars: Option<usize>,
    pub timeout_ms: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self::new(Provider::default())
    }
}

impl AiSettings {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            openai: ProviderEndpoint::default(),
            anthropic: ProviderEndpoint::default(),
            ollama: ProviderEndpoint::default(),
            max_chars: None,
            timeout_ms: MODEL_TIMEOUT_MS,
        }
    }

    /// Set the model name for `provider`.
    pub fn with_model(mut self, provider: Provider, model: impl Into<String>) -> Self {
        self.endpoint_mut(provider).model = Some(model.into());
        self
    }

    pub fn endpoint(&self, provider: Provider) -> &ProviderEndpoint {
        match provider {
            Provider::OpenAi => &self.openai,
            Provider::Anthropic => &self.anthropic,
            Provider::Ollama => &self.ollama,
        }
    }

    pub fn endpoint_mut(&mut self, provider: Provider) -> &mut ProviderEndpoint {
        match provider {
            Provider::OpenAi => &mut self.openai,
            Provider::Anthropic => &mut self.anthropic,
            Provider::Ollama => &mut self.ollama,
        }
    }

    /// Model name for the active provider.
    ///
    /// A missing or blank name is a configuration error, not a page failure.
    pub fn model_name(&self) -> Result<&str, ConfigError> {
        self.endpoint(self.provider)
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or(ConfigError::MissingModel {
                provider: self.provider.id(),
                env_var: self.provider.model_env_var(),
            })
    }

    /// Character budget for the page excerpt.
    pub fn max_chars(&self) -> usize {
        self.max_chars
            .unwrap_or_else(|| self.provider.default_max_chars())
    }

    pub fn base_url(&self) -> &str {
        self.endpoint(self.provider)
            .base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }

    pub fn api_key(&self) -> Option<&str> {
        self.endpoint(self.provider).api_key.as_deref()
    }
}
