//! Error taxonomy for the extraction pipeline.
//!
//! `ExtractError` covers data-level failures. Every tier converts these into a
//! failed [`ExtractionResult`](crate::result::ExtractionResult) instead of
//! returning them. `ConfigError` is the one error that escapes the public API,
//! because it means the deployment is misconfigured rather than that a page
//! failed.

use crate::result::ErrorKind;

/// A data, network, or render failure inside one tier.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("request failed: {0}")]
    Network(String),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("navigation timed out after {0}ms")]
    NavigationTimeout(u64),

    #[error("render failed: {0}")]
    Render(String),

    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("AI extraction failed: {0}")]
    AiExtraction(String),

    #[error("AI extraction found no title or price")]
    AiNoData,
}

impl ExtractError {
    /// Which bucket of the taxonomy this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::Network(_)
            | ExtractError::HttpStatus { .. }
            | ExtractError::Timeout(_) => ErrorKind::Network,
            ExtractError::NavigationTimeout(_) | ExtractError::Render(_) => ErrorKind::Render,
            ExtractError::MissingFields(_) => ErrorKind::Parse,
            ExtractError::AiExtraction(_) | ExtractError::AiNoData => ErrorKind::Ai,
        }
    }
}

/// Operator-level misconfiguration. Propagated, never folded into a result.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("AI provider `{provider}` selected but {env_var} is not set")]
    MissingModel {
        provider: &'static str,
        env_var: &'static str,
    },

    #[error("unknown AI provider `{0}` (expected openai, anthropic or ollama)")]
    UnknownProvider(String),

    #[error("invalid selector rules: {0}")]
    InvalidRules(String),
}
