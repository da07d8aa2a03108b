//! Pipeline configuration.
//!
//! [`PipelineConfig`] is a plain value handed to [`Pipeline::from_config`].
//! [`PipelineConfig::from_env`] is the only place that reads the process
//! environment.
//!
//! [`Pipeline::from_config`]: crate::pipeline::Pipeline::from_config

use crate::ai::provider::{AiSettings, Provider};
use crate::error::ConfigError;
use crate::renderer::stability::StabilityOptions;
use crate::result::DEFAULT_USER_AGENT;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

/// Debug switches that change which tiers run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugFlags {
    /// Skip Tier 1 and the rendered selectors; send rendered markup to the model.
    pub force_ai: bool,
    /// Skip Tier 1 only.
    pub skip_static: bool,
    pub verbose: bool,
}

/// Everything needed to build a [`Pipeline`](crate::pipeline::Pipeline).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub debug: DebugFlags,
    pub stability: StabilityOptions,
    pub ai: AiSettings,
    /// Default user agent for both tiers.
    pub user_agent: String,
    pub chromium_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debug: DebugFlags::default(),
            stability: StabilityOptions::default(),
            ai: AiSettings::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            chromium_path: None,
        }
    }
}

impl PipelineConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which returns a variable's value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = StabilityOptions::default();

        let debug = DebugFlags {
            force_ai: flag(get("PRICECHECK_FORCE_AI")),
            skip_static: flag(get("PRICECHECK_SKIP_STATIC")),
            verbose: flag(get("PRICECHECK_VERBOSE")),
        };

        let stability = StabilityOptions {
            max_wait_ms: number(&get, "PRICECHECK_DOM_MAX_WAIT_MS", defaults.max_wait_ms),
            quiet_window_ms: number(
                &get,
                "PRICECHECK_DOM_QUIET_WINDOW_MS",
                defaults.quiet_window_ms,
            ),
            check_interval_ms: number(
                &get,
                "PRICECHECK_DOM_CHECK_INTERVAL_MS",
                defaults.check_interval_ms,
            ),
            html_delta_threshold: number(
                &get,
                "PRICECHECK_DOM_DELTA_THRESHOLD",
                defaults.html_delta_threshold,
            ),
        };

        let provider = match get("PRICECHECK_AI_PROVIDER") {
            Some(id) => Provider::from_str(&id)?,
            None => Provider::default(),
        };
        let mut ai = AiSettings::new(provider);
        for p in Provider::ALL {
            let endpoint = ai.endpoint_mut(p);
            endpoint.model = get(p.model_env_var());
            endpoint.api_key = p.api_key_env_var().and_then(&get);
            endpoint.base_url = get(p.base_url_env_var());
        }
        ai.max_chars = get("PRICECHECK_AI_MAX_CHARS").and_then(|v| match v.parse() {
            Ok(n) => Some(n),
            Err(_) => {
                warn!("ignoring PRICECHECK_AI_MAX_CHARS={v:?}: not a number");
                None
            }
        });

        Ok(Self {
            debug,
            stability,
            ai,
            user_agent: get("PRICECHECK_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            chromium_path: get("PRICECHECK_CHROMIUM_PATH").map(PathBuf::from),
        })
    }
}

fn flag(value: Option<String>) -> bool {
    matches!(
        value.map(|v| v.to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

fn number<T, G>(get: &G, key: &str, default: T) -> T
where
    T: FromStr + Copy,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("ignoring {key}={raw:?}: not a number");
            default
        }),
    }
}
