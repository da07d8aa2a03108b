//! The orchestrator: the single public entry point.
//!
//! Tries the static tier, escalates to the rendered tier when the static
//! result is a failure or lacks a title, price, or image, and returns
//! whatever the rendered tier produces. No retries happen here.

use crate::acquisition::http_client::HttpClient;
use crate::acquisition::selectors::SelectorRuleSet;
use crate::acquisition::static_fetch::StaticFetcher;
use crate::ai::AiExtractor;
use crate::config::PipelineConfig;
use crate::error::ConfigError;
use crate::renderer::chromium::ChromiumOptions;
use crate::renderer::fetcher::RenderedFetcher;
use crate::renderer::SharedRenderer;
use crate::result::{ExtractionConfig, ExtractionResult, RENDERED_TIMEOUT_MS, STATIC_TIMEOUT_MS};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// One extraction tier as seen by the orchestrator.
#[async_trait]
pub trait ProductSource: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        config: &ExtractionConfig,
    ) -> Result<ExtractionResult, ConfigError>;
}

/// Which tiers the orchestrator may skip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub force_ai: bool,
    pub skip_static: bool,
}

/// Static tier, then rendered tier.
pub struct Pipeline {
    static_tier: Arc<dyn ProductSource>,
    rendered_tier: Arc<dyn ProductSource>,
    options: PipelineOptions,
    user_agent: String,
    renderer: Option<Arc<SharedRenderer>>,
}

impl Pipeline {
    pub fn new(
        static_tier: Arc<dyn ProductSource>,
        rendered_tier: Arc<dyn ProductSource>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            static_tier,
            rendered_tier,
            options,
            user_agent: crate::result::DEFAULT_USER_AGENT.to_string(),
            renderer: None,
        }
    }

    /// Wire the production tiers: reqwest, lazily launched Chromium, and the
    /// configured model provider.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let rules = Arc::new(SelectorRuleSet::builtin());
        let renderer = Arc::new(SharedRenderer::chromium(ChromiumOptions {
            chromium_path: config.chromium_path.clone(),
        }));
        let ai = Arc::new(AiExtractor::from_settings(config.ai.clone()));

        let static_tier = Arc::new(StaticFetcher::new(HttpClient::new(), Arc::clone(&rules)));
        let rendered_tier = Arc::new(
            RenderedFetcher::new(Arc::clone(&renderer), rules, ai)
                .with_stability(config.stability)
                .with_force_ai(config.debug.force_ai),
        );

        let options = PipelineOptions {
            force_ai: config.debug.force_ai,
            skip_static: config.debug.skip_static,
        };
        Self::new(static_tier, rendered_tier, options)
            .with_user_agent(config.user_agent.clone())
            .with_renderer(renderer)
    }

    /// Default user agent when a call passes no [`ExtractionConfig`].
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Browser handle to release on [`Pipeline::shutdown`].
    pub fn with_renderer(mut self, renderer: Arc<SharedRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Extract product data from `url`.
    ///
    /// With `config` the same timeout and user agent apply to both tiers;
    /// without it each tier gets its own default timeout. Only a
    /// configuration error is returned as `Err`.
    pub async fn scrape_product(
        &self,
        url: &str,
        config: Option<&ExtractionConfig>,
    ) -> Result<ExtractionResult, ConfigError> {
        let static_config = config
            .cloned()
            .unwrap_or_else(|| ExtractionConfig::new(STATIC_TIMEOUT_MS, self.user_agent.clone()));
        let rendered_config = config
            .cloned()
            .unwrap_or_else(|| ExtractionConfig::new(RENDERED_TIMEOUT_MS, self.user_agent.clone()));

        if self.options.force_ai || self.options.skip_static {
            info!("skipping static tier for {url}");
        } else {
            let result = self.static_tier.fetch(url, &static_config).await?;
            if result.is_complete() {
                info!("static tier complete for {url}");
                return Ok(result);
            }
            info!(
                "static tier insufficient for {url} ({}), escalating to rendered tier",
                result.error.as_deref().unwrap_or("title missing")
            );
        }

        let result = self.rendered_tier.fetch(url, &rendered_config).await?;
        info!(
            "{url}: success={} method={:?}",
            result.success, result.method
        );
        Ok(result)
    }

    /// Close the shared browser if one was launched.
    pub async fn shutdown(&self) -> Result<()> {
        match &self.renderer {
            Some(renderer) => renderer.shutdown().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;
    use crate::result::{ExtractionMethod, ProductData};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A tier that returns a fixed result and counts calls.
    struct StubSource {
        result: Result<ExtractionResult, ConfigError>,
        calls: AtomicUsize,
        configs: Mutex<Vec<ExtractionConfig>>,
    }

    impl StubSource {
        fn new(result: Result<ExtractionResult, ConfigError>) -> Arc<Self> {
            Arc::new(Self {
                result,
                calls: AtomicUsize::new(0),
                configs: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProductSource for StubSource {
        async fn fetch(
            &self,
            _url: &str,
            config: &ExtractionConfig,
        ) -> Result<ExtractionResult, ConfigError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.configs.lock().unwrap().push(config.clone());
            self.result.clone()
        }
    }

    fn product(title: Option<&str>) -> ProductData {
        ProductData {
            title: title.map(str::to_string),
            price: Some(1999),
            currency: Some("GBP".into()),
            image_url: Some("https://cdn.test/a.jpg".into()),
        }
    }

    fn ok(data: ProductData, method: ExtractionMethod) -> Result<ExtractionResult, ConfigError> {
        Ok(ExtractionResult::success(data, method))
    }

    #[tokio::test]
    async fn test_complete_static_result_short_circuits() {
        let static_tier = StubSource::new(ok(product(Some("Mug")), ExtractionMethod::Static));
        let rendered = StubSource::new(ok(product(Some("Mug")), ExtractionMethod::Rendered));
        let pipeline =
            Pipeline::new(static_tier.clone(), rendered.clone(), PipelineOptions::default());

        let result = pipeline.scrape_product("https://shop.test/", None).await.unwrap();
        assert_eq!(result.method, ExtractionMethod::Static);
        assert_eq!(static_tier.calls(), 1);
        assert_eq!(rendered.calls(), 0);
    }

    #[tokio::test]
    async fn test_static_success_without_title_escalates() {
        let static_tier = StubSource::new(ok(product(None), ExtractionMethod::Static));
        let rendered = StubSource::new(ok(product(Some("Mug")), ExtractionMethod::Rendered));
        let pipeline =
            Pipeline::new(static_tier.clone(), rendered.clone(), PipelineOptions::default());

        let result = pipeline.scrape_product("https://shop.test/", None).await.unwrap();
        assert_eq!(result.method, ExtractionMethod::Rendered);
        assert_eq!(rendered.calls(), 1);
    }

    #[tokio::test]
    async fn test_rendered_failure_is_returned_as_is() {
        let static_tier = StubSource::new(Ok(ExtractionResult::failure(
            ExtractError::Network("connection refused".into()),
            ExtractionMethod::Static,
        )));
        let rendered = StubSource::new(Ok(ExtractionResult::failure(
            ExtractError::Network("net::ERR_CONNECTION_REFUSED".into()),
            ExtractionMethod::Rendered,
        )));
        let pipeline = Pipeline::new(static_tier, rendered, PipelineOptions::default());

        let result = pipeline.scrape_product("https://down.test/", None).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.method, ExtractionMethod::Rendered);
        assert!(result.error.unwrap().contains("ERR_CONNECTION_REFUSED"));
    }

    #[tokio::test]
    async fn test_force_ai_never_calls_static_tier() {
        let static_tier = StubSource::new(ok(product(Some("Mug")), ExtractionMethod::Static));
        let rendered = StubSource::new(ok(product(Some("Mug")), ExtractionMethod::Ai));
        let options = PipelineOptions {
            force_ai: true,
            ..PipelineOptions::default()
        };
        let pipeline = Pipeline::new(static_tier.clone(), rendered.clone(), options);

        let result = pipeline.scrape_product("https://shop.test/", None).await.unwrap();
        assert_eq!(result.method, ExtractionMethod::Ai);
        assert_eq!(static_tier.calls(), 0);
        assert_eq!(rendered.calls(), 1);
    }

    #[tokio::test]
    async fn test_skip_static() {
        let static_tier = StubSource::new(ok(product(Some("Mug")), ExtractionMethod::Static));
        let rendered = StubSource::new(ok(product(Some("Mug")), ExtractionMethod::Rendered));
        let options = PipelineOptions {
            skip_static: true,
            ..PipelineOptions::default()
        };
        let pipeline = Pipeline::new(static_tier.clone(), rendered.clone(), options);

        pipeline.scrape_product("https://shop.test/", None).await.unwrap();
        assert_eq!(static_tier.calls(), 0);
        assert_eq!(rendered.calls(), 1);
    }

    #[tokio::test]
    async fn test_config_error_propagates() {
        let static_tier = StubSource::new(ok(product(None), ExtractionMethod::Static));
        let rendered = StubSource::new(Err(ConfigError::MissingModel {
            provider: "openai",
            env_var: "OPENAI_MODEL",
        }));
        let pipeline = Pipeline::new(static_tier, rendered, PipelineOptions::default());

        let err = pipeline.scrape_product("https://shop.test/", None).await.unwrap_err();
        assert!(matches!(err, ConfigError::MissingModel { .. }));
    }

    #[tokio::test]
    async fn test_default_timeouts_per_tier() {
        let static_tier = StubSource::new(ok(product(None), ExtractionMethod::Static));
        let rendered = StubSource::new(ok(product(Some("Mug")), ExtractionMethod::Rendered));
        let pipeline =
            Pipeline::new(static_tier.clone(), rendered.clone(), PipelineOptions::default())
                .with_user_agent("UA/1");

        pipeline.scrape_product("https://shop.test/", None).await.unwrap();
        let s = static_tier.configs.lock().unwrap()[0].clone();
        let r = rendered.configs.lock().unwrap()[0].clone();
        assert_eq!((s.timeout_ms, s.user_agent.as_str()), (STATIC_TIMEOUT_MS, "UA/1"));
        assert_eq!((r.timeout_ms, r.user_agent.as_str()), (RENDERED_TIMEOUT_MS, "UA/1"));

        let explicit = ExtractionConfig::new(5_000, "UA/2");
        pipeline
            .scrape_product("https://shop.test/", Some(&explicit))
            .await
            .unwrap();
        assert_eq!(rendered.configs.lock().unwrap()[1], explicit);
    }
}
