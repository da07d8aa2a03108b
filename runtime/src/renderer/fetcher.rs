//! Tier 2: headless-browser render plus selector rules, with AI fallback.

use super::stability::{wait_for_stable_dom, StabilityOptions, StabilityOutcome};
use super::{RenderContext, SharedRenderer};
use crate::acquisition::selectors::SelectorRuleSet;
use crate::ai::FallbackExtractor;
use crate::error::{ConfigError, ExtractError};
use crate::pipeline::ProductSource;
use crate::result::{ExtractionConfig, ExtractionMethod, ExtractionResult, ProductData};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the rendered page yielded before any fallback.
enum Rendered {
    /// Selector rules found every required field.
    Complete(ProductData),
    /// Selectors were skipped or came up short; hand the markup on.
    Markup { html: String, final_url: String },
}

/// Owns an open page until it is closed.
///
/// If the render future is dropped before [`OpenPage::close`] runs, `Drop`
/// hands the page to the runtime to be closed in the background.
struct OpenPage(Option<Box<dyn RenderContext>>);

impl OpenPage {
    fn context(&mut self) -> Result<&mut dyn RenderContext, ExtractError> {
        match self.0.as_mut() {
            Some(ctx) => Ok(ctx.as_mut()),
            None => Err(ExtractError::Render("page already closed".into())),
        }
    }

    async fn close(mut self) {
        if let Some(ctx) = self.0.take() {
            if let Err(e) = ctx.close().await {
                debug!("page close failed: {e:#}");
            }
        }
    }
}

impl Drop for OpenPage {
    fn drop(&mut self) {
        let Some(ctx) = self.0.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("render abandoned, closing page in background");
                handle.spawn(async move {
                    if let Err(e) = ctx.close().await {
                        debug!("page close failed: {e:#}");
                    }
                });
            }
            Err(_) => warn!("render abandoned outside a runtime, page left open"),
        }
    }
}

/// Renders pages in the shared browser and applies the selector rule table
/// to the live DOM. Incomplete pages go to the injected fallback extractor.
pub struct RenderedFetcher {
    renderer: Arc<SharedRenderer>,
    rules: Arc<SelectorRuleSet>,
    fallback: Arc<dyn FallbackExtractor>,
    stability: StabilityOptions,
    force_ai: bool,
}

impl RenderedFetcher {
    pub fn new(
        renderer: Arc<SharedRenderer>,
        rules: Arc<SelectorRuleSet>,
        fallback: Arc<dyn FallbackExtractor>,
    ) -> Self {
        Self {
            renderer,
            rules,
            fallback,
            stability: StabilityOptions::default(),
            force_ai: false,
        }
    }

    pub fn with_stability(mut self, stability: StabilityOptions) -> Self {
        self.stability = stability;
        self
    }

    /// Skip the selector step and send rendered markup straight to the fallback.
    pub fn with_force_ai(mut self, force_ai: bool) -> Self {
        self.force_ai = force_ai;
        self
    }

    /// Render `url` and extract product fields.
    ///
    /// Every data, network, and render failure comes back as a failed result.
    /// Only a [`ConfigError`] from the fallback extractor is returned as `Err`.
    /// The page is closed on every path; the browser is left running.
    pub async fn fetch_rendered(
        &self,
        url: &str,
        config: &ExtractionConfig,
    ) -> Result<ExtractionResult, ConfigError> {
        let renderer = match self.renderer.get().await {
            Ok(r) => r,
            Err(e) => return Ok(render_failure(format!("browser unavailable: {e:#}"))),
        };
        let mut page = match renderer.new_context().await {
            Ok(c) => OpenPage(Some(c)),
            Err(e) => return Ok(render_failure(format!("failed to open page: {e:#}"))),
        };

        let rendered = self.render(&mut page, url, config).await;
        page.close().await;

        match rendered {
            Ok(Rendered::Complete(data)) => {
                info!("rendered selectors matched for {url}");
                Ok(ExtractionResult::success(data, ExtractionMethod::Rendered))
            }
            Ok(Rendered::Markup { html, final_url }) => {
                info!("handing {} chars of rendered markup to AI extraction", html.len());
                self.fallback.extract(&final_url, &html).await
            }
            Err(e) => {
                warn!("rendered fetch of {url} failed: {e}");
                Ok(ExtractionResult::failure(e, ExtractionMethod::Rendered))
            }
        }
    }

    async fn render(
        &self,
        page: &mut OpenPage,
        url: &str,
        config: &ExtractionConfig,
    ) -> Result<Rendered, ExtractError> {
        let ctx = page.context()?;
        ctx.prepare(&config.user_agent)
            .await
            .map_err(|e| ExtractError::Render(format!("page setup failed: {e:#}")))?;

        let nav = ctx.navigate(url, config.timeout_ms).await?;
        debug!("DOMContentLoaded for {} after {}ms", nav.final_url, nav.load_time_ms);

        match wait_for_stable_dom(ctx, &self.stability).await {
            StabilityOutcome::Stable { elapsed_ms } => debug!("DOM stable after {elapsed_ms}ms"),
            StabilityOutcome::TimedOut { elapsed_ms } => {
                warn!("DOM still changing after {elapsed_ms}ms, using current markup")
            }
        }

        let html = ctx
            .get_html()
            .await
            .map_err(|e| {
                ExtractError::Render(format!("failed to read rendered markup: {e:#}"))
            })?;

        if self.force_ai {
            debug!("force-AI mode, skipping rendered selectors");
            return Ok(Rendered::Markup {
                html,
                final_url: nav.final_url,
            });
        }

        match ctx.select_fields(&self.rules).await {
            Ok(fields) => {
                let data = fields.into_product(&nav.final_url);
                if data.is_complete() {
                    return Ok(Rendered::Complete(data));
                }
                debug!(
                    "rendered selectors incomplete: title={} price={} image={}",
                    data.title.is_some(),
                    data.price.is_some(),
                    data.image_url.is_some()
                );
            }
            Err(e) => warn!("selector script failed: {e:#}"),
        }

        Ok(Rendered::Markup {
            html,
            final_url: nav.final_url,
        })
    }
}

fn render_failure(message: String) -> ExtractionResult {
    ExtractionResult::failure(ExtractError::Render(message), ExtractionMethod::Rendered)
}

#[async_trait]
impl ProductSource for RenderedFetcher {
    async fn fetch(
        &self,
        url: &str,
        config: &ExtractionConfig,
    ) -> Result<ExtractionResult, ConfigError> {
        self.fetch_rendered(url, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::testing::{FakePage, FakeRenderer};
    use crate::renderer::Renderer;
    use crate::result::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records the markup it receives and answers with a fixed result.
    #[derive(Default)]
    struct RecordingFallback {
        calls: AtomicUsize,
        last_html: Mutex<Option<String>>,
        fail_config: bool,
    }

    #[async_trait]
    impl FallbackExtractor for RecordingFallback {
        async fn extract(&self, _url: &str, html: &str) -> Result<ExtractionResult, ConfigError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_html.lock().unwrap() = Some(html.to_string());
            if self.fail_config {
                return Err(ConfigError::MissingModel {
                    provider: "openai",
                    env_var: "OPENAI_MODEL",
                });
            }
            let data = ProductData {
                title: Some("From AI".into()),
                price: Some(4200),
                currency: Some("USD".into()),
                image_url: None,
            };
            Ok(ExtractionResult::success(data, ExtractionMethod::Ai))
        }
    }

    const FULL_PAGE: &str = r#"<html><body>
        <h1 id="productTitle">Rendered Lamp</h1>
        <span class="a-price"><span class="a-offscreen">$49.00</span></span>
        <img id="landingImage" data-old-hires="https://m.media.test/lamp.jpg"
            src="data:image/gif;base64,R0lGOD">
    </body></html>"#;

    const EMPTY_PAGE: &str = "<html><body><div id='app'>Loading</div></body></html>";

    fn setup(
        page: FakePage,
        fallback: Arc<RecordingFallback>,
    ) -> (RenderedFetcher, Arc<FakeRenderer>) {
        let fake = Arc::new(FakeRenderer::new(page));
        let shared = Arc::new(SharedRenderer::with_renderer(fake.clone() as Arc<dyn Renderer>));
        let stability = StabilityOptions {
            quiet_window_ms: 0,
            ..StabilityOptions::default()
        };
        let fetcher = RenderedFetcher::new(shared, Arc::new(SelectorRuleSet::builtin()), fallback)
            .with_stability(stability);
        (fetcher, fake)
    }

    fn page(html: &str) -> FakePage {
        FakePage {
            html: html.to_string(),
            ..FakePage::default()
        }
    }

    #[tokio::test]
    async fn test_selectors_on_rendered_dom() {
        let fallback = Arc::new(RecordingFallback::default());
        let (fetcher, fake) = setup(page(FULL_PAGE), fallback.clone());

        let result = fetcher
            .fetch_rendered("https://shop.test/lamp", &ExtractionConfig::rendered_default())
            .await
            .unwrap();

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.method, ExtractionMethod::Rendered);
        let data = result.data.unwrap();
        assert_eq!(data.price, Some(4900));
        assert_eq!(data.image_url.as_deref(), Some("https://m.media.test/lamp.jpg"));
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fake.closed.load(Ordering::SeqCst), 1);
        assert_eq!(fake.active_contexts(), 0);
    }

    #[tokio::test]
    async fn test_incomplete_page_falls_back_with_markup() {
        let fallback = Arc::new(RecordingFallback::default());
        let (fetcher, fake) = setup(page(EMPTY_PAGE), fallback.clone());

        let result = fetcher
            .fetch_rendered("https://shop.test/spa", &ExtractionConfig::rendered_default())
            .await
            .unwrap();

        assert_eq!(result.method, ExtractionMethod::Ai);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.last_html.lock().unwrap().as_deref(), Some(EMPTY_PAGE));
        assert_eq!(fake.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_ai_skips_selectors() {
        let fallback = Arc::new(RecordingFallback::default());
        let (fetcher, _fake) = setup(page(FULL_PAGE), fallback.clone());
        let fetcher = fetcher.with_force_ai(true);

        let result = fetcher
            .fetch_rendered("https://shop.test/lamp", &ExtractionConfig::rendered_default())
            .await
            .unwrap();

        assert_eq!(result.method, ExtractionMethod::Ai);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_navigation_timeout_is_render_failure() {
        let fallback = Arc::new(RecordingFallback::default());
        let page = FakePage {
            navigate_error: Some(ExtractError::NavigationTimeout(30_000)),
            ..FakePage::default()
        };
        let (fetcher, fake) = setup(page, fallback.clone());

        let result = fetcher
            .fetch_rendered("https://slow.test/", &ExtractionConfig::rendered_default())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.method, ExtractionMethod::Rendered);
        assert_eq!(result.error_kind, Some(ErrorKind::Render));
        assert_eq!(result.error.as_deref(), Some("navigation timed out after 30000ms"));
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fake.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_navigation_network_error_is_network_failure() {
        let fallback = Arc::new(RecordingFallback::default());
        let page = FakePage {
            navigate_error: Some(ExtractError::Network("net::ERR_NAME_NOT_RESOLVED".into())),
            ..FakePage::default()
        };
        let (fetcher, fake) = setup(page, fallback);

        let result = fetcher
            .fetch_rendered("https://nowhere.invalid/", &ExtractionConfig::rendered_default())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Network));
        assert!(result.error.unwrap().contains("ERR_NAME_NOT_RESOLVED"));
        assert_eq!(fake.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_config_error_propagates_after_close() {
        let fallback = Arc::new(RecordingFallback {
            fail_config: true,
            ..RecordingFallback::default()
        });
        let (fetcher, fake) = setup(page(EMPTY_PAGE), fallback);

        let err = fetcher
            .fetch_rendered("https://shop.test/spa", &ExtractionConfig::rendered_default())
            .await
            .unwrap_err();

        assert!(matches!(err, ConfigError::MissingModel { .. }));
        assert_eq!(fake.closed.load(Ordering::SeqCst), 1);
        assert_eq!(fake.active_contexts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_render_still_closes_page() {
        let fallback = Arc::new(RecordingFallback::default());
        let page = FakePage {
            html: EMPTY_PAGE.to_string(),
            lengths: (1..=1000).map(|n| n * 1000).collect(),
            ..FakePage::default()
        };
        let (fetcher, fake) = setup(page, fallback.clone());
        let fetcher = fetcher.with_stability(StabilityOptions::default());

        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            fetcher.fetch_rendered("https://shop.test/spa", &ExtractionConfig::rendered_default()),
        )
        .await;
        assert!(outcome.is_err(), "render should still be waiting on the DOM");

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(fake.opened.load(Ordering::SeqCst), 1);
        assert_eq!(fake.closed.load(Ordering::SeqCst), 1);
        assert_eq!(fake.active_contexts(), 0);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_page_close_error_does_not_fail_result() {
        let fallback = Arc::new(RecordingFallback::default());
        let page = FakePage {
            html: FULL_PAGE.to_string(),
            close_error: Some("target already detached".into()),
            ..FakePage::default()
        };
        let (fetcher, fake) = setup(page, fallback);

        let result = fetcher
            .fetch_rendered("https://shop.test/lamp", &ExtractionConfig::rendered_default())
            .await
            .unwrap();

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.method, ExtractionMethod::Rendered);
        assert_eq!(fake.closed.load(Ordering::SeqCst), 1);
        assert_eq!(fake.active_contexts(), 0);
    }

    #[tokio::test]
    async fn test_browser_launch_failure_is_render_failure() {
        let shared = Arc::new(SharedRenderer::new(|| {
            Box::pin(async { Err::<Arc<dyn Renderer>, _>(anyhow::anyhow!("Chromium not found")) })
        }));
        let fetcher = RenderedFetcher::new(
            shared,
            Arc::new(SelectorRuleSet::builtin()),
            Arc::new(RecordingFallback::default()),
        );

        let result = fetcher
            .fetch_rendered("https://shop.test/", &ExtractionConfig::rendered_default())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Render));
        assert!(result.error.unwrap().contains("Chromium not found"));
    }
}
