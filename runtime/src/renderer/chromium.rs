//! Chromium-based renderer using chromiumoxide.

use super::{NavigationResult, RenderContext, Renderer};
use crate::error::ExtractError;
use crate::stealth;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
    RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, ResourceType, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, EventDomContentEventFired, NavigateParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Resource types never fetched. Output images are read from DOM attributes,
/// not downloaded.
const BLOCKED_RESOURCES: [ResourceType; 5] = [
    ResourceType::Image,
    ResourceType::Font,
    ResourceType::Stylesheet,
    ResourceType::Media,
    ResourceType::WebSocket,
];

/// Network-level user agent override with headless markers removed.
fn user_agent_override(user_agent: &str) -> SetUserAgentOverrideParams {
    SetUserAgentOverrideParams::new(stealth::sanitize_user_agent(user_agent))
}

/// Launch settings for the shared browser.
#[derive(Debug, Clone, Default)]
pub struct ChromiumOptions {
    /// Explicit binary; auto-discovered when `None`.
    pub chromium_path: Option<PathBuf>,
}

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. PRICECHECK_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("PRICECHECK_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Chrome for Testing unpacked under the user cache dir
    if let Some(cache) = dirs::cache_dir() {
        let base = cache.join("pricecheck/chromium");
        let candidates = if cfg!(target_os = "macos") {
            let app = "Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing";
            vec![
                base.join("chrome-mac-arm64").join(app),
                base.join("chrome-mac-x64").join(app),
            ]
        } else {
            vec![base.join("chrome-linux64/chrome"), base.join("chrome")]
        };
        if let Some(found) = candidates.into_iter().find(|c| c.exists()) {
            return Some(found);
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-based renderer. One browser process, one page per context.
pub struct ChromiumRenderer {
    browser: RwLock<Option<Browser>>,
    handler: Mutex<Option<JoinHandle<()>>>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a headless Chromium instance.
    pub async fn launch(options: &ChromiumOptions) -> Result<Self> {
        let chrome_path = options
            .chromium_path
            .clone()
            .or_else(find_chromium)
            .context("Chromium not found. Set PRICECHECK_CHROMIUM_PATH or install Chrome.")?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(1366, 768)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");
        for arg in stealth::LAUNCH_ARGS {
            builder = builder.arg(*arg);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Spawn the handler task
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler: {e}");
                }
            }
        });

        info!("launched headless Chromium");
        Ok(Self {
            browser: RwLock::new(Some(browser)),
            handler: Mutex::new(Some(handle)),
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let guard = self.browser.read().await;
        let browser = guard.as_ref().context("browser has been shut down")?;
        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            interceptor: None,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(mut browser) = self.browser.write().await.take() {
            if let Err(e) = browser.close().await {
                warn!("browser close failed: {e}");
            }
            let _ = browser.wait().await;
            info!("Chromium shut down");
        }
        let handle = self.handler.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            handle.abort();
        }
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    interceptor: Option<JoinHandle<()>>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumContext {
    /// Fail blocked resource types at the request stage; let the rest through.
    async fn block_resources(&mut self) -> Result<()> {
        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .context("failed to subscribe to paused requests")?;

        let mut enable = EnableParams::builder();
        for resource in BLOCKED_RESOURCES {
            enable = enable.pattern(
                RequestPattern::builder()
                    .url_pattern("*")
                    .resource_type(resource)
                    .request_stage(RequestStage::Request)
                    .build(),
            );
        }
        self.page
            .execute(enable.build())
            .await
            .context("failed to enable request interception")?;

        let page = self.page.clone();
        self.interceptor = Some(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let id = event.request_id.clone();
                let outcome = if BLOCKED_RESOURCES.contains(&event.resource_type) {
                    page.execute(FailRequestParams::new(id, ErrorReason::BlockedByClient))
                        .await
                        .map(|_| ())
                } else {
                    page.execute(ContinueRequestParams::new(id)).await.map(|_| ())
                };
                if let Err(e) = outcome {
                    debug!("request interception: {e}");
                }
            }
        }));
        Ok(())
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn prepare(&mut self, user_agent: &str) -> Result<()> {
        for script in stealth::init_scripts() {
            self.page
                .execute(AddScriptToEvaluateOnNewDocumentParams::new(*script))
                .await
                .context("failed to install init script")?;
        }
        self.page
            .set_user_agent(user_agent_override(user_agent))
            .await
            .context("failed to set user agent")?;
        self.block_resources().await
    }

    async fn navigate(
        &mut self,
        url: &str,
        timeout_ms: u64,
    ) -> Result<NavigationResult, ExtractError> {
        let start = Instant::now();

        let mut dom_ready = self
            .page
            .event_listener::<EventDomContentEventFired>()
            .await
            .map_err(|e| {
                ExtractError::Render(format!("failed to subscribe to DOMContentLoaded: {e}"))
            })?;

        let page = &self.page;
        let load = async {
            let resp = page
                .execute(NavigateParams::new(url))
                .await
                .map_err(|e| ExtractError::Render(format!("navigation failed: {e}")))?;
            if let Some(error_text) = resp.result.error_text.as_deref() {
                return Err(ExtractError::Network(format!("{error_text} loading {url}")));
            }
            dom_ready.next().await;
            Ok(())
        };

        match tokio::time::timeout(Duration::from_millis(timeout_ms), load).await {
            Ok(Ok(())) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms: start.elapsed().as_millis() as u64,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ExtractError::NavigationTimeout(timeout_ms)),
        }
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;

        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn get_html(&self) -> Result<String> {
        let result = self
            .page
            .evaluate("document.documentElement.outerHTML")
            .await
            .context("failed to get HTML")?;

        let html: String = result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert HTML result: {e:?}"))?;

        Ok(html)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        if let Some(interceptor) = &self.interceptor {
            interceptor.abort();
        }
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        self.page.close().await.context("failed to close page")?;
        Ok(())
    }
}
