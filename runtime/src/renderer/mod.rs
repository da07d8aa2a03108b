//! Renderer abstraction for browser-based page rendering.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide), plus
//! [`SharedRenderer`], the lazily launched process-wide browser handle.

pub mod chromium;
pub mod fetcher;
pub mod stability;

use crate::acquisition::selectors::{RawFields, SelectorRuleSet};
use crate::error::ExtractError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The URL the page ended up on.
    pub final_url: String,
    /// Time until DOMContentLoaded in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab) for rendering pages.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Install fingerprint evasion, the user agent, and resource blocking.
    /// Must be called before `navigate`.
    async fn prepare(&mut self, user_agent: &str) -> Result<()>;
    /// Navigate and wait for DOMContentLoaded, bounded by `timeout_ms`.
    async fn navigate(
        &mut self,
        url: &str,
        timeout_ms: u64,
    ) -> Result<NavigationResult, ExtractError>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Get the full page HTML.
    async fn get_html(&self) -> Result<String>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;

    /// Length of the serialized DOM, polled by the stability wait.
    async fn html_length(&self) -> Result<usize> {
        let value = self
            .execute_js("document.documentElement.outerHTML.length")
            .await?;
        let len = value.as_u64().context("outerHTML length was not a number")?;
        Ok(len as usize)
    }

    /// Apply a selector rule table to the live DOM.
    async fn select_fields(&self, rules: &SelectorRuleSet) -> Result<RawFields> {
        let value = self.execute_js(&rules.page_script()).await?;
        serde_json::from_value(value).context("selector script returned an unexpected shape")
    }
}

type LaunchFn = Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn Renderer>>> + Send + Sync>;

/// Process-wide browser handle, launched on first use.
///
/// Concurrent first calls launch exactly one browser. A failed launch leaves
/// the cell empty so the next call tries again. The browser is only torn
/// down by [`SharedRenderer::shutdown`].
pub struct SharedRenderer {
    cell: OnceCell<Arc<dyn Renderer>>,
    launch: LaunchFn,
}

impl SharedRenderer {
    /// Lazily launch with the given function.
    pub fn new<F>(launch: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Arc<dyn Renderer>>> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            launch: Box::new(launch),
        }
    }

    /// Lazily launch headless Chromium.
    pub fn chromium(options: chromium::ChromiumOptions) -> Self {
        Self::new(move || {
            let options = options.clone();
            Box::pin(async move {
                let renderer = chromium::ChromiumRenderer::launch(&options).await?;
                Ok::<_, anyhow::Error>(Arc::new(renderer) as Arc<dyn Renderer>)
            })
        })
    }

    /// Wrap an already running renderer.
    pub fn with_renderer(renderer: Arc<dyn Renderer>) -> Self {
        Self {
            cell: OnceCell::new_with(Some(renderer)),
            launch: Box::new(|| -> BoxFuture<'static, Result<Arc<dyn Renderer>>> {
                Box::pin(async {
                    Err::<Arc<dyn Renderer>, _>(anyhow::anyhow!("renderer already provided"))
                })
            }),
        }
    }

    /// Get the browser, launching it if this is the first call.
    pub async fn get(&self) -> Result<Arc<dyn Renderer>> {
        self.cell
            .get_or_try_init(|| (self.launch)())
            .await
            .map(Arc::clone)
    }

    pub fn is_launched(&self) -> bool {
        self.cell.initialized()
    }

    /// Close the browser if it was ever launched.
    pub async fn shutdown(&self) -> Result<()> {
        match self.cell.get() {
            Some(renderer) => renderer.shutdown().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory renderer for exercising the rendered tier without Chromium.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// What a fake page does when driven.
    #[derive(Clone, Default)]
    pub struct FakePage {
        pub html: String,
        pub navigate_error: Option<ExtractError>,
        /// Successive `html_length` readings; the last one repeats.
        pub lengths: Vec<usize>,
        /// Returned from `close` after the context is released.
        pub close_error: Option<String>,
    }

    pub struct FakeRenderer {
        page: FakePage,
        pub active: Arc<AtomicUsize>,
        pub opened: AtomicUsize,
        pub closed: Arc<AtomicUsize>,
        pub shutdowns: AtomicUsize,
    }

    impl FakeRenderer {
        pub fn new(page: FakePage) -> Self {
            Self {
                page,
                active: Arc::new(AtomicUsize::new(0)),
                opened: AtomicUsize::new(0),
                closed: Arc::new(AtomicUsize::new(0)),
                shutdowns: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
            self.active.fetch_add(1, Ordering::SeqCst);
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeContext {
                page: self.page.clone(),
                lengths: Mutex::new(self.page.lengths.iter().copied().collect()),
                active: Arc::clone(&self.active),
                closed: Arc::clone(&self.closed),
            }))
        }

        async fn shutdown(&self) -> Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn active_contexts(&self) -> usize {
            self.active.load(Ordering::SeqCst)
        }
    }

    pub struct FakeContext {
        page: FakePage,
        lengths: Mutex<VecDeque<usize>>,
        active: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    impl FakeContext {
        pub fn with_lengths(lengths: Vec<usize>) -> Self {
            Self {
                page: FakePage::default(),
                lengths: Mutex::new(lengths.into()),
                active: Arc::new(AtomicUsize::new(1)),
                closed: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl RenderContext for FakeContext {
        async fn prepare(&mut self, _user_agent: &str) -> Result<()> {
            Ok(())
        }

        async fn navigate(
            &mut self,
            url: &str,
            _timeout_ms: u64,
        ) -> Result<NavigationResult, ExtractError> {
            match &self.page.navigate_error {
                Some(e) => Err(e.clone()),
                None => Ok(NavigationResult {
                    final_url: url.to_string(),
                    load_time_ms: 1,
                }),
            }
        }

        async fn execute_js(&self, _script: &str) -> Result<serde_json::Value> {
            anyhow::bail!("fake context does not run scripts")
        }

        async fn get_html(&self) -> Result<String> {
            Ok(self.page.html.clone())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.closed.fetch_add(1, Ordering::SeqCst);
            match &self.page.close_error {
                Some(message) => anyhow::bail!("{message}"),
                None => Ok(()),
            }
        }

        async fn html_length(&self) -> Result<usize> {
            let mut lengths = self.lengths.lock().unwrap();
            let next = if lengths.len() > 1 {
                lengths.pop_front()
            } else {
                lengths.front().copied()
            };
            Ok(next.unwrap_or(self.page.html.len()))
        }

        async fn select_fields(&self, rules: &SelectorRuleSet) -> Result<RawFields> {
            Ok(rules.resolve_html(&self.page.html))
        }
    }
}
