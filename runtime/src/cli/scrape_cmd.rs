//! `pricecheck scrape <url>...`: run the pipeline and print results as JSON.

use crate::config::PipelineConfig;
use crate::pipeline::Pipeline;
use crate::result::ExtractionConfig;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Per-invocation overrides from the command line.
#[derive(Debug, Clone, Default)]
pub struct ScrapeArgs {
    pub force_ai: bool,
    pub skip_static: bool,
    pub timeout_ms: Option<u64>,
    pub user_agent: Option<String>,
    pub pretty: bool,
}

/// Scrape each URL in turn. Returns `true` when every URL succeeded.
///
/// One JSON document per URL goes to stdout. The browser is shut down
/// before returning, including when a configuration error or SIGINT/SIGTERM
/// aborts the run.
pub async fn run(
    urls: &[String],
    mut config: PipelineConfig,
    args: &ScrapeArgs,
) -> Result<bool> {
    config.debug.force_ai |= args.force_ai;
    config.debug.skip_static |= args.skip_static;
    if let Some(ua) = &args.user_agent {
        config.user_agent = ua.clone();
    }
    let call_config = args
        .timeout_ms
        .map(|ms| ExtractionConfig::new(ms, config.user_agent.clone()));

    let pipeline = Pipeline::from_config(&config);
    scrape_until(
        &pipeline,
        urls,
        call_config.as_ref(),
        args.pretty,
        shutdown_signal(),
    )
    .await
}

/// Run the scrape until it finishes or `signal` fires, then close the browser.
async fn scrape_until(
    pipeline: &Pipeline,
    urls: &[String],
    call_config: Option<&ExtractionConfig>,
    pretty: bool,
    signal: impl Future<Output = ()>,
) -> Result<bool> {
    let outcome = tokio::select! {
        outcome = scrape_all(pipeline, urls, call_config, pretty) => Some(outcome),
        () = signal => {
            info!("received shutdown signal");
            None
        }
    };
    pipeline.shutdown().await?;
    match outcome {
        Some(outcome) => outcome,
        None => anyhow::bail!("interrupted by shutdown signal"),
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

async fn scrape_all(
    pipeline: &Pipeline,
    urls: &[String],
    call_config: Option<&ExtractionConfig>,
    pretty: bool,
) -> Result<bool> {
    let pb = if urls.len() > 1 {
        let pb = ProgressBar::new(urls.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
                .progress_chars("=> "),
        );
        pb
    } else {
        let pb = ProgressBar::new_spinner();
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    };

    let mut all_ok = true;
    for url in urls {
        pb.set_message(url.clone());
        let result = pipeline.scrape_product(url, call_config).await?;
        all_ok &= result.success;

        let mut doc = serde_json::to_value(&result)?;
        doc["url"] = serde_json::Value::String(url.clone());
        let text = if pretty {
            serde_json::to_string_pretty(&doc)?
        } else {
            serde_json::to_string(&doc)?
        };
        pb.suspend(|| println!("{text}"));
        pb.inc(1);
    }
    pb.finish_and_clear();

    Ok(all_ok)
}
