//! Environment readiness check.

use crate::config::PipelineConfig;
use crate::renderer::chromium::find_chromium;
use anyhow::Result;

/// Report browser availability and AI provider configuration.
pub async fn run(config: &PipelineConfig) -> Result<()> {
    println!("Pricecheck Doctor");
    println!("=================");
    println!();

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    // Rendered tier
    let chromium = config
        .chromium_path
        .clone()
        .filter(|p| p.exists())
        .or_else(find_chromium);
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => {
            println!("[!!] Chromium NOT found. Set PRICECHECK_CHROMIUM_PATH or install Chrome.")
        }
    }

    // AI tier
    let ai = &config.ai;
    println!("[OK] AI provider: {}", ai.provider);
    let model_ok = match ai.model_name() {
        Ok(model) => {
            println!("[OK] Model: {model}");
            true
        }
        Err(e) => {
            println!("[!!] {e}");
            false
        }
    };
    match ai.provider.api_key_env_var() {
        Some(var) if ai.api_key().is_none() => println!("[!!] {var} is not set"),
        Some(var) => println!("[OK] {var} is set"),
        None => println!("[OK] No API key needed"),
    }
    println!("[OK] Endpoint: {}", ai.base_url());
    println!("[OK] Input budget: {} chars", ai.max_chars());

    let s = &config.stability;
    println!(
        "[OK] DOM stability: poll {}ms, quiet {}ms, max {}ms, delta {} chars",
        s.check_interval_ms, s.quiet_window_ms, s.max_wait_ms, s.html_delta_threshold
    );
    if config.debug.force_ai {
        println!("[??] PRICECHECK_FORCE_AI is on: selectors are skipped");
    }
    if config.debug.skip_static {
        println!("[??] PRICECHECK_SKIP_STATIC is on: every page is rendered");
    }

    println!();
    if chromium.is_some() && model_ok {
        println!("Status: READY");
    } else if chromium.is_some() {
        println!("Status: PARTIAL (static and rendered tiers only)");
        println!("        AI fallback will raise a configuration error");
    } else {
        println!("Status: STATIC ONLY");
    }

    Ok(())
}
