// Copyright 2026 Pricecheck Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use pricecheck_runtime::cli;
use pricecheck_runtime::cli::scrape_cmd::ScrapeArgs;
use pricecheck_runtime::PipelineConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pricecheck",
    about = "Pricecheck: extract title, price, currency and image from product pages",
    version,
    after_help = "Run 'pricecheck <command> --help' for details on each command."
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract product data from one or more URLs
    Scrape {
        /// Product page URLs
        #[arg(required = true)]
        urls: Vec<String>,
        /// Skip selectors and go straight to AI extraction
        #[arg(long)]
        force_ai: bool,
        /// Skip the static HTTP tier
        #[arg(long)]
        skip_static: bool,
        /// Timeout for each tier in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// User agent for both tiers
        #[arg(long)]
        user_agent: Option<String>,
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Parse a price fragment such as "1.234,56 €"
    ParsePrice {
        /// Text containing the price
        text: String,
    },
    /// Check browser availability and AI configuration
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "pricecheck_runtime=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match PipelineConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("  Error: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(cli.verbose || config.debug.verbose, cli.json_logs);

    let result = match cli.command {
        Commands::Scrape {
            urls,
            force_ai,
            skip_static,
            timeout_ms,
            user_agent,
            pretty,
        } => {
            let args = ScrapeArgs {
                force_ai,
                skip_static,
                timeout_ms,
                user_agent,
                pretty,
            };
            match cli::scrape_cmd::run(&urls, config, &args).await {
                Ok(true) => Ok(()),
                Ok(false) => std::process::exit(1),
                Err(e) => Err(e),
            }
        }
        Commands::ParsePrice { text } => cli::price_cmd::run(&text),
        Commands::Doctor => cli::doctor::run(&config).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "pricecheck", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }

    result
}
