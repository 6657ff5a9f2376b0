//! chainscrape main entry point
//!
//! This is the command-line interface for the chainscrape extraction engine.

use anyhow::Context;
use chainscrape::chain::ChainSet;
use chainscrape::config::{load_config_with_hash, Config, Traversal};
use chainscrape::crawler::run_scrape;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// chainscrape: declarative content extraction and crawling
///
/// Match chains locate content, labels and further documents in web pages
/// and local files. Matched content is printed, saved to files or forwarded
/// to other chains.
#[derive(Parser, Debug)]
#[command(name = "chainscrape")]
#[command(version)]
#[command(about = "Declarative content extraction and crawling", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the chains without processing any document
    #[arg(long)]
    dry_run: bool,

    /// Number of parallel download jobs (0 downloads inline)
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,

    /// Disable the download progress display
    #[arg(long)]
    no_progress: bool,

    /// Process newly found documents breadth first
    #[arg(long)]
    bfs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::debug!("Configuration loaded successfully (hash: {})", hash);

    if let Some(jobs) = cli.jobs {
        config.context.parallel_jobs = jobs;
    }
    if cli.no_progress {
        config.context.progress = false;
    }
    if cli.bfs {
        config.context.traversal = Traversal::Bfs;
    }

    if cli.dry_run {
        return handle_dry_run(&config);
    }
    handle_run(config).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr, stdout carries printed content only.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("chainscrape=info,warn"),
            1 => EnvFilter::new("chainscrape=debug,info"),
            2 => EnvFilter::new("chainscrape=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: builds the chains and shows what would run
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    let chains = ChainSet::build(config, config.context.browser.is_some())?;

    println!("=== chainscrape Dry Run ===\n");

    println!("Context:");
    println!("  Parallel jobs: {}", config.context.parallel_jobs);
    println!("  Traversal: {:?}", config.context.traversal);
    println!("  Request timeout: {}s", config.context.request_timeout_secs);
    match &config.context.browser {
        Some(browser) => println!(
            "  Browser: {:?} via {}{}",
            browser.browser,
            browser.webdriver_url,
            if browser.headless { " (headless)" } else { "" }
        ),
        None => println!("  Browser: none"),
    }

    println!("\nChains ({}):", chains.len());
    for chain in chains.iter() {
        println!(
            "  - chain {}: content {}, labels {}, documents {}",
            chain.id,
            yes_no(chain.flags.has_content_matching),
            yes_no(chain.flags.has_label_matching),
            yes_no(chain.flags.has_document_matching)
        );
        println!(
            "    strategy: {:?}, downloads: {:?}, duplication: {:?}",
            chain.rendered_strategy, chain.download_strategy, chain.duplication
        );
        if chain.flags.has_content_matching {
            let formats = [
                ("print", &chain.print_format),
                ("save", &chain.save_format),
                ("write", &chain.write_format),
                ("forward", &chain.forward_format),
            ];
            for (name, format) in formats {
                if let Some(format) = format {
                    println!("    {}: {:?}", name, format.source());
                }
            }
            if chain.content_is_link {
                println!("    content is a link");
            }
        }
    }

    println!("\nDocuments ({}):", config.documents.len());
    for entry in &config.documents {
        let target = entry
            .url
            .as_deref()
            .or(entry.file.as_deref())
            .unwrap_or_default();
        match &entry.chains {
            Some(ids) => println!("  - {} (chains {:?})", target, ids),
            None => println!("  - {}", target),
        }
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Handles the main run, stopping it on Ctrl-C
async fn handle_run(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        "Chains: {}, seed documents: {}",
        config.chains.len(),
        config.documents.len()
    );

    let abort = Arc::new(AtomicBool::new(false));
    let signal_abort = Arc::clone(&abort);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, stopping after the current step");
            signal_abort.store(true, Ordering::SeqCst);
        }
    });

    match run_scrape(config, abort).await {
        Ok(()) => {
            tracing::info!("Run completed successfully");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            Err(e.into())
        }
    }
}
