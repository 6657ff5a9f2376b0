//! Crawler module for document fetching and processing
//!
//! This module contains the core traversal logic, including:
//! - HTTP fetching of documents and content links
//! - Browser sessions for rendered documents
//! - Ordering documents and applying duplication policies
//! - Prompting for interactive chains
//! - Overall run coordination

mod coordinator;
mod fetcher;
mod interaction;
pub(crate) mod rendered;
mod scheduler;

pub use coordinator::Coordinator;
pub use fetcher::{build_http_client, FetchedResponse, HttpFetcher};
pub(crate) use fetcher::charset_of;
pub use interaction::{
    ask, parse_batch_answer, parse_choice, read_multiline, Choice, PollResult, Prompter,
    ScriptedPrompter, StdinPrompter,
};
pub use rendered::{substitute_frames, RenderedSession, SessionError, WebDriverSession};
pub use scheduler::DocumentQueue;

use crate::config::Config;
use crate::ScrapeError;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Runs a complete scrape with the given configuration
///
/// This is the main entry point for a run. It will:
/// 1. Connect to the configured browser, if any
/// 2. Build the chains and seed the document queue
/// 3. Fetch and match documents until the queue is exhausted
/// 4. Wait for outstanding downloads and flush printed output
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `abort` - Set from outside (e.g. on Ctrl-C) to stop the run
///
/// # Returns
///
/// * `Ok(())` - Run completed
/// * `Err(ScrapeError)` - Setup failed or the run was aborted
///
/// # Example
///
/// ```no_run
/// use chainscrape::config::load_config;
/// use chainscrape::crawler::run_scrape;
/// use std::path::Path;
/// use std::sync::atomic::AtomicBool;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("chains.toml"))?;
/// run_scrape(config, Arc::new(AtomicBool::new(false))).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_scrape(config: Config, abort: Arc<AtomicBool>) -> Result<(), ScrapeError> {
    let mut coordinator = Coordinator::connect(config, abort).await?;
    coordinator.run().await
}
