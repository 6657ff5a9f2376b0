use crate::chain::{DocumentDuplication, DownloadStrategy, RenderedStrategy};
use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for chainscrape
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub context: ContextConfig,

    /// Values used for every chain option a chain leaves unset
    #[serde(default)]
    pub defaults: ChainOptions,

    #[serde(default, rename = "chain")]
    pub chains: Vec<ChainOptions>,

    #[serde(default, rename = "document")]
    pub documents: Vec<DocumentEntry>,
}

/// Order in which newly discovered documents are processed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Traversal {
    #[default]
    Dfs,
    Bfs,
}

/// Run wide settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ContextConfig {
    /// Number of download jobs running at once, 0 runs them inline
    pub parallel_jobs: usize,

    /// Show progress bars while waiting for downloads
    pub progress: bool,

    pub request_timeout_secs: u64,

    /// How often a rendered document is re-read while waiting for changes
    pub poll_frequency_ms: u64,

    /// Bytes of out of order output buffered before writers have to wait
    pub print_buffer_capacity: usize,

    pub user_agent: String,

    pub traversal: Traversal,

    /// Directory for temporary download buffers
    pub temp_dir: Option<PathBuf>,

    /// Presence enables the rendered session
    pub browser: Option<BrowserConfig>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            parallel_jobs: 8,
            progress: true,
            request_timeout_secs: 30,
            poll_frequency_ms: 300,
            print_buffer_capacity: 100 * 1024 * 1024,
            user_agent: format!("chainscrape/{}", env!("CARGO_PKG_VERSION")),
            traversal: Traversal::Dfs,
            temp_dir: None,
            browser: None,
        }
    }
}

/// Browser used for rendered documents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Firefox,
    Chrome,
}

/// WebDriver session settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub browser: BrowserKind,
    pub headless: bool,
    /// Directory the browser saves internal downloads to
    pub download_dir: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            browser: BrowserKind::Firefox,
            headless: true,
            download_dir: None,
        }
    }
}

/// A seed document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DocumentEntry {
    pub url: Option<String>,
    pub file: Option<String>,
    /// Chains run on this document, all chains when unset
    pub chains: Option<Vec<usize>>,
}

/// Options of one match chain, every field optional so `[defaults]` can fill
/// the gaps
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainOptions {
    pub rendered_strategy: Option<RenderedStrategy>,
    pub download_strategy: Option<DownloadStrategy>,
    pub overwrite_files: Option<bool>,
    pub filename_default_format: Option<String>,
    #[serde(default)]
    pub content: ContentOptions,
    #[serde(default)]
    pub label: LabelOptions,
    #[serde(default)]
    pub document: DocumentOptions,
}

/// Steps of a locator
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LocatorOptions {
    /// CSS selector, optionally ending in `::text` or ` @attribute`
    pub query: Option<String>,
    pub sibling_depth: Option<usize>,
    pub pattern: Option<String>,
    pub script: Option<String>,
    pub format: Option<String>,
    pub multimatch: Option<bool>,
    pub interactive: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ContentOptions {
    #[serde(flatten)]
    pub locator: LocatorOptions,
    pub is_link: Option<bool>,
    pub index_min: Option<u64>,
    pub index_max: Option<u64>,
    pub continuous_index: Option<bool>,
    pub print_format: Option<String>,
    pub save_format: Option<String>,
    pub write_format: Option<String>,
    pub forward_format: Option<String>,
    pub forward_chains: Option<Vec<usize>>,
    pub escape_sequence: Option<String>,
    pub save_path_interactive: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LabelOptions {
    #[serde(flatten)]
    pub locator: LocatorOptions,
    pub inside_content: Option<bool>,
    pub allow_missing: Option<bool>,
    pub allow_slashes: Option<bool>,
    pub default_format: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DocumentOptions {
    #[serde(flatten)]
    pub locator: LocatorOptions,
    pub index_min: Option<u64>,
    pub index_max: Option<u64>,
    pub output_chains: Option<Vec<usize>>,
    pub encoding: Option<String>,
    pub force_encoding: Option<String>,
    pub scheme: Option<String>,
    pub prefer_parent_scheme: Option<bool>,
    pub force_scheme: Option<String>,
    pub duplication: Option<DocumentDuplication>,
}
