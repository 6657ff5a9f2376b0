//! chainscrape: a declarative content extraction and crawling engine
//!
//! Users declare match chains: pipelines of locator stages (structural query,
//! pattern match, optional script, template) that are applied to fetched
//! documents. Each chain yields extracted content, an optional label for that
//! content, and further documents to crawl. Documents are read from files,
//! fetched over HTTP, or rendered in a WebDriver browser session.

pub mod chain;
pub mod config;
pub mod crawler;
pub mod document;
pub mod download;
pub mod locator;
pub mod url;

use thiserror::Error;

/// Main error type for chainscrape operations
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Setup(#[from] SetupError),

    #[error("Failed to fetch {path}: {source}")]
    Fetch { path: String, source: FetchError },

    /// Structural query failures and dead sessions inside a script step.
    /// Fatal for the whole run.
    #[error("{0}")]
    Match(String),

    #[error("the browser session was closed unexpectedly")]
    SessionDied,

    #[error("Browser session error: {0}")]
    Session(String),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("interrupted")]
    Aborted,
}

/// Configuration file errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Chain setup errors, raised before any document is processed
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("match chain {chain}: {message}")]
    Chain { chain: usize, message: String },

    #[error("match chain {chain} is unused, it has neither document nor content matching")]
    UnusedChain { chain: usize },

    #[error("match chain {chain} references unknown chain {target} in {field}")]
    UnknownChain {
        chain: usize,
        target: usize,
        field: &'static str,
    },

    #[error("failed to start browser session: {0}")]
    Session(String),

    #[error("{0}")]
    Other(String),
}

/// Categorized errors for reading a document or a piece of content
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection timeout")]
    Timeout,

    #[error("no such file or directory")]
    NotFound,

    #[error("server responded with status {0}")]
    Status(u16),

    #[error("empty response")]
    EmptyResponse,

    #[error("{0}")]
    Other(String),
}

/// Link normalization errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for chainscrape operations
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for chain setup
pub type SetupResult<T> = std::result::Result<T, SetupError>;

// Re-export commonly used types
pub use chain::{ChainId, ChainSet, MatchChain};
pub use config::Config;
pub use crawler::Coordinator;
pub use document::{Document, DocumentKind};
pub use locator::{Locator, LocatorMatch};
pub use crate::url::normalize_link;
