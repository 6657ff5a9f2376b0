//! Configuration module for chainscrape
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use chainscrape::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("chains.toml")).unwrap();
//! println!("Running {} job(s) at once", config.context.parallel_jobs);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BrowserConfig, BrowserKind, ChainOptions, Config, ContentOptions, ContextConfig,
    DocumentEntry, DocumentOptions, LabelOptions, LocatorOptions, Traversal,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
