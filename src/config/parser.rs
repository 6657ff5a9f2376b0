use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use chainscrape::config::load_config;
///
/// let config = load_config(Path::new("chains.toml")).unwrap();
/// println!("{} chain(s)", config.chains.len());
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so runs can be matched to the configuration they used.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{DocumentDuplication, RenderedStrategy};
    use crate::config::Traversal;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[context]
parallel-jobs = 2
traversal = "bfs"

[defaults]
rendered-strategy = "anymatch"

[defaults.document]
duplication = "nonrecursive"

[[document]]
url = "https://example.com/"

[[document]]
file = "page.html"
chains = [1]

[[chain]]
[chain.content]
query = "li::text"
index-max = 3
print-format = "{ci}: {c}\n"

[[chain]]
[chain.document]
query = "a @href"
pattern = "\\.html$"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.context.parallel_jobs, 2);
        assert_eq!(config.context.traversal, Traversal::Bfs);
        assert_eq!(config.context.request_timeout_secs, 30);
        assert_eq!(
            config.defaults.rendered_strategy,
            Some(RenderedStrategy::AnyMatch)
        );
        assert_eq!(
            config.defaults.document.duplication,
            Some(DocumentDuplication::NonRecursive)
        );
        assert_eq!(config.chains.len(), 2);
        assert_eq!(config.chains[0].content.locator.query.as_deref(), Some("li::text"));
        assert_eq!(config.chains[0].content.index_max, Some(3));
        assert_eq!(config.chains[1].document.locator.pattern.as_deref(), Some("\\.html$"));
        assert_eq!(config.documents[1].chains, Some(vec![1]));
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/chains.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_unknown_strategy() {
        let result = parse_config(
            r#"
[[chain]]
rendered-strategy = "sometimes"
[[document]]
url = "https://example.com"
"#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[context]
poll-frequency-ms = 1

[[chain]]
[chain.content]
query = "p"

[[document]]
url = "https://example.com"
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
