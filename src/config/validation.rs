use crate::config::types::{Config, ContextConfig, DocumentEntry};
use crate::ConfigError;

/// Validates the entire configuration
///
/// Chain level consistency is checked later by the chain builder, which
/// knows the keys available at each stage.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_context_config(&config.context)?;

    if config.chains.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[chain]] must be configured".to_string(),
        ));
    }
    if config.documents.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[document]] must be configured".to_string(),
        ));
    }

    for (i, entry) in config.documents.iter().enumerate() {
        validate_document_entry(i, entry, config.chains.len())?;
    }
    Ok(())
}

/// Validates run wide settings
fn validate_context_config(config: &ContextConfig) -> Result<(), ConfigError> {
    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "request-timeout-secs must be >= 1, got {}",
            config.request_timeout_secs
        )));
    }

    if config.poll_frequency_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "poll-frequency-ms must be >= 10ms, got {}ms",
            config.poll_frequency_ms
        )));
    }

    if config.print_buffer_capacity < 1024 {
        return Err(ConfigError::Validation(format!(
            "print-buffer-capacity must be >= 1024 bytes, got {}",
            config.print_buffer_capacity
        )));
    }

    if config.user_agent.is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if let Some(browser) = &config.browser {
        url::Url::parse(&browser.webdriver_url).map_err(|e| {
            ConfigError::Validation(format!(
                "invalid webdriver-url '{}': {}",
                browser.webdriver_url, e
            ))
        })?;
    }

    Ok(())
}

/// Validates a seed document entry
fn validate_document_entry(
    index: usize,
    entry: &DocumentEntry,
    chain_count: usize,
) -> Result<(), ConfigError> {
    match (&entry.url, &entry.file) {
        (Some(_), Some(_)) | (None, None) => {
            return Err(ConfigError::Validation(format!(
                "document {} must have exactly one of 'url' or 'file'",
                index
            )));
        }
        (Some(address), None) | (None, Some(address)) if address.is_empty() => {
            return Err(ConfigError::Validation(format!(
                "document {} has an empty address",
                index
            )));
        }
        _ => {}
    }

    if let Some(chains) = &entry.chains {
        if let Some(unknown) = chains.iter().find(|&&c| c >= chain_count) {
            return Err(ConfigError::Validation(format!(
                "document {} references unknown chain {}",
                index, unknown
            )));
        }
    }
    Ok(())
}
