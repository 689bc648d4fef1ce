use crate::config::types::{
    Config, CrawlerConfig, FetchConfig, OutputConfig, SiteConfig, UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_crawler_config(&config.crawler)?;
    validate_fetch_config(&config.fetch)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the target site description
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' must use http or https",
            config.base_url
        )));
    }

    if !config.search_path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "search_path must start with '/', got '{}'",
            config.search_path
        )));
    }

    for (name, value) in [
        ("query_param", &config.query_param),
        ("offset_param", &config.offset_param),
        ("shard_param", &config.shard_param),
    ] {
        if value.is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 100 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 100, got {}",
            config.workers
        )));
    }

    if config.url_workers < 1 || config.url_workers > 32 {
        return Err(ConfigError::Validation(format!(
            "url_workers must be between 1 and 32, got {}",
            config.url_workers
        )));
    }

    Ok(())
}

/// Validates fetch and retry configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.retry_delay_min_ms > config.retry_delay_max_ms {
        return Err(ConfigError::Validation(format!(
            "retry_delay_min_ms ({}) must not exceed retry_delay_max_ms ({})",
            config.retry_delay_min_ms, config.retry_delay_max_ms
        )));
    }

    Ok(())
}

/// Validates request identity configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.agents.is_empty() {
        return Err(ConfigError::Validation(
            "at least one user agent is required".to_string(),
        ));
    }

    if config.agents.iter().any(|agent| agent.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user agents cannot be blank".to_string(),
        ));
    }

    validate_cookie(&config.consent_cookie)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.directory.is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Basic cookie validation: `name=value`, no header-breaking characters
fn validate_cookie(cookie: &str) -> Result<(), ConfigError> {
    if cookie.is_empty() {
        return Err(ConfigError::Validation(
            "consent_cookie cannot be empty".to_string(),
        ));
    }

    let Some((name, _value)) = cookie.split_once('=') else {
        return Err(ConfigError::Validation(format!(
            "consent_cookie must have the form name=value, got '{}'",
            cookie
        )));
    };

    if name.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "consent_cookie has an empty name: '{}'",
            cookie
        )));
    }

    if cookie.contains('\r') || cookie.contains('\n') {
        return Err(ConfigError::Validation(
            "consent_cookie cannot contain line breaks".to_string(),
        ));
    }

    Ok(())
}
