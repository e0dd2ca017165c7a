use crate::config::types::{CatalogConfig, Config, CrawlerConfig, OutputConfig, SessionConfig};
use crate::record::{Field, FieldOrigin};
use crate::{ConfigError, ConfigResult};
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_catalog_config(&config.catalog)?;
    validate_crawler_config(&config.crawler)?;
    validate_session_config(&config.session)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates catalog endpoints
fn validate_catalog_config(config: &CatalogConfig) -> ConfigResult<()> {
    validate_http_url("search-url", &config.search_url)?;
    validate_http_url("probe-url", &config.probe_url)?;

    if config.records_per_page < 1 {
        return Err(ConfigError::Validation(format!(
            "records-per-page must be >= 1, got {}",
            config.records_per_page
        )));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> ConfigResult<()> {
    // request_interval_ms may be 0: no pacing

    if config.request_timeout_ms < 1 {
        return Err(ConfigError::Validation(format!(
            "request-timeout-ms must be >= 1, got {}",
            config.request_timeout_ms
        )));
    }

    if config.detail_timeout_ms < 1 {
        return Err(ConfigError::Validation(format!(
            "detail-timeout-ms must be >= 1, got {}",
            config.detail_timeout_ms
        )));
    }

    if config.checkpoint_every_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "checkpoint-every-pages must be >= 1, got {}",
            config.checkpoint_every_pages
        )));
    }

    if config.flush_every_records < 1 {
        return Err(ConfigError::Validation(format!(
            "flush-every-records must be >= 1, got {}",
            config.flush_every_records
        )));
    }

    Ok(())
}

/// Validates session configuration
fn validate_session_config(config: &SessionConfig) -> ConfigResult<()> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.login_markers.iter().any(|m| m.is_empty()) {
        return Err(ConfigError::Validation(
            "login-markers cannot contain empty strings".to_string(),
        ));
    }

    if config.authenticated_marker.is_empty() {
        return Err(ConfigError::Validation(
            "authenticated-marker cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> ConfigResult<()> {
    if config.records_path.is_empty() {
        return Err(ConfigError::Validation(
            "records-path cannot be empty".to_string(),
        ));
    }

    if config.state_path.is_empty() {
        return Err(ConfigError::Validation(
            "state-path cannot be empty".to_string(),
        ));
    }

    if config.cache_dir.as_deref() == Some("") {
        return Err(ConfigError::Validation(
            "cache-dir cannot be empty when set".to_string(),
        ));
    }

    match Field::from_column(&config.enrichment_signal) {
        Some(field) if field.origin() == FieldOrigin::Detail => Ok(()),
        Some(_) => Err(ConfigError::Validation(format!(
            "enrichment-signal '{}' is filled by listing pages, not detail pages",
            config.enrichment_signal
        ))),
        None => Err(ConfigError::Validation(format!(
            "enrichment-signal '{}' is not a known column",
            config.enrichment_signal
        ))),
    }
}

/// Validates that a URL parses and uses http or https
fn validate_http_url(name: &str, value: &str) -> ConfigResult<()> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, value, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::InvalidUrl(format!(
            "{} must use http or https, got '{}'",
            name, scheme
        ))),
    }
}
