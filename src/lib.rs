//! Catalog Harvest: a resumable harvester for a paginated patent catalog
//!
//! This crate walks the result pages of a catalog search, then fetches the
//! detail page of every record not yet enriched, appending merged records to
//! a CSV table. Progress is checkpointed so an interrupted run picks up where
//! it stopped.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod record;
pub mod session;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for harvest operations
///
/// Remote failures (HTTP errors, timeouts, login pages) never surface here;
/// they end a phase and are described by the run report.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Record store error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Crawl state error: {0}")]
    State(#[from] state::StateError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{HarvestRequest, Harvester};
pub use output::{HarvestOutcome, HarvestReport};
pub use record::{MergedRecord, RecordDetail, RecordSummary};
