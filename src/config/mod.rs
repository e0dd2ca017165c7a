//! Configuration module for catalog harvests
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use catalog_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Records go to: {}", config.output.records_path);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{CatalogConfig, Config, CrawlerConfig, OutputConfig, SessionConfig};

// Re-export parser functions
pub use parser::{load_config, parse_config};
