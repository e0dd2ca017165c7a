//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlState`: pagination progress and the index of observed records
//! - `CrawlPhase`: where a run starts (fresh, resuming, exhausted)
//! - `StateFile`: atomic JSON persistence of the crawl state

mod crawl_state;
mod file;

// Re-export main types
pub use crawl_state::{CrawlPhase, CrawlState};
pub use file::StateFile;

use thiserror::Error;

/// Crawl state errors
#[derive(Debug, Error)]
pub enum StateError {
    #[error("State file IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("State file {path} is corrupt: {message}")]
    Corrupt { path: String, message: String },

    #[error("Invalid page transition: expected page {expected}, got {requested}")]
    InvalidTransition { expected: u32, requested: u32 },
}
