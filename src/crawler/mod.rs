//! Crawler module for catalog fetching and harvest orchestration
//!
//! This module contains the core harvesting logic, including:
//! - The `Transport` seam and its reqwest implementation
//! - Request pacing
//! - Raw page caching
//! - The listing and detail phases

mod cache;
mod coordinator;
mod fetcher;
mod scheduler;

pub use cache::{query_hash, PageCache};
pub use coordinator::{HarvestRequest, Harvester};
pub use fetcher::{build_http_client, FetchOutcome, FetchRequest, HttpTransport, Method, Transport};
pub use scheduler::RateLimiter;

use crate::config::Config;
use crate::output::HarvestReport;
use crate::HarvestError;

/// Runs a complete harvest against the live catalog
///
/// This is the main entry point for the binary. It will:
/// 1. Open the record table and load the crawl state
/// 2. Build the HTTP client from the session settings
/// 3. Probe the session, then run the listing and detail phases
///
/// # Returns
///
/// * `Ok(HarvestReport)` - The run ended; the report says how
/// * `Err(HarvestError)` - A local failure (config, state file, record table)
pub async fn harvest(config: Config, request: &HarvestRequest) -> Result<HarvestReport, HarvestError> {
    let mut harvester = Harvester::from_config(config)?;
    harvester.run(request).await
}
