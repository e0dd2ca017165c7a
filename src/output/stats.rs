//! Statistics from the durable harvest files
//!
//! This module reads the crawl state and the record table without touching
//! the catalog, for the `--stats` mode.

use crate::config::Config;
use crate::state::{StateError, StateFile};
use crate::storage::{CsvRecordStore, EnrichmentSignal, RecordStore, StoreIndex};
use crate::HarvestError;

/// Harvest statistics summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestStatistics {
    /// Query of the last search, if any state exists
    pub query: Option<String>,

    pub search_column: Option<String>,

    pub last_page_processed: u32,

    pub total_pages: u32,

    pub has_more_pages: bool,

    /// Records seen on listing pages
    pub observed_records: usize,

    /// Rows in the record table
    pub stored_records: usize,

    /// Rows that carry the enrichment signal
    pub enriched_records: usize,

    /// Observed records that still lack details
    pub pending_enrichment: usize,

    /// Timestamp of the last checkpoint
    pub updated_at: Option<String>,

    /// Set when the state file exists but does not parse
    pub state_error: Option<String>,

    /// Set when the record table exists but does not parse
    pub table_error: Option<String>,
}

/// Loads statistics from the state file and the record table
///
/// A corrupt state file or record table is reported in `state_error` or
/// `table_error` and left where it is.
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - A file could not be read
pub fn load_statistics(config: &Config) -> Result<HarvestStatistics, HarvestError> {
    let (index, table_error) = match CsvRecordStore::inspect(
        &config.output.records_path,
        EnrichmentSignal::new(config.output.enrichment_signal.clone()),
    ) {
        Ok(store) => (store.index().clone(), None),
        Err(e) if e.is_corruption() => (StoreIndex::default(), Some(e.to_string())),
        Err(e) => return Err(e.into()),
    };

    let (state, state_error) = match StateFile::new(&config.output.state_path).load() {
        Ok(state) => (state, None),
        Err(StateError::Corrupt { message, .. }) => (None, Some(message)),
        Err(e) => return Err(e.into()),
    };

    let mut stats = HarvestStatistics {
        query: None,
        search_column: None,
        last_page_processed: 0,
        total_pages: 0,
        has_more_pages: false,
        observed_records: 0,
        stored_records: index.len(),
        enriched_records: index.enriched_count(),
        pending_enrichment: 0,
        updated_at: None,
        state_error,
        table_error,
    };

    if let Some(state) = state {
        stats.pending_enrichment = state
            .observed_records
            .keys()
            .filter(|id| !index.has_details(id))
            .count();
        stats.query = Some(state.query);
        stats.search_column = Some(state.search_column);
        stats.last_page_processed = state.last_page_processed;
        stats.total_pages = state.total_pages;
        stats.has_more_pages = state.has_more_pages;
        stats.observed_records = state.observed_records.len();
        stats.updated_at = Some(state.updated_at.format("%Y-%m-%d %H:%M:%S").to_string());
    }

    Ok(stats)
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Crawl State:");
    match (&stats.query, &stats.state_error) {
        (_, Some(error)) => println!("  State file is corrupt: {}", error),
        (None, None) => println!("  No search recorded yet"),
        (Some(query), None) => {
            println!(
                "  Search: '{}' in {}",
                query,
                stats.search_column.as_deref().unwrap_or("")
            );
            println!(
                "  Pages processed: {} of {}",
                stats.last_page_processed, stats.total_pages
            );
            println!("  More pages: {}", if stats.has_more_pages { "yes" } else { "no" });
            println!("  Observed records: {}", stats.observed_records);
            if let Some(updated_at) = &stats.updated_at {
                println!("  Last checkpoint: {}", updated_at);
            }
        }
    }
    println!();

    println!("Record Table:");
    if let Some(error) = &stats.table_error {
        println!("  Record table is unreadable: {}", error);
    }
    println!("  Stored records: {}", stats.stored_records);
    let percentage = if stats.stored_records > 0 {
        (stats.enriched_records as f64 / stats.stored_records as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "  Enriched: {} ({:.1}%)",
        stats.enriched_records, percentage
    );
    println!("  Pending enrichment: {}", stats.pending_enrichment);
}
