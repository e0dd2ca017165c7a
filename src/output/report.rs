//! Run report
//!
//! The coordinator fills a `HarvestReport` as it goes; the binary prints it
//! and derives its exit code from the outcome.

use crate::state::{CrawlPhase, CrawlState};
use crate::storage::StoreIndex;

/// Why a phase stopped before running out of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Non-2xx response, connection error, or listing timeout
    TransportFailure,

    /// Login page seen, or the session probe failed
    SessionExpired,

    /// A detail fetch failed without continue-on-error
    RecordFailure,

    /// `--max-pages` reached with pages left
    PageCapReached,

    /// `--max-records` reached with candidates left
    RecordCapReached,
}

impl StopReason {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::TransportFailure => "transport failure",
            Self::SessionExpired => "session expired",
            Self::RecordFailure => "record failure",
            Self::PageCapReached => "page cap reached",
            Self::RecordCapReached => "record cap reached",
        }
    }
}

/// How the run ended, as seen by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestOutcome {
    /// Every page fetched and every candidate attempted
    Completed,

    /// Stopped early; the next run continues from the checkpoint
    Resumable,

    /// No authenticated session; new credentials are needed
    AuthenticationFailed,
}

impl HarvestOutcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::Resumable => 2,
            Self::AuthenticationFailed => 1,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::Completed => "completed, nothing left",
            Self::Resumable => "stopped early, resumable",
            Self::AuthenticationFailed => "could not authenticate",
        }
    }
}

/// A detail fetch that failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub record_id: String,
    pub display_number: String,
    pub error: String,
}

/// Everything the operator is told after a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestReport {
    pub outcome: HarvestOutcome,
    pub query: String,
    pub search_column: String,
    pub start_phase: Option<CrawlPhase>,

    // ===== Listing phase =====
    pub pages_processed: u32,
    pub new_records: usize,
    pub listing_stop: Option<StopReason>,

    // ===== Detail phase =====
    pub candidates: usize,
    pub enriched: usize,
    /// Ids whose detail fetch timed out; stored without detail fields
    pub degraded: Vec<String>,
    pub failures: Vec<RecordFailure>,
    pub detail_stop: Option<StopReason>,
    pub rows_appended: usize,
    pub rows_skipped: usize,

    pub parse_anomalies: usize,

    // ===== Snapshot at the end of the run =====
    pub last_page_processed: u32,
    pub total_pages: u32,
    pub has_more_pages: bool,
    pub observed_records: usize,
    pub pending_enrichment: usize,
}

impl HarvestReport {
    pub fn new(query: &str, search_column: &str) -> Self {
        Self {
            outcome: HarvestOutcome::Resumable,
            query: query.to_string(),
            search_column: search_column.to_string(),
            start_phase: None,
            pages_processed: 0,
            new_records: 0,
            listing_stop: None,
            candidates: 0,
            enriched: 0,
            degraded: Vec::new(),
            failures: Vec::new(),
            detail_stop: None,
            rows_appended: 0,
            rows_skipped: 0,
            parse_anomalies: 0,
            last_page_processed: 0,
            total_pages: 0,
            has_more_pages: true,
            observed_records: 0,
            pending_enrichment: 0,
        }
    }

    /// Takes the end-of-run snapshot and decides the outcome
    ///
    /// An outcome already set to `AuthenticationFailed` is kept.
    pub fn finish(&mut self, state: &CrawlState, index: &StoreIndex) {
        self.last_page_processed = state.last_page_processed;
        self.total_pages = state.total_pages;
        self.has_more_pages = state.has_more_pages;
        self.observed_records = state.observed_records.len();
        self.pending_enrichment = state
            .observed_records
            .keys()
            .filter(|id| !index.has_details(id))
            .count();

        if self.outcome == HarvestOutcome::AuthenticationFailed {
            return;
        }

        let clean = self.listing_stop.is_none()
            && self.detail_stop.is_none()
            && self.failures.is_empty()
            && !state.has_more_pages;
        self.outcome = if clean {
            HarvestOutcome::Completed
        } else {
            HarvestOutcome::Resumable
        };
    }
}

/// Prints the report to stdout
pub fn print_report(report: &HarvestReport) {
    println!("=== Harvest Report ===\n");

    println!("Search: '{}' in {}", report.query, report.search_column);
    println!("Outcome: {}", report.outcome.describe());
    println!();

    println!("Listing:");
    println!("  Pages processed this run: {}", report.pages_processed);
    println!(
        "  Last page processed: {} of {}",
        report.last_page_processed, report.total_pages
    );
    println!("  New records: {}", report.new_records);
    println!("  Observed records: {}", report.observed_records);
    if let Some(stop) = report.listing_stop {
        println!("  Stopped: {}", stop.describe());
    }
    println!();

    println!("Details:");
    println!("  Candidates: {}", report.candidates);
    println!("  Enriched this run: {}", report.enriched);
    println!("  Rows appended: {}", report.rows_appended);
    println!("  Pending enrichment: {}", report.pending_enrichment);
    if !report.degraded.is_empty() {
        println!("  Timed out (stored without details): {}", report.degraded.join(", "));
    }
    if let Some(stop) = report.detail_stop {
        println!("  Stopped: {}", stop.describe());
    }
    println!();

    if report.parse_anomalies > 0 {
        println!("Parse anomalies: {}", report.parse_anomalies);
        println!();
    }

    if !report.failures.is_empty() {
        println!("Failed records ({}):", report.failures.len());
        for failure in &report.failures {
            println!(
                "  - {} (ID: {}): {}",
                failure.display_number, failure.record_id, failure.error
            );
        }
        println!();
    }
}
