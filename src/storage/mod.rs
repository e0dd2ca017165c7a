//! Storage module for harvested records
//!
//! This module handles the durable record table:
//! - the `RecordStore` trait and its CSV implementation
//! - identity and completeness reconstruction at process start
//! - the "has details" enrichment predicate

mod csv_store;
mod signal;
mod traits;

pub use csv_store::CsvRecordStore;
pub use signal::EnrichmentSignal;
pub use traits::{AppendSummary, RecordStore, StorageError, StorageResult, StoreIndex};
