//! Storage traits and error types
//!
//! This module defines the trait interface for record store backends and
//! associated error types.

use crate::record::MergedRecord;
use indexmap::IndexMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Record table {path} has no '{column}' column")]
    MissingIdColumn { path: String, column: String },
}

impl StorageError {
    /// Parse failures and a missing id column; IO errors are not corruption
    pub fn is_corruption(&self) -> bool {
        match self {
            Self::Csv(e) => !e.is_io_error(),
            Self::MissingIdColumn { .. } => true,
            Self::Io(_) => false,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Identity and completeness of the stored records
///
/// Maps each stored record id to whether its row counts as enriched, in table
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreIndex {
    pub has_details: IndexMap<String, bool>,
}

impl StoreIndex {
    pub fn contains(&self, record_id: &str) -> bool {
        self.has_details.contains_key(record_id)
    }

    pub fn has_details(&self, record_id: &str) -> bool {
        self.has_details.get(record_id).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.has_details.len()
    }

    pub fn is_empty(&self) -> bool {
        self.has_details.is_empty()
    }

    pub fn enriched_count(&self) -> usize {
        self.has_details.values().filter(|d| **d).count()
    }
}

/// Result of one append
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendSummary {
    /// Rows written
    pub added: usize,

    /// Records skipped because their id was already stored
    pub skipped: usize,

    /// Columns added to the table header by this append
    pub new_columns: Vec<String>,
}

/// Trait for record store implementations
///
/// The store is append-only at the row level: a stored row is never edited.
/// A record's data only grows through the in-memory merge before its row is
/// first written.
pub trait RecordStore {
    /// Rebuilds the index from the durable table
    fn load(&mut self) -> StorageResult<StoreIndex>;

    /// Writes records whose id is not stored yet
    ///
    /// Records with an already stored id are skipped entirely. Columns never
    /// seen before extend the table for all rows, with empty cells for the rows
    /// already written.
    fn append(&mut self, records: &[MergedRecord]) -> StorageResult<AppendSummary>;

    /// The index as of the last load or append
    fn index(&self) -> &StoreIndex;

    fn contains(&self, record_id: &str) -> bool {
        self.index().contains(record_id)
    }

    /// Whether the stored row for this id counts as enriched
    fn has_details(&self, record_id: &str) -> bool {
        self.index().has_details(record_id)
    }
}
